use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

type SenderKey = (String, String);

struct Slot {
    generation: u64,
    /// Resolves (with an error) once the latest ticket for the key is dropped.
    tail: oneshot::Receiver<()>,
}

#[derive(Default)]
struct SequencerInner {
    next_generation: u64,
    slots: HashMap<SenderKey, Slot>,
}

/// Serializes the persist phase of messages from one sender in one channel.
///
/// Tickets are handed out synchronously, so their order is arrival order even
/// when the work itself runs on separately spawned tasks. Different senders,
/// and the same sender in different channels, never wait on each other.
#[derive(Clone, Default)]
pub struct SendSequencer {
    inner: Arc<Mutex<SequencerInner>>,
}

impl SendSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next place in line for `(channel_id, sender_id)`.
    pub fn ticket(&self, channel_id: &str, sender_id: &str) -> SendTicket {
        let key = (channel_id.to_string(), sender_id.to_string());
        let (done, tail) = oneshot::channel();

        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.next_generation += 1;
        let generation = inner.next_generation;
        let previous = inner.slots.insert(key.clone(), Slot { generation, tail });

        SendTicket {
            key,
            generation,
            previous: previous.map(|slot| slot.tail),
            _done: done,
            sequencer: self.inner.clone(),
        }
    }

    pub fn pending_keys(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .slots
            .len()
    }
}

/// A place in line. Dropping it lets the next ticket for the same key run.
pub struct SendTicket {
    key: SenderKey,
    generation: u64,
    previous: Option<oneshot::Receiver<()>>,
    _done: oneshot::Sender<()>,
    sequencer: Arc<Mutex<SequencerInner>>,
}

impl SendTicket {
    /// Wait until every earlier ticket for this key has been dropped.
    pub async fn wait_turn(&mut self) {
        if let Some(previous) = self.previous.take() {
            // The sender half is never used; closure is the signal.
            let _ = previous.await;
        }
    }
}

impl Drop for SendTicket {
    fn drop(&mut self) {
        let mut inner = self.sequencer.lock().unwrap_or_else(PoisonError::into_inner);
        if inner
            .slots
            .get(&self.key)
            .is_some_and(|slot| slot.generation == self.generation)
        {
            inner.slots.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::Mutex as AsyncMutex;

    use super::*;

    #[tokio::test]
    async fn same_key_runs_in_ticket_order() {
        let sequencer = SendSequencer::new();
        let log = Arc::new(AsyncMutex::new(Vec::new()));

        let mut first = sequencer.ticket("ride-A", "u1");
        let mut second = sequencer.ticket("ride-A", "u1");

        // Start the second one first; it must still finish after the first.
        let log2 = log.clone();
        let late = tokio::spawn(async move {
            second.wait_turn().await;
            log2.lock().await.push(2);
        });
        let log1 = log.clone();
        let early = tokio::spawn(async move {
            first.wait_turn().await;
            tokio::time::sleep(Duration::from_millis(30)).await;
            log1.lock().await.push(1);
        });

        early.await.unwrap();
        late.await.unwrap();
        assert_eq!(*log.lock().await, vec![1, 2]);
        assert_eq!(sequencer.pending_keys(), 0);
    }

    #[tokio::test]
    async fn different_keys_do_not_wait() {
        let sequencer = SendSequencer::new();
        let _held = sequencer.ticket("ride-A", "u1");

        let mut other_sender = sequencer.ticket("ride-A", "u2");
        let mut other_channel = sequencer.ticket("ride-B", "u1");
        tokio::time::timeout(Duration::from_millis(100), async {
            other_sender.wait_turn().await;
            other_channel.wait_turn().await;
        })
        .await
        .expect("independent keys must not block");
    }

    #[test]
    fn slots_are_released_when_the_last_ticket_drops() {
        let sequencer = SendSequencer::new();
        let a = sequencer.ticket("ride-A", "u1");
        let b = sequencer.ticket("ride-A", "u1");
        assert_eq!(sequencer.pending_keys(), 1);

        drop(a);
        assert_eq!(sequencer.pending_keys(), 1);
        drop(b);
        assert_eq!(sequencer.pending_keys(), 0);
    }
}
