use tandem_types::models::Language;

/// What a reader should see for a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPlan {
    /// The reader shares the author's language: show the untouched original.
    Original,
    /// The reader reads the pivot language: show the stored pivot text.
    Pivot,
    /// Anything else: translate the stored pivot text into this language.
    FromPivot(Language),
}

/// Decide how to render a message written in `source` for a reader of
/// `target`.
///
/// The source check wins over the pivot check, so an English author's message
/// read by an English reader is the original rather than the pivot copy (the
/// two are identical anyway).
pub fn plan_delivery(source: Language, target: Language) -> DeliveryPlan {
    if target == source {
        DeliveryPlan::Original
    } else if target.is_pivot() {
        DeliveryPlan::Pivot
    } else {
        DeliveryPlan::FromPivot(target)
    }
}

impl DeliveryPlan {
    /// The text to deliver when no translation call is needed.
    pub fn immediate_text<'a>(&self, original: &'a str, pivot: &'a str) -> Option<&'a str> {
        match self {
            DeliveryPlan::Original => Some(original),
            DeliveryPlan::Pivot => Some(pivot),
            DeliveryPlan::FromPivot(_) => None,
        }
    }
}
