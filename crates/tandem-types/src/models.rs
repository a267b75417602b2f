use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identity of one live WebSocket connection.
pub type ConnectionId = Uuid;

/// Languages the relay can detect and translate between.
///
/// English is the pivot: every stored message carries an English rendering,
/// and every other language only needs models to and from English.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Hi,
    Bn,
    Or,
    Es,
}

impl Language {
    pub const PIVOT: Language = Language::En;

    /// Used when detection fails or yields something unsupported.
    pub const FALLBACK: Language = Language::PIVOT;

    pub const ALL: [Language; 5] = [
        Language::En,
        Language::Hi,
        Language::Bn,
        Language::Or,
        Language::Es,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Hi => "hi",
            Language::Bn => "bn",
            Language::Or => "or",
            Language::Es => "es",
        }
    }

    pub fn is_pivot(self) -> bool {
        self == Self::PIVOT
    }

    /// Parse a stored or provider-supplied code, falling back to the pivot.
    pub fn from_code_or_pivot(code: &str) -> Language {
        code.parse().unwrap_or(Self::PIVOT)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedLanguage(pub String);

impl fmt::Display for UnsupportedLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported language code '{}'", self.0)
    }
}

impl std::error::Error for UnsupportedLanguage {}

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "hi" => Ok(Language::Hi),
            "bn" => Ok(Language::Bn),
            "or" => Ok(Language::Or),
            "es" => Ok(Language::Es),
            other => Err(UnsupportedLanguage(other.to_string())),
        }
    }
}

/// A geographic position as sent by clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// The canonical, language-neutral record of one chat message.
/// Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub channel_id: String,
    pub sender_id: String,
    /// Denormalized at write time; later renames do not touch old messages.
    pub sender_display_name: String,
    pub original_text: String,
    pub source_language: Language,
    /// `original_text` rendered in the pivot language. Always populated.
    pub pivot_text: String,
    pub created_at: DateTime<Utc>,
}

/// A message that has passed detection and is ready to be appended.
/// The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub channel_id: String,
    pub sender_id: String,
    pub sender_display_name: String,
    pub original_text: String,
    pub source_language: Language,
    pub pivot_text: String,
}

/// Who is behind a live connection and which channel it is watching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PresenceEntry {
    pub user_id: String,
    pub channel_id: String,
}

/// One live delivery target resolved from presence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LiveMember {
    pub connection_id: ConnectionId,
    pub user_id: String,
}
