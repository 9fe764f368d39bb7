//! Ledger entry model: immutable signed balance changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// AI service type a provider config or reservation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Text,
    Image,
    Video,
}

impl ServiceType {
    pub const ALL: [ServiceType; 3] = [Self::Text, Self::Image, Self::Video];

    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// Entry kind used when reserving credits for this service type.
    pub fn reserve_kind(self) -> EntryKind {
        match self {
            Self::Text => EntryKind::AiText,
            Self::Image => EntryKind::AiImage,
            Self::Video => EntryKind::AiVideo,
        }
    }

    /// Entry kind used when refunding a reservation for this service type.
    pub fn refund_kind(self) -> EntryKind {
        match self {
            Self::Text => EntryKind::AiTextRefund,
            Self::Image => EntryKind::AiImageRefund,
            Self::Video => EntryKind::AiVideoRefund,
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ledger entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    Recharge,
    GenerateFramePrompt,
    GenerateImage,
    AiText,
    AiTextRefund,
    AiImage,
    AiImageRefund,
    AiVideo,
    AiVideoRefund,
}

impl EntryKind {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recharge => "RECHARGE",
            Self::GenerateFramePrompt => "GENERATE_FRAME_PROMPT",
            Self::GenerateImage => "GENERATE_IMAGE",
            Self::AiText => "AI_TEXT",
            Self::AiTextRefund => "AI_TEXT_REFUND",
            Self::AiImage => "AI_IMAGE",
            Self::AiImageRefund => "AI_IMAGE_REFUND",
            Self::AiVideo => "AI_VIDEO",
            Self::AiVideoRefund => "AI_VIDEO_REFUND",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Width of the `ledger_entries.description` column, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 255;

/// Single ledger entry. Negative amounts are debits, positive are credits.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: i64,
    pub user_id: i64,
    pub amount: i64,
    pub kind: EntryKind,
    pub reference_id: Option<String>,
    pub service_type: Option<ServiceType>,
    pub model: Option<String>,
    pub description: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Input for appending an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub user_id: i64,
    pub amount: i64,
    pub kind: EntryKind,
    pub reference_id: Option<String>,
    pub service_type: Option<ServiceType>,
    pub model: Option<String>,
    pub description: Option<String>,
}

/// Which side of a reservation an entry lookup is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySide {
    Debit,
    Credit,
}

impl EntrySide {
    pub fn matches(&self, amount: i64) -> bool {
        match self {
            Self::Debit => amount < 0,
            Self::Credit => amount > 0,
        }
    }
}

/// Page of ledger entries, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryPage {
    pub entries: Vec<LedgerEntry>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}
