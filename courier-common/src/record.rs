//! The durable representation of one mail delivery request and its status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Floor applied to the per-sender pacing delay, in seconds.
pub const MIN_SEND_DELAY_SECS: u64 = 2;

/// Default hourly send quota per sender.
pub const DEFAULT_HOURLY_LIMIT: u32 = 10;

/// Identifier for a delivery record
///
/// This is a globally unique identifier (ULID) that doubles as the job id for
/// the initial delivery attempt. ULIDs are lexicographically sortable by
/// creation time and collision-resistant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    id: ulid::Ulid,
}

impl RecordId {
    /// Create a record ID from a ULID
    #[must_use]
    pub const fn new(id: ulid::Ulid) -> Self {
        Self { id }
    }

    /// Generate a new unique record ID
    #[must_use]
    pub fn generate() -> Self {
        Self {
            id: ulid::Ulid::new(),
        }
    }

    /// Get the underlying ULID
    #[must_use]
    pub const fn ulid(&self) -> ulid::Ulid {
        self.id
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl std::str::FromStr for RecordId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s).map(|id| Self { id })
    }
}

impl serde::Serialize for RecordId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.id.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let id = ulid::Ulid::from_string(&s).map_err(serde::de::Error::custom)?;
        Ok(Self { id })
    }
}

/// Lifecycle status of a delivery record
///
/// `Sent` is terminal: once a message has gone out, the record never changes
/// again. `Failed` and `Throttled` are re-enterable, since the queue's retry
/// and reschedule machinery re-runs the state machine for those records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
    Throttled,
}

impl DeliveryStatus {
    /// Whether this status admits no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Sent)
    }

    /// Whether a record in this status may move to `next`.
    #[must_use]
    pub const fn can_become(self, next: Self) -> bool {
        let _ = next;
        !self.is_terminal()
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Throttled => "throttled",
        };
        write!(f, "{name}")
    }
}

/// One email delivery request and its current lifecycle state
///
/// Created by the scheduling API on submission and mutated only by the worker
/// that holds the associated job. Records are never deleted automatically;
/// deletion is an explicit caller action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: RecordId,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    /// Identity of the caller this delivery is accounted against.
    pub sender_id: String,
    /// Requested send time; `None` means "send now".
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: DeliveryStatus,
    /// Minimum delay between sends for this sender, in seconds. Stored as
    /// requested; the [`MIN_SEND_DELAY_SECS`] floor is applied at pacing time.
    pub send_delay_secs: u64,
    /// Hourly send quota for this sender.
    pub hourly_limit: u32,
    pub created_at: DateTime<Utc>,
}

impl DeliveryRecord {
    #[must_use]
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        sender_id: impl Into<String>,
    ) -> Self {
        Self {
            id: RecordId::generate(),
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            sender_id: sender_id.into(),
            scheduled_at: None,
            status: DeliveryStatus::Pending,
            send_delay_secs: 0,
            hourly_limit: DEFAULT_HOURLY_LIMIT,
            created_at: Utc::now(),
        }
    }
}
