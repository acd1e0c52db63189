//! Session identity and lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format used to derive session identifiers from their start time.
const SESSION_ID_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Identifier of a single recorded ride.
///
/// Derived from the session start time, and doubling as the file stem of
/// the session's storage container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Create an identifier from a raw string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive an identifier from a session start time.
    #[must_use]
    pub fn from_timestamp(started_at: DateTime<Utc>) -> Self {
        Self(started_at.format(SESSION_ID_FORMAT).to_string())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One recorded ride.
///
/// Owned exclusively by the session recorder: created on the transition
/// into Recording, sealed on the transition into Stopped. The end
/// timestamp stays absent while the session is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier, derived from the start time.
    pub id: SessionId,

    /// When recording started.
    pub started_at: DateTime<Utc>,

    /// When the session was sealed; absent while active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Start a new session at the given time.
    #[must_use]
    pub fn begin(started_at: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::from_timestamp(started_at),
            started_at,
            ended_at: None,
        }
    }

    /// Whether the session has been sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.ended_at.is_some()
    }
}
