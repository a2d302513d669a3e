use thiserror::Error;
use uuid::Uuid;

/// A record the aggregation layer could not place on the calendar.
///
/// These are collected, never raised: one bad row must not hide the rest of
/// the collection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("mission {mission_id} has unusable scheduled_date {raw:?}: {reason}")]
pub struct DataQualityError {
    pub mission_id: Uuid,
    pub raw: String,
    pub reason: String,
}

/// A write payload that must not reach the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("store rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("store i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed store payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store misconfigured: {0}")]
    Config(String),
}

/// Everything a cache operation can fail with.
#[derive(Debug, Error)]
pub enum MissionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no mission with id {0} in the current collection")]
    UnknownMission(Uuid),

    #[error("no active session; sign in first")]
    NotSignedIn,

    #[error("collection was disposed while the request was in flight")]
    Disposed,
}
