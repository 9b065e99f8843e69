use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Unknown sync source: {source_id}")]
    UnknownSource { source_id: String },

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Malformed sync frame: {0}")]
    MalformedFrame(String),

    #[error("Invalid status response: {0}")]
    InvalidResponse(String),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Invalid sync status: {0}")]
    InvalidStatus(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },
}

impl SyncError {
    /// Returns `true` for errors that only mean the stream was abandoned.
    pub fn is_cancellation(&self) -> bool {
        match self {
            SyncError::Cancelled => true,
            SyncError::Bridge(err) => err.is_cancellation(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
