use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowseError {
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Invalid search response: {0}")]
    InvalidResponse(String),

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Query cancelled")]
    Cancelled,
}

impl BrowseError {
    /// Returns `true` for errors that only mean the request was abandoned.
    pub fn is_cancellation(&self) -> bool {
        match self {
            BrowseError::Cancelled => true,
            BrowseError::Bridge(err) => err.is_cancellation(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BrowseError>;
