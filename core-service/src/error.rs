use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::error::BridgeError),

    #[error("Browse error: {0}")]
    Browse(#[from] core_browse::BrowseError),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),
}

impl CoreError {
    pub fn is_cancellation(&self) -> bool {
        match self {
            CoreError::Bridge(err) => err.is_cancellation(),
            CoreError::Browse(err) => err.is_cancellation(),
            CoreError::Sync(err) => err.is_cancellation(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
