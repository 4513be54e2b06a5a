//! Unified error handling for the client.

use thiserror::Error;

/// Application error type.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("remote write failed: {0}")]
    Write(String),

    #[error("not connected to a remote store")]
    NotConnected,

    #[error("engine error: {0}")]
    Engine(#[from] crema_engine::Error),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SyncError::Connection("refused".into());
        assert_eq!(err.to_string(), "connection failed: refused");

        let err = SyncError::NotConnected;
        assert_eq!(err.to_string(), "not connected to a remote store");

        let err = SyncError::Engine(crema_engine::Error::EmptyName);
        assert_eq!(err.to_string(), "engine error: product name must not be empty");
    }
}
