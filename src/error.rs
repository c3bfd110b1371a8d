use thiserror::Error;

/// Error types for the recording backup
#[derive(Debug, Error)]
pub enum BackupError {
    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Missing required configuration: {0}")]
    MissingConfiguration(String),

    /// Authentication errors, fatal for the client that raised them
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Network errors
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Network error: {0}")]
    Network(String),

    /// Ledger errors
    #[error("Ledger file {path} is corrupt: {reason}")]
    CorruptLedger { path: String, reason: String },

    /// Transfer errors
    #[error("Download failed: {0}")]
    Download(String),

    #[error("Upload failed{}: {message}", .status.map(|s| format!(" with status {}", s)).unwrap_or_default())]
    Upload {
        status: Option<u16>,
        message: String,
    },

    #[error("No recordings available from the API or the ledger")]
    NoRecordings,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize data: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results using BackupError
pub type Result<T> = std::result::Result<T, BackupError>;

impl BackupError {
    /// Helper to create configuration errors
    pub fn config(msg: impl Into<String>) -> Self {
        BackupError::Config(msg.into())
    }

    /// Helper to create Internal errors with context
    pub fn internal(msg: impl Into<String>) -> Self {
        BackupError::Internal(msg.into())
    }

    pub fn upload(status: Option<u16>, msg: impl Into<String>) -> Self {
        BackupError::Upload {
            status,
            message: msg.into(),
        }
    }

    /// Errors worth retrying within the fixed attempt bound
    pub fn is_transient(&self) -> bool {
        matches!(self, BackupError::TransientNetwork(_))
    }

    /// Errors that end the process before or instead of any per-file work
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BackupError::Config(_)
                | BackupError::MissingConfiguration(_)
                | BackupError::Auth(_)
                | BackupError::NoRecordings
        )
    }
}

/// Timeouts and refused connections are transient; everything else is not
impl From<reqwest::Error> for BackupError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            BackupError::TransientNetwork(err.to_string())
        } else {
            BackupError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BackupError::MissingConfiguration("Zoom.account_id".to_string());
        assert_eq!(
            err.to_string(),
            "Missing required configuration: Zoom.account_id"
        );
    }

    #[test]
    fn test_upload_error_carries_status() {
        let err = BackupError::upload(Some(416), "range not satisfiable");
        assert_eq!(
            err.to_string(),
            "Upload failed with status 416: range not satisfiable"
        );

        let err = BackupError::upload(None, "session lost");
        assert_eq!(err.to_string(), "Upload failed: session lost");
    }

    #[test]
    fn test_error_helpers() {
        let err = BackupError::internal("Something went wrong");
        assert!(matches!(err, BackupError::Internal(_)));

        let err = BackupError::config("bad template");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_only_transient_network_is_transient() {
        assert!(BackupError::TransientNetwork("timeout".into()).is_transient());
        assert!(!BackupError::Network("404".into()).is_transient());
        assert!(!BackupError::Download("403".into()).is_transient());
        assert!(!BackupError::upload(Some(500), "boom").is_transient());
    }
}
