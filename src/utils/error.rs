use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Request timeout after {secs} seconds ({operation})")]
    Timeout { operation: String, secs: u64 },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Permission denied - daemon not running as root")]
    PrivilegeDenied,

    #[error("Unsupported file format: {0}")]
    UnsupportedArtifact(String),

    #[error("Mount failed: {0}")]
    MountFailure(String),

    #[error("Install failed: {0}")]
    InstallFailure(String),

    #[error("No app or installer package found in {0}")]
    NoPayloadFound(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Network error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plist error: {0}")]
    Plist(#[from] plist::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0} cancelled")]
    Cancelled(String),

    #[error("{0}")]
    Custom(String),
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_errors_carry_their_detail() {
        let err = AppError::Http("Download failed with HTTP 404 Not Found".into());
        assert_eq!(err.to_string(), "Network error: Download failed with HTTP 404 Not Found");
        assert_eq!(serde_json::to_value(&err).unwrap(), err.to_string());
    }
}
