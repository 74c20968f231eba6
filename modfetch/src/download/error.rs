//! Download error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors collected while downloading.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    #[error("failed to write {}: {source}", .path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    #[error("failed to copy {} to {}: {source}", .from.display(), .to.display())]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("invalid locator '{locator}': {reason}")]
    InvalidLocator { locator: String, reason: String },

    #[error("failed to download {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("server for {url} ignored the byte range request")]
    RangeIgnored { url: String },

    #[error("incomplete transfer of {url}: expected {expected} bytes, got {actual}")]
    Incomplete { url: String, expected: u64, actual: u64 },

    #[error("validation of {} failed: {reason}", .path.display())]
    ValidationFailed { path: PathBuf, reason: String },

    #[error("HTTP client error: {0}")]
    Client(String),
}

impl DownloadError {
    /// The URL or path this error concerns, for reporting.
    pub fn subject(&self) -> String {
        match self {
            Self::CreateDirFailed { path, .. }
            | Self::WriteFailed { path, .. }
            | Self::ValidationFailed { path, .. } => path.display().to_string(),
            Self::CopyFailed { from, .. } => from.display().to_string(),
            Self::InvalidLocator { locator, .. } => locator.clone(),
            Self::DownloadFailed { url, .. }
            | Self::Timeout { url, .. }
            | Self::RangeIgnored { url }
            | Self::Incomplete { url, .. } => url.clone(),
            Self::Client(_) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DownloadError::Incomplete {
            url: "http://example.com/a.jar".to_string(),
            expected: 10,
            actual: 4,
        };
        assert_eq!(
            err.to_string(),
            "incomplete transfer of http://example.com/a.jar: expected 10 bytes, got 4"
        );
        assert_eq!(err.subject(), "http://example.com/a.jar");
    }

    #[test]
    fn test_validation_display() {
        let err = DownloadError::ValidationFailed {
            path: PathBuf::from("/lib/a.jar"),
            reason: "digest mismatch".to_string(),
        };
        assert!(err.to_string().contains("/lib/a.jar"));
        assert!(err.to_string().contains("digest mismatch"));
    }
}
