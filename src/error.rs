//! Error types for gphoto2 command execution and output parsing.
//!
//! All errors implement `std::error::Error` and carry structured context.
//! Command failures keep both the classified short message (extracted from
//! gphoto2's stderr banners) and the full stderr text, so callers and
//! [`ErrorPolicy`](crate::ErrorPolicy) implementations can inspect either.

use thiserror::Error;

/// Result type alias for gphoto2 operations.
pub type Result<T, E = GPhotoError> = std::result::Result<T, E>;

/// Main error type for gphoto2 operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GPhotoError {
    #[error("failed to launch shell command: {command}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("gphoto2 command failed: {short}")]
    Command { short: String, stderr: String },

    #[error("parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("config key '{key}' has no discoverable schema")]
    UnknownKey { key: String },

    #[error("no camera found with serial '{serial}'")]
    CameraNotFound { serial: String },

    #[error("no free local port after {attempts} attempts")]
    PortAllocation { attempts: u32 },

    #[error("liveview error: {reason}")]
    Liveview { reason: String },

    #[error("liveview stream request failed")]
    Stream {
        #[source]
        source: reqwest::Error,
    },
}

impl GPhotoError {
    /// Returns whether this error is potentially recoverable through retry.
    ///
    /// This layer never retries on its own; the classification is advisory
    /// for callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            GPhotoError::Spawn { .. } => false,
            GPhotoError::Command { .. } => true,
            GPhotoError::Parse { .. } => false,
            GPhotoError::UnknownKey { .. } => false,
            GPhotoError::CameraNotFound { .. } => true,
            GPhotoError::PortAllocation { .. } => true,
            GPhotoError::Liveview { .. } => true,
            GPhotoError::Stream { .. } => true,
        }
    }

    /// Helper constructor for parse errors.
    pub fn parse_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        GPhotoError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for command failures. Falls back to the full
    /// stderr when no short message could be extracted.
    pub fn command_failed(short: impl Into<String>, stderr: impl Into<String>) -> Self {
        let short = short.into();
        let stderr = stderr.into();
        let short = if short.is_empty() { stderr.clone() } else { short };
        GPhotoError::Command { short, stderr }
    }

    /// Helper constructor for liveview failures.
    pub fn liveview_error(reason: impl Into<String>) -> Self {
        GPhotoError::Liveview { reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_traits_validation() {
        // Compile-time check: GPhotoError must be Send + Sync + 'static
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<GPhotoError>();

        let error = GPhotoError::command_failed("Out of Focus", "full stderr");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn command_failed_falls_back_to_stderr() {
        let err = GPhotoError::command_failed("", "raw stderr text");
        match err {
            GPhotoError::Command { short, stderr } => {
                assert_eq!(short, "raw stderr text");
                assert_eq!(stderr, "raw stderr text");
            }
            other => panic!("expected Command error, got {other:?}"),
        }
    }

    #[test]
    fn retryable_classification() {
        assert!(GPhotoError::command_failed("x", "y").is_retryable());
        assert!(!GPhotoError::parse_error("table", "no separator").is_retryable());
        assert!(!GPhotoError::UnknownKey { key: "/main/iso".into() }.is_retryable());
    }
}
