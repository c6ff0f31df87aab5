//! Failure taxonomy for the render lifecycle.
//!
//! Every failure surfaces to the HTTP caller with its own status code and a
//! human-readable diagnostic. Nothing here is retried internally.

use std::fmt;

pub type RenderResult<T> = Result<T, RenderError>;

/// Coarse failure class, used for status mapping and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    NotFound,
    Timeout,
    RenderFailure,
    ArtifactMissing,
    InvocationError,
    StorageError,
    BadRequest,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::NotFound => "not_found",
            FailureKind::Timeout => "timeout",
            FailureKind::RenderFailure => "render_failure",
            FailureKind::ArtifactMissing => "artifact_missing",
            FailureKind::InvocationError => "invocation_error",
            FailureKind::StorageError => "storage_error",
            FailureKind::BadRequest => "bad_request",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    /// Unknown preset scene.
    #[error("Scene {0} not found")]
    NotFound(String),

    #[error("Rendering timed out (>{secs} seconds)")]
    Timeout { secs: u64 },

    /// Renderer ran and exited non-zero.
    ///
    /// Streams are decoded as lossy UTF-8: invalid byte sequences become U+FFFD,
    /// everything else is kept as emitted.
    #[error("{stderr}")]
    RenderFailure {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// Renderer exited zero but no matching artifact was found.
    #[error("Video file not found after rendering")]
    ArtifactMissing { stdout: String, stderr: String },

    #[error("failed to invoke renderer: {0}")]
    InvocationError(String),

    #[error("cache storage error: {0}")]
    StorageError(#[source] std::io::Error),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl RenderError {
    pub fn invocation(msg: impl Into<String>) -> Self {
        Self::InvocationError(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            RenderError::NotFound(_) => FailureKind::NotFound,
            RenderError::Timeout { .. } => FailureKind::Timeout,
            RenderError::RenderFailure { .. } => FailureKind::RenderFailure,
            RenderError::ArtifactMissing { .. } => FailureKind::ArtifactMissing,
            RenderError::InvocationError(_) => FailureKind::InvocationError,
            RenderError::StorageError(_) => FailureKind::StorageError,
            RenderError::BadRequest(_) => FailureKind::BadRequest,
        }
    }

    /// HTTP status code the API answers with for this failure.
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            FailureKind::NotFound => 404,
            FailureKind::Timeout => 408,
            FailureKind::RenderFailure | FailureKind::BadRequest => 400,
            FailureKind::ArtifactMissing
            | FailureKind::InvocationError
            | FailureKind::StorageError => 500,
        }
    }

    /// Captured renderer stdout, when the failure carries one.
    pub fn stdout(&self) -> Option<&str> {
        match self {
            RenderError::RenderFailure { stdout, .. }
            | RenderError::ArtifactMissing { stdout, .. } => Some(stdout),
            _ => None,
        }
    }

    /// Captured renderer stderr for failures whose message is not already stderr.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            RenderError::ArtifactMissing { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: Status code mapping
    /// Validates: each failure kind gets its own distinguishing HTTP status
    #[test]
    fn test_http_status_mapping() {
        assert_eq!(RenderError::NotFound("x".into()).http_status(), 404);
        assert_eq!(RenderError::Timeout { secs: 120 }.http_status(), 408);
        let failure = RenderError::RenderFailure {
            code: Some(1),
            stdout: String::new(),
            stderr: "boom".into(),
        };
        assert_eq!(failure.http_status(), 400);
        let missing = RenderError::ArtifactMissing {
            stdout: String::new(),
            stderr: String::new(),
        };
        assert_eq!(missing.http_status(), 500);
        assert_eq!(RenderError::invocation("nope").http_status(), 500);
        let io = std::io::Error::other("disk full");
        assert_eq!(RenderError::StorageError(io).http_status(), 500);
    }

    /// Test: Render failure message
    /// Validates: engine stderr is surfaced untouched as the diagnostic
    #[test]
    fn test_render_failure_keeps_stderr_verbatim() {
        let err = RenderError::RenderFailure {
            code: Some(2),
            stdout: "partial\n".into(),
            stderr: "NameError: name 'r' is not defined\n".into(),
        };
        assert_eq!(err.to_string(), "NameError: name 'r' is not defined\n");
        assert_eq!(err.stdout(), Some("partial\n"));
        assert_eq!(err.kind(), FailureKind::RenderFailure);
    }

    /// Test: Timeout message
    /// Validates: the configured bound is part of the diagnostic
    #[test]
    fn test_timeout_message() {
        let err = RenderError::Timeout { secs: 120 };
        assert_eq!(err.to_string(), "Rendering timed out (>120 seconds)");
        assert_eq!(err.kind().to_string(), "timeout");
    }
}
