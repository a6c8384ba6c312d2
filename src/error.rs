//! Error types for the post generator and render engine

use std::fmt;
use thiserror::Error;

/// Result type alias for render and generation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Context recorded when one rendering backend fails and the engine moves on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendFailure {
    /// Backend name as reported by `RenderBackend::name`
    pub backend: &'static str,
    /// Human-readable failure message
    pub message: String,
}

impl fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.backend, self.message)
    }
}

fn format_failures(failures: &[BackendFailure]) -> String {
    if failures.is_empty() {
        return "no rendering backends configured".to_string();
    }
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur while generating or rendering a post
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to start a browser or driver
    #[error("Engine initialization failed: {0}")]
    InitializationError(String),

    /// Failed to load the document into the browser
    #[error("Failed to load document: {0}")]
    LoadError(String),

    /// Failed to capture a frame
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// Failed to decode or encode image data
    #[error("Encoding failed: {0}")]
    EncodeError(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// WebDriver protocol error
    #[error("WebDriver error: {0}")]
    WebDriverError(String),

    /// The backend does not offer this capability
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Output format outside the allow-list
    #[error("Invalid format: {0}. Use: png, jpg, jpeg, gif, mp4")]
    InvalidFormat(String),

    /// Unknown platform key
    #[error("Invalid platform: {0}. Use: instagram, linkedin, twitter")]
    InvalidPlatform(String),

    /// Video length outside the accepted range
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// A required request field was empty or absent
    #[error("{0}")]
    MissingInput(String),

    /// Every backend in the chain failed; terminal for the request
    #[error("All rendering backends failed: {}", format_failures(.0))]
    AllBackendsFailed(Vec<BackendFailure>),

    /// Text-generation API failure
    #[error("Completion API error: {0}")]
    Upstream(String),

    /// I/O failure on temporary artifacts
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error was caused by the caller's input rather than by
    /// rendering or an upstream service.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidFormat(_)
                | Error::InvalidPlatform(_)
                | Error::InvalidDuration(_)
                | Error::MissingInput(_)
        )
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::EncodeError(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::NetworkError(format!("request timed out: {}", err))
        } else {
            Error::NetworkError(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_backends_failed_lists_every_context() {
        let err = Error::AllBackendsFailed(vec![
            BackendFailure { backend: "cdp", message: "launch failed".into() },
            BackendFailure { backend: "webdriver", message: "driver missing".into() },
        ]);
        let msg = err.to_string();
        assert!(msg.contains("cdp: launch failed"));
        assert!(msg.contains("webdriver: driver missing"));
    }

    #[test]
    fn caller_errors_are_classified() {
        assert!(Error::InvalidFormat("bmp".into()).is_caller_error());
        assert!(Error::MissingInput("Prompt is required".into()).is_caller_error());
        assert!(Error::InvalidDuration("0s".into()).is_caller_error());
        assert!(!Error::RenderError("boom".into()).is_caller_error());
        assert!(!Error::AllBackendsFailed(vec![]).is_caller_error());
    }
}
