use std::path::PathBuf;

/// Failures surfaced by the browser-control layer.
#[derive(thiserror::Error, Debug)]
pub enum BrowserError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("element {selector} unavailable: {reason}")]
    Element { selector: String, reason: String },

    #[error("screenshot failed: {0}")]
    Screenshot(String),

    #[error("could not decode page result: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failures of one capture attempt or of the run as a whole.
#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("{device}: {source}")]
    Navigation {
        device: &'static str,
        #[source]
        source: BrowserError,
    },

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("no device produced a capture: {0}")]
    Incomplete(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no jobs could be resolved from arguments or {}", .0.display())]
    NoJobs(PathBuf),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CaptureError {
    /// Whether this failure ends the current attempt and hands control back to
    /// the retry loop. Everything else is expected to be absorbed where it
    /// happens.
    pub fn is_attempt_fatal(&self) -> bool {
        matches!(
            self,
            CaptureError::Navigation { .. }
                | CaptureError::Browser(_)
                | CaptureError::Incomplete(_)
                | CaptureError::Io(_)
        )
    }
}

pub type Result<T, E = CaptureError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_failures_are_attempt_fatal() {
        let err = CaptureError::Navigation {
            device: "desktop",
            source: BrowserError::Navigation {
                url: "https://example.com".into(),
                reason: "timed out".into(),
            },
        };
        assert!(err.is_attempt_fatal());
        assert_eq!(
            err.to_string(),
            "desktop: navigation to https://example.com failed: timed out"
        );
    }

    #[test]
    fn configuration_errors_are_not_retried() {
        assert!(!CaptureError::Config("bad".into()).is_attempt_fatal());
        assert!(!CaptureError::NoJobs(PathBuf::from("x.json")).is_attempt_fatal());
    }
}
