//! Error types for the sweep harness

use thiserror::Error;

/// Result type alias using the harness error
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Harness error types
///
/// These classify failures of the harness itself, as opposed to
/// [`crate::Category`], which classifies errors observed in the
/// application under test.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Browser failed to launch: {0}")]
    BrowserLaunch(String),

    #[error("CDP error: {0}")]
    Cdp(String),

    #[error("Authentication failed after {attempts} attempt(s)")]
    AuthenticationFailed { attempts: usize },

    #[error("Menu parse error: {0}")]
    MenuParse(String),

    #[error("Duplicate navigation target id: {0}")]
    DuplicateTargetId(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Timeout after {ms}ms waiting for: {what}")]
    Timeout { what: String, ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<chromiumoxide::error::CdpError> for HarnessError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        HarnessError::Cdp(e.to_string())
    }
}
