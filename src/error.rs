//! Error taxonomy for the viewer.
//!
//! No error here is fatal to a running session: load failures leave
//! already-loaded content in place, and settings parse failures leave the
//! live state untouched.

use thiserror::Error;

/// Errors surfaced to the user by viewer operations.
#[derive(Debug, Error)]
pub enum ViewerError {
    /// A model or environment file failed to parse or decode.
    #[error("failed to load {path}: {reason}")]
    Load { path: String, reason: String },

    /// A settings document failed to deserialize. The operation is aborted
    /// atomically: no keys are applied.
    #[error("failed to parse settings: {0}")]
    Parse(String),
}

impl ViewerError {
    pub fn load(path: impl Into<String>, reason: impl ToString) -> Self {
        ViewerError::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
