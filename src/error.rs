//! Error types shared across the crate.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Message shown to the user when the completion service fails.
pub const SERVICE_FAILURE_MESSAGE: &str = "Failed to process email. Please try again.";

/// Message shown when a refine is requested with nothing to refine.
pub const EMPTY_INPUT_MESSAGE: &str = "Please paste an email first.";

/// Errors surfaced by the refine client.
///
/// The `Display` output is what the user sees; causes are logged at the
/// point of failure and never carried into the message.
#[derive(Debug, Error)]
pub enum RefineError {
    #[error("Please paste an email first.")]
    EmptyInput,

    #[error("Failed to process email. Please try again.")]
    Service,
}

/// Failures while resolving or reading a static asset.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("path escapes the asset root: {0}")]
    Forbidden(String),

    #[error("request path is not valid percent-encoded UTF-8: {0}")]
    BadEncoding(String),

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("directory access is not allowed: {}", .0.display())]
    IsDirectory(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl AssetError {
    /// Classify an I/O error, keeping not-found distinct from everything else.
    pub fn from_io(path: PathBuf, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            AssetError::NotFound(path)
        } else {
            AssetError::Io { path, source }
        }
    }
}

/// Clipboard write failures.
#[derive(Debug, Error)]
pub enum ClipboardError {
    /// The sink refused a write (permissions, unsupported format, ...)
    #[error("clipboard write rejected: {0}")]
    Rejected(String),

    /// Both the rich and the plain-text writes failed
    #[error("Failed to copy to clipboard")]
    Unavailable,
}
