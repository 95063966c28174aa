//! Document-level error taxonomy
//!
//! Backend-specific failure detail never crosses the façade boundary:
//! every generator error is re-classified into [`DocumentError`] before it
//! reaches the notification surface.

use thiserror::Error;
use vellum_generator::OpenError;

/// The only error surface the document façade exposes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("source cannot be read: {0}")]
    UnreadableSource(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("a password is required to open this document")]
    PasswordRequired,

    #[error("no suitable generator for {0}")]
    NoSuitableGenerator(String),

    #[error("no document is open")]
    DocumentClosed,

    #[error("page {0} out of range")]
    PageOutOfRange(usize),

    #[error("rendering failed on page {page}: {message}")]
    RenderFailed { page: usize, message: String },
}

impl From<OpenError> for DocumentError {
    fn from(error: OpenError) -> Self {
        match error {
            OpenError::UnreadableSource(message) => DocumentError::UnreadableSource(message),
            OpenError::UnsupportedFormat(message) => DocumentError::UnsupportedFormat(message),
            OpenError::PasswordRequired => DocumentError::PasswordRequired,
        }
    }
}

pub type DocumentResult<T> = Result<T, DocumentError>;
