//! The backend trait and its error taxonomy
//!
//! Every document-format backend implements [`Generator`]. Callers branch
//! on [`GeneratorCaps`] flags, never on the concrete backend type, so a
//! synchronous raw-image decoder and a worker-threaded PDF engine look
//! identical from the outside.

use std::path::Path;
use std::sync::Arc;

use bitflags::bitflags;
use thiserror::Error;

use crate::geometry::Rotation;
use crate::pixmap::Pixmap;
use crate::request::PixmapRequest;
use crate::textpage::TextLayer;

bitflags! {
    /// What a backend can do beyond the mandatory open/render pair.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GeneratorCaps: u32 {
        /// Renders run on a worker context instead of the caller's thread.
        const THREADED = 1 << 0;
        /// `extract_text` produces a usable text layer.
        const TEXT_EXTRACTION = 1 << 1;
        /// The backend can print without rasterizing through the engine.
        const PRINT_NATIVE = 1 << 2;
        /// The backend exposes the raw source bytes.
        const READ_RAW_DATA = 1 << 3;
    }
}

/// Human-readable description of the format a backend handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub name: String,
    pub mime_types: Vec<String>,
}

impl FormatDescriptor {
    pub fn new(name: impl Into<String>, mime_types: Vec<String>) -> Self {
        Self {
            name: name.into(),
            mime_types,
        }
    }

    pub fn handles_mime(&self, mime: &str) -> bool {
        self.mime_types.iter().any(|m| m == mime)
    }
}

/// Extra information passed to `open`, e.g. a password collected from the
/// user after a `PasswordRequired` failure.
#[derive(Debug, Clone, Default)]
pub struct OpenHint {
    pub mime_type: Option<String>,
    pub password: Option<String>,
}

/// Document-level metadata a backend may report after a successful open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
}

/// Geometry of one page as reported by `open`, before any content exists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub index: usize,
    pub width_pt: f64,
    pub height_pt: f64,
    pub rotation: Rotation,
}

/// Why a source failed to open. Fatal to the open attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OpenError {
    #[error("source cannot be read: {0}")]
    UnreadableSource(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("a password is required to open this document")]
    PasswordRequired,
}

/// Why a render failed. Recovered per page up to a retry budget.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("failed to decode page {page}: {message}")]
    Decode { page: usize, message: String },
    #[error("out of memory while rendering page {page}")]
    OutOfMemory { page: usize },
    #[error("page {page} out of range")]
    PageOutOfRange { page: usize },
}

/// Why text extraction failed. Treated as "no text" for the page.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TextError {
    #[error("this backend does not extract text")]
    Unsupported,
    #[error("text extraction failed on page {page}")]
    Extraction { page: usize },
}

/// The capability surface every document-format backend implements.
///
/// `render` may be invoked on the caller's thread (synchronous backends)
/// or from a scheduler-owned worker context (backends declaring
/// [`GeneratorCaps::THREADED`]); implementations must not care which.
/// `close` must be safe to call after partial failures and more than once.
pub trait Generator: Send + Sync {
    fn capabilities(&self) -> GeneratorCaps;

    fn describe(&self) -> FormatDescriptor;

    /// Parse the source and report page geometry. Page content is not
    /// rendered yet.
    fn open(&self, path: &Path, hint: &OpenHint) -> Result<Vec<PageGeometry>, OpenError>;

    /// Produce a bitmap for one page at the requested size and rotation.
    fn render(&self, request: &PixmapRequest) -> Result<Pixmap, RenderError>;

    /// Produce positioned text for search and selection. Backends without
    /// [`GeneratorCaps::TEXT_EXTRACTION`] return [`TextError::Unsupported`].
    fn extract_text(&self, page_index: usize) -> Result<TextLayer, TextError> {
        let _ = page_index;
        Err(TextError::Unsupported)
    }

    /// Document metadata, if the source carries any.
    fn document_info(&self) -> DocumentInfo {
        DocumentInfo::default()
    }

    /// Release backend resources.
    fn close(&self) {}
}

/// Resolves a source to a bound backend.
///
/// How a concrete backend is located (mime sniffing, plugin registry) is
/// the caller's concern; the engine only needs something that either
/// yields a [`Generator`] or declines.
pub trait GeneratorProvider {
    /// Returns `None` when no backend handles the source, which the
    /// document layer reports as "no suitable generator".
    fn provide(&self, path: &Path, hint: &OpenHint) -> Option<Arc<dyn Generator>>;
}
