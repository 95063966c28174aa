//! Vellum Generator Contract
//!
//! The polymorphic boundary every document-format backend implements.
//! A generator parses one document format, reports page geometry, renders
//! pixmaps at requested sizes, and optionally extracts positioned text.
//! The rest of the engine (cache, scheduler, document model) only ever
//! talks to backends through the [`Generator`] trait and branches on
//! [`GeneratorCaps`] flags, never on backend identity.

pub mod contract;
pub mod geometry;
pub mod pixmap;
pub mod request;
pub mod textpage;

pub use contract::{
    DocumentInfo, FormatDescriptor, Generator, GeneratorCaps, GeneratorProvider, OpenError,
    OpenHint, PageGeometry, RenderError, TextError,
};
pub use geometry::{NormalizedPoint, NormalizedRect, Rotation};
pub use pixmap::Pixmap;
pub use request::{PixmapRequest, RenderPurpose, RequestKey, RequesterId};
pub use textpage::{CaseSensitivity, TextLayer, TextMatch, TextSpan};
