//! Annotation data model
//!
//! Annotations carry normalized (0..1) geometry so they stay valid across
//! zoom and rotation. Geometry mutations go through the document façade,
//! which couples them to pixmap-cache invalidation; the types here only
//! guarantee that geometry never leaves the page.

use bitflags::bitflags;
use vellum_generator::{NormalizedPoint, NormalizedRect};

/// Stable identity of an annotation, preserved across save/load.
pub type AnnotationId = uuid::Uuid;

bitflags! {
    /// Annotation state flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AnnotationFlags: u32 {
        /// Came from the source file rather than the user; round-trips
        /// through the source document, never through the sidecar.
        const EXTERNAL = 1 << 0;
        /// Not drawn.
        const HIDDEN = 1 << 1;
        /// Geometry and content cannot be edited.
        const READ_ONLY = 1 << 2;
        /// Cannot be deleted.
        const LOCKED = 1 << 3;
        /// Included when printing.
        const PRINTABLE = 1 << 4;
    }
}

/// What a media annotation triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Movie,
    Sound,
}

/// Validity of a digital signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureStatus {
    Valid,
    Invalid,
    Unknown,
}

/// Identity fields of a signing certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    /// Unix seconds.
    pub valid_from: i64,
    /// Unix seconds.
    pub valid_until: i64,
}

/// Everything known about a signature annotation's signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    pub certificate: CertificateInfo,
    /// Unix seconds.
    pub signed_at: i64,
    pub status: SignatureStatus,
    pub reason: Option<String>,
    pub location: Option<String>,
}

/// The closed set of annotation variants.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationKind {
    /// Text highlight; one quad per highlighted line fragment.
    Highlight { quads: Vec<NormalizedRect> },

    /// A sticky note, optionally shown open.
    Note { text: String, open: bool },

    /// Freehand drawing; one point list per stroke.
    Ink { strokes: Vec<Vec<NormalizedPoint>> },

    /// A rubber stamp identified by symbol name.
    Stamp { symbol: String },

    /// A polyline, optionally closed into a polygon.
    Line {
        points: Vec<NormalizedPoint>,
        closed: bool,
    },

    /// A movie or sound trigger region.
    Media { kind: MediaKind, reference: String },

    /// A digital signature with its certificate pair.
    Signature(SignatureInfo),
}

/// One annotation on one page.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub id: AnnotationId,
    pub kind: AnnotationKind,
    /// Bounding geometry, always within [0,1]×[0,1].
    pub boundary: NormalizedRect,
    pub author: Option<String>,
    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds.
    pub modified_at: i64,
    pub flags: AnnotationFlags,
}

impl Annotation {
    pub fn new(kind: AnnotationKind, boundary: NormalizedRect) -> Self {
        let now = unix_now();
        Self {
            id: uuid::Uuid::new_v4(),
            kind,
            boundary,
            author: None,
            created_at: now,
            modified_at: now,
            flags: AnnotationFlags::PRINTABLE,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_flags(mut self, flags: AnnotationFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn is_external(&self) -> bool {
        self.flags.contains(AnnotationFlags::EXTERNAL)
    }

    /// Move the annotation by `(dx, dy)` in normalized units, clamped so
    /// the boundary stays on the page. Interior geometry moves by the
    /// clamped delta too, so the shape stays rigid. Bumps `modified_at`.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        let moved = self.boundary.translated(dx, dy);
        let applied_dx = moved.left - self.boundary.left;
        let applied_dy = moved.top - self.boundary.top;
        self.boundary = moved;

        match &mut self.kind {
            AnnotationKind::Highlight { quads } => {
                for quad in quads {
                    *quad = quad.translated(applied_dx, applied_dy);
                }
            }
            AnnotationKind::Ink { strokes } => {
                for stroke in strokes {
                    for point in stroke {
                        *point = NormalizedPoint::new(point.x + applied_dx, point.y + applied_dy);
                    }
                }
            }
            AnnotationKind::Line { points, .. } => {
                for point in points {
                    *point = NormalizedPoint::new(point.x + applied_dx, point.y + applied_dy);
                }
            }
            AnnotationKind::Note { .. }
            | AnnotationKind::Stamp { .. }
            | AnnotationKind::Media { .. }
            | AnnotationKind::Signature(_) => {}
        }

        self.touch();
    }

    /// Bump `modified_at` to now.
    pub fn touch(&mut self) {
        self.modified_at = unix_now();
    }
}

pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(left: f64, top: f64) -> Annotation {
        Annotation::new(
            AnnotationKind::Note {
                text: "check this".to_owned(),
                open: false,
            },
            NormalizedRect::new(left, top, left + 0.1, top + 0.1),
        )
    }

    #[test]
    fn new_annotations_are_local_and_timestamped() {
        let annotation = note(0.1, 0.1).with_author("ada");
        assert!(!annotation.is_external());
        assert_eq!(annotation.author.as_deref(), Some("ada"));
        assert!(annotation.created_at > 0);
        assert_eq!(annotation.created_at, annotation.modified_at);
    }

    #[test]
    fn translate_moves_and_clamps() {
        let mut annotation = note(0.85, 0.85);
        annotation.translate(0.5, 0.5);
        assert!(annotation.boundary.right <= 1.0);
        assert!(annotation.boundary.bottom <= 1.0);
        // Rigid: the boundary kept its size.
        assert!((annotation.boundary.width() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn translate_moves_interior_geometry_by_the_same_delta() {
        let mut annotation = Annotation::new(
            AnnotationKind::Line {
                points: vec![
                    NormalizedPoint::new(0.2, 0.2),
                    NormalizedPoint::new(0.4, 0.3),
                ],
                closed: false,
            },
            NormalizedRect::new(0.2, 0.2, 0.4, 0.3),
        );
        annotation.translate(0.1, 0.0);
        match &annotation.kind {
            AnnotationKind::Line { points, .. } => {
                assert!((points[0].x - 0.3).abs() < 1e-9);
                assert!((points[1].x - 0.5).abs() < 1e-9);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn external_flag_round_trips_through_builder() {
        let annotation = note(0.0, 0.0).with_flags(AnnotationFlags::EXTERNAL);
        assert!(annotation.is_external());
    }
}
