//! Sidecar persistence for annotations and bookmarks
//!
//! Local contents (user-added annotations, bookmark flags) persist to a
//! JSON sidecar file next to the source document, wrapped in a versioned
//! envelope and written atomically via a temp file + rename. Annotations
//! flagged `EXTERNAL` round-trip through the source document itself and
//! never touch the sidecar.
//!
//! Loading is per-record tolerant: one corrupt annotation record is
//! skipped and counted, the rest of the page still loads.

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vellum_generator::{NormalizedPoint, NormalizedRect};

use crate::annotation::{
    Annotation, AnnotationFlags, AnnotationKind, CertificateInfo, MediaKind, SignatureInfo,
    SignatureStatus,
};
use crate::page::Page;

const SIDECAR_SCHEMA_VERSION: u32 = 1;
const SIDECAR_SUFFIX: &str = ".vellum.json";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unsupported sidecar version {0}")]
    UnsupportedVersion(u32),
}

/// Sidecar path for a document: the full source filename plus a suffix.
pub fn sidecar_path(document_path: &Path) -> PathBuf {
    let mut path = document_path.to_string_lossy().into_owned();
    path.push_str(SIDECAR_SUFFIX);
    PathBuf::from(path)
}

/// Local contents of one page, as loaded from the sidecar.
#[derive(Debug, Clone)]
pub struct PageLocalData {
    pub page_index: usize,
    pub bookmark: bool,
    pub annotations: Vec<Annotation>,
}

/// Everything a sidecar load produced.
#[derive(Debug, Clone, Default)]
pub struct LoadedSidecar {
    pub pages: Vec<PageLocalData>,
    /// Records that failed validation and were skipped.
    pub skipped_records: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct SidecarEnvelope {
    version: u32,
    pages: Vec<PageRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PageRecord {
    page_index: usize,
    #[serde(default)]
    bookmark: bool,
    /// Kept as raw values so one bad record does not poison the page.
    #[serde(default)]
    annotations: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RectRecord {
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
}

impl RectRecord {
    fn from_rect(rect: &NormalizedRect) -> Self {
        Self {
            left: rect.left,
            top: rect.top,
            right: rect.right,
            bottom: rect.bottom,
        }
    }

    fn to_rect(&self) -> Option<NormalizedRect> {
        let values = [self.left, self.top, self.right, self.bottom];
        if values.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(NormalizedRect::new(
            self.left,
            self.top,
            self.right,
            self.bottom,
        ))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PointRecord {
    x: f64,
    y: f64,
}

impl PointRecord {
    fn from_point(point: &NormalizedPoint) -> Self {
        Self {
            x: point.x,
            y: point.y,
        }
    }

    fn to_point(&self) -> Option<NormalizedPoint> {
        if !self.x.is_finite() || !self.y.is_finite() {
            return None;
        }
        Some(NormalizedPoint::new(self.x, self.y))
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KindRecord {
    Highlight {
        quads: Vec<RectRecord>,
    },
    Note {
        text: String,
        open: bool,
    },
    Ink {
        strokes: Vec<Vec<PointRecord>>,
    },
    Stamp {
        symbol: String,
    },
    Line {
        points: Vec<PointRecord>,
        closed: bool,
    },
    Media {
        kind: String,
        reference: String,
    },
    Signature {
        subject: String,
        issuer: String,
        valid_from: i64,
        valid_until: i64,
        signed_at: i64,
        status: String,
        reason: Option<String>,
        location: Option<String>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct AnnotationRecord {
    id: uuid::Uuid,
    boundary: RectRecord,
    author: Option<String>,
    created_at: i64,
    modified_at: i64,
    flags: u32,
    #[serde(flatten)]
    kind: KindRecord,
}

impl AnnotationRecord {
    fn from_annotation(annotation: &Annotation) -> Self {
        let kind = match &annotation.kind {
            AnnotationKind::Highlight { quads } => KindRecord::Highlight {
                quads: quads.iter().map(RectRecord::from_rect).collect(),
            },
            AnnotationKind::Note { text, open } => KindRecord::Note {
                text: text.clone(),
                open: *open,
            },
            AnnotationKind::Ink { strokes } => KindRecord::Ink {
                strokes: strokes
                    .iter()
                    .map(|stroke| stroke.iter().map(PointRecord::from_point).collect())
                    .collect(),
            },
            AnnotationKind::Stamp { symbol } => KindRecord::Stamp {
                symbol: symbol.clone(),
            },
            AnnotationKind::Line { points, closed } => KindRecord::Line {
                points: points.iter().map(PointRecord::from_point).collect(),
                closed: *closed,
            },
            AnnotationKind::Media { kind, reference } => KindRecord::Media {
                kind: match kind {
                    MediaKind::Movie => "movie".to_owned(),
                    MediaKind::Sound => "sound".to_owned(),
                },
                reference: reference.clone(),
            },
            AnnotationKind::Signature(info) => KindRecord::Signature {
                subject: info.certificate.subject.clone(),
                issuer: info.certificate.issuer.clone(),
                valid_from: info.certificate.valid_from,
                valid_until: info.certificate.valid_until,
                signed_at: info.signed_at,
                status: match info.status {
                    SignatureStatus::Valid => "valid".to_owned(),
                    SignatureStatus::Invalid => "invalid".to_owned(),
                    SignatureStatus::Unknown => "unknown".to_owned(),
                },
                reason: info.reason.clone(),
                location: info.location.clone(),
            },
        };
        Self {
            id: annotation.id,
            boundary: RectRecord::from_rect(&annotation.boundary),
            author: annotation.author.clone(),
            created_at: annotation.created_at,
            modified_at: annotation.modified_at,
            flags: annotation.flags.bits(),
            kind,
        }
    }

    /// Validate and convert; `None` means the record is corrupt and must
    /// be skipped.
    fn into_annotation(self) -> Option<Annotation> {
        let boundary = self.boundary.to_rect()?;
        let kind = match self.kind {
            KindRecord::Highlight { quads } => AnnotationKind::Highlight {
                quads: quads
                    .iter()
                    .map(RectRecord::to_rect)
                    .collect::<Option<Vec<_>>>()?,
            },
            KindRecord::Note { text, open } => AnnotationKind::Note { text, open },
            KindRecord::Ink { strokes } => AnnotationKind::Ink {
                strokes: strokes
                    .iter()
                    .map(|stroke| {
                        stroke
                            .iter()
                            .map(PointRecord::to_point)
                            .collect::<Option<Vec<_>>>()
                    })
                    .collect::<Option<Vec<_>>>()?,
            },
            KindRecord::Stamp { symbol } => AnnotationKind::Stamp { symbol },
            KindRecord::Line { points, closed } => AnnotationKind::Line {
                points: points
                    .iter()
                    .map(PointRecord::to_point)
                    .collect::<Option<Vec<_>>>()?,
                closed,
            },
            KindRecord::Media { kind, reference } => AnnotationKind::Media {
                kind: match kind.as_str() {
                    "movie" => MediaKind::Movie,
                    "sound" => MediaKind::Sound,
                    _ => return None,
                },
                reference,
            },
            KindRecord::Signature {
                subject,
                issuer,
                valid_from,
                valid_until,
                signed_at,
                status,
                reason,
                location,
            } => AnnotationKind::Signature(SignatureInfo {
                certificate: CertificateInfo {
                    subject,
                    issuer,
                    valid_from,
                    valid_until,
                },
                signed_at,
                status: match status.as_str() {
                    "valid" => SignatureStatus::Valid,
                    "invalid" => SignatureStatus::Invalid,
                    _ => SignatureStatus::Unknown,
                },
                reason,
                location,
            }),
        };
        Some(Annotation {
            id: self.id,
            kind,
            boundary,
            author: self.author,
            created_at: self.created_at,
            modified_at: self.modified_at,
            flags: AnnotationFlags::from_bits_truncate(self.flags),
        })
    }
}

/// Persist the pages' local contents. Returns the sidecar path if one was
/// written; a document with nothing local removes a stale sidecar and
/// returns `None`.
pub fn save_local_contents(
    document_path: &Path,
    pages: &[Page],
) -> Result<Option<PathBuf>, PersistenceError> {
    let mut records = Vec::new();
    for page in pages {
        let annotations: Vec<serde_json::Value> = page
            .annotations()
            .iter()
            .filter(|annotation| !annotation.is_external())
            .map(AnnotationRecord::from_annotation)
            .map(|record| serde_json::to_value(&record))
            .collect::<Result<_, _>>()?;
        if annotations.is_empty() && !page.bookmarked() {
            continue;
        }
        records.push(PageRecord {
            page_index: page.index(),
            bookmark: page.bookmarked(),
            annotations,
        });
    }

    let path = sidecar_path(document_path);
    if records.is_empty() {
        if path.exists() {
            fs::remove_file(&path)?;
        }
        return Ok(None);
    }

    let envelope = SidecarEnvelope {
        version: SIDECAR_SCHEMA_VERSION,
        pages: records,
    };
    let json = serde_json::to_string_pretty(&envelope)?;

    let temp = path.with_extension("json.tmp");
    fs::write(&temp, json)?;
    fs::rename(&temp, &path)?;
    Ok(Some(path))
}

/// Load a document's sidecar, if one exists. Corrupt annotation records
/// are skipped and counted; an unreadable envelope is an error.
pub fn load_local_contents(
    document_path: &Path,
) -> Result<Option<LoadedSidecar>, PersistenceError> {
    let path = sidecar_path(document_path);
    if !path.exists() {
        return Ok(None);
    }

    let json = fs::read_to_string(&path)?;
    let envelope: SidecarEnvelope = serde_json::from_str(&json)?;
    if envelope.version > SIDECAR_SCHEMA_VERSION {
        return Err(PersistenceError::UnsupportedVersion(envelope.version));
    }

    let mut loaded = LoadedSidecar::default();
    for record in envelope.pages {
        let mut annotations = Vec::new();
        for value in record.annotations {
            let parsed = serde_json::from_value::<AnnotationRecord>(value)
                .ok()
                .and_then(AnnotationRecord::into_annotation);
            match parsed {
                Some(annotation) => annotations.push(annotation),
                None => {
                    warn!(
                        "skipping corrupt annotation record on page {}",
                        record.page_index
                    );
                    loaded.skipped_records += 1;
                }
            }
        }
        loaded.pages.push(PageLocalData {
            page_index: record.page_index,
            bookmark: record.bookmark,
            annotations,
        });
    }
    Ok(Some(loaded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_generator::PageGeometry;
    use vellum_generator::Rotation;

    fn page(index: usize) -> Page {
        Page::new(&PageGeometry {
            index,
            width_pt: 612.0,
            height_pt: 792.0,
            rotation: Rotation::R0,
        })
    }

    fn note(text: &str) -> Annotation {
        Annotation::new(
            AnnotationKind::Note {
                text: text.to_owned(),
                open: false,
            },
            NormalizedRect::new(0.1, 0.1, 0.2, 0.2),
        )
        .with_author("reviewer")
    }

    #[test]
    fn round_trip_preserves_non_external_annotations_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let doc_path = dir.path().join("report.pdf");

        let mut pages = vec![page(0), page(1)];
        pages[0].add_annotation(note("first"));
        pages[0].add_annotation(note("second"));
        pages[1].add_annotation(
            Annotation::new(
                AnnotationKind::Highlight {
                    quads: vec![NormalizedRect::new(0.0, 0.5, 1.0, 0.55)],
                },
                NormalizedRect::new(0.0, 0.5, 1.0, 0.55),
            ),
        );
        pages[1].set_bookmarked(true);

        let saved = save_local_contents(&doc_path, &pages).unwrap();
        assert!(saved.is_some());

        let loaded = load_local_contents(&doc_path).unwrap().unwrap();
        assert_eq!(loaded.skipped_records, 0);
        assert_eq!(loaded.pages.len(), 2);

        let first = &loaded.pages[0];
        assert_eq!(first.annotations.len(), 2);
        assert_eq!(first.annotations[0], pages[0].annotations()[0]);
        assert_eq!(first.annotations[1], pages[0].annotations()[1]);

        let second = &loaded.pages[1];
        assert!(second.bookmark);
        assert_eq!(second.annotations[0], pages[1].annotations()[0]);
    }

    #[test]
    fn external_annotations_are_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let doc_path = dir.path().join("report.pdf");

        let mut pages = vec![page(0)];
        pages[0].add_annotation(note("mine"));
        pages[0].add_annotation(note("from the file").with_flags(AnnotationFlags::EXTERNAL));

        save_local_contents(&doc_path, &pages).unwrap();
        let loaded = load_local_contents(&doc_path).unwrap().unwrap();
        assert_eq!(loaded.pages[0].annotations.len(), 1);
        match &loaded.pages[0].annotations[0].kind {
            AnnotationKind::Note { text, .. } => assert_eq!(text, "mine"),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn nothing_local_means_no_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let doc_path = dir.path().join("plain.pdf");

        let pages = vec![page(0)];
        assert!(save_local_contents(&doc_path, &pages).unwrap().is_none());
        assert!(!sidecar_path(&doc_path).exists());
        assert!(load_local_contents(&doc_path).unwrap().is_none());

        // A stale sidecar from an earlier save is removed once the last
        // local content is gone.
        let mut with_content = vec![page(0)];
        with_content[0].set_bookmarked(true);
        save_local_contents(&doc_path, &with_content).unwrap();
        assert!(sidecar_path(&doc_path).exists());
        save_local_contents(&doc_path, &pages).unwrap();
        assert!(!sidecar_path(&doc_path).exists());
    }

    #[test]
    fn corrupt_records_are_skipped_individually() {
        let dir = tempfile::tempdir().unwrap();
        let doc_path = dir.path().join("report.pdf");

        let mut pages = vec![page(0)];
        pages[0].add_annotation(note("good"));
        save_local_contents(&doc_path, &pages).unwrap();

        // Corrupt one record in place by hand.
        let path = sidecar_path(&doc_path);
        let mut envelope: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let annotations = envelope["pages"][0]["annotations"].as_array_mut().unwrap();
        annotations.push(serde_json::json!({ "type": "note", "garbage": true }));
        annotations.push(serde_json::json!({ "not even": "an annotation" }));
        fs::write(&path, serde_json::to_string(&envelope).unwrap()).unwrap();

        let loaded = load_local_contents(&doc_path).unwrap().unwrap();
        assert_eq!(loaded.pages[0].annotations.len(), 1);
        assert_eq!(loaded.skipped_records, 2);
    }

    #[test]
    fn non_finite_geometry_is_treated_as_corrupt() {
        let record = AnnotationRecord {
            id: uuid::Uuid::new_v4(),
            boundary: RectRecord {
                left: f64::NAN,
                top: 0.0,
                right: 0.5,
                bottom: 0.5,
            },
            author: None,
            created_at: 0,
            modified_at: 0,
            flags: 0,
            kind: KindRecord::Stamp {
                symbol: "draft".to_owned(),
            },
        };
        assert!(record.into_annotation().is_none());
    }

    #[test]
    fn future_versions_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let doc_path = dir.path().join("report.pdf");
        fs::write(
            sidecar_path(&doc_path),
            serde_json::json!({ "version": 99, "pages": [] }).to_string(),
        )
        .unwrap();

        let result = load_local_contents(&doc_path);
        assert!(matches!(
            result,
            Err(PersistenceError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn signature_annotations_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let doc_path = dir.path().join("signed.pdf");

        let info = SignatureInfo {
            certificate: CertificateInfo {
                subject: "CN=Ada".to_owned(),
                issuer: "CN=Test CA".to_owned(),
                valid_from: 1_600_000_000,
                valid_until: 1_900_000_000,
            },
            signed_at: 1_700_000_000,
            status: SignatureStatus::Valid,
            reason: Some("approval".to_owned()),
            location: None,
        };
        let mut pages = vec![page(0)];
        pages[0].add_annotation(Annotation::new(
            AnnotationKind::Signature(info.clone()),
            NormalizedRect::new(0.6, 0.8, 0.95, 0.95),
        ));

        save_local_contents(&doc_path, &pages).unwrap();
        let loaded = load_local_contents(&doc_path).unwrap().unwrap();
        match &loaded.pages[0].annotations[0].kind {
            AnnotationKind::Signature(loaded_info) => assert_eq!(loaded_info, &info),
            other => panic!("unexpected kind {other:?}"),
        }
    }
}
