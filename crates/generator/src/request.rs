//! Render request descriptions
//!
//! A [`PixmapRequest`] describes one render job: which page, at what pixel
//! size and rotation, and why it was issued. Requests are transient values;
//! they do not outlive their completion or cancellation.

use crate::geometry::Rotation;

/// Why a render was requested.
///
/// Purposes order by display urgency: `Visible` work preempts queued
/// `Prefetch` and `Thumbnail` work when the backend processes one job at a
/// time, and the cache evicts non-visible entries first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RenderPurpose {
    /// Background readahead for pages near the viewport (lowest urgency).
    Prefetch = 0,

    /// Thumbnail strip rendering.
    Thumbnail = 1,

    /// The page is on screen right now.
    Visible = 2,
}

/// Opaque identity of the party that issued a request.
///
/// Used only for cancellation: when a requester's outstanding interest
/// changes (the user scrolled away), its pending requests are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequesterId(pub u64);

/// The de-duplication identity of a render job.
///
/// Two requests with equal keys describe the same decode work; the
/// scheduler guarantees at most one in-flight render per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub page_index: usize,
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    pub purpose: RenderPurpose,
}

/// A single render job description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixmapRequest {
    pub requester: RequesterId,
    pub page_index: usize,
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    pub purpose: RenderPurpose,
}

impl PixmapRequest {
    pub fn new(
        requester: RequesterId,
        page_index: usize,
        width: u32,
        height: u32,
        purpose: RenderPurpose,
    ) -> Self {
        Self {
            requester,
            page_index,
            width,
            height,
            rotation: Rotation::R0,
            purpose,
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn key(&self) -> RequestKey {
        RequestKey {
            page_index: self.page_index,
            width: self.width,
            height: self.height,
            rotation: self.rotation,
            purpose: self.purpose,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purpose_ordering_puts_visible_first() {
        assert!(RenderPurpose::Visible > RenderPurpose::Thumbnail);
        assert!(RenderPurpose::Thumbnail > RenderPurpose::Prefetch);
    }

    #[test]
    fn identical_requests_share_a_key() {
        let a = PixmapRequest::new(RequesterId(1), 3, 800, 600, RenderPurpose::Visible);
        let b = PixmapRequest::new(RequesterId(2), 3, 800, 600, RenderPurpose::Visible);
        assert_eq!(a.key(), b.key());

        let c = b.with_rotation(Rotation::R90);
        assert_ne!(a.key(), c.key());
    }
}
