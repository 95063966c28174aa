//! Purpose-priority request queue
//!
//! Pending renders wait here until dispatch. Ordering is by
//! [`RenderPurpose`] urgency (visible first), FIFO within the same
//! purpose, so a visible request submitted late still preempts queued
//! prefetch and thumbnail work.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use vellum_generator::{PixmapRequest, RequestKey};

/// A request waiting for dispatch, with the page generation observed at
/// submission time.
#[derive(Debug, Clone)]
pub struct QueuedRequest {
    pub request: PixmapRequest,
    pub generation: u64,
    seq: u64,
}

impl QueuedRequest {
    pub fn key(&self) -> RequestKey {
        self.request.key()
    }
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedRequest {}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.request.purpose.cmp(&other.request.purpose) {
            // Max-heap: reverse the sequence comparison for FIFO within a
            // purpose level.
            Ordering::Equal => other.seq.cmp(&self.seq),
            unequal => unequal,
        }
    }
}

/// Priority queue of pending requests. Single-writer: lives on the
/// coordinating context only.
#[derive(Debug, Default)]
pub struct RequestQueue {
    heap: BinaryHeap<QueuedRequest>,
    next_seq: u64,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: PixmapRequest, generation: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueuedRequest {
            request,
            generation,
            seq,
        });
    }

    /// Pop the most urgent request.
    pub fn pop(&mut self) -> Option<QueuedRequest> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Remove every queued request matching the predicate, returning how
    /// many were removed.
    pub fn remove_if<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(&QueuedRequest) -> bool,
    {
        let before = self.heap.len();
        let remaining: Vec<QueuedRequest> = self
            .heap
            .drain()
            .filter(|queued| !predicate(queued))
            .collect();
        self.heap = remaining.into_iter().collect();
        before - self.heap.len()
    }

    /// Bump the recorded generation of queued (not yet dispatched)
    /// requests for a page, so a request submitted before a mutation but
    /// rendered after it publishes as current.
    pub fn refresh_generation(&mut self, page_index: usize, generation: u64) {
        let refreshed: Vec<QueuedRequest> = self
            .heap
            .drain()
            .map(|mut queued| {
                if queued.request.page_index == page_index {
                    queued.generation = generation;
                }
                queued
            })
            .collect();
        self.heap = refreshed.into_iter().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_generator::{RenderPurpose, RequesterId};

    fn request(page: usize, purpose: RenderPurpose) -> PixmapRequest {
        PixmapRequest::new(RequesterId(1), page, 100, 100, purpose)
    }

    #[test]
    fn visible_preempts_queued_prefetch() {
        let mut queue = RequestQueue::new();
        queue.push(request(0, RenderPurpose::Prefetch), 0);
        queue.push(request(1, RenderPurpose::Thumbnail), 0);
        queue.push(request(2, RenderPurpose::Visible), 0);

        assert_eq!(queue.pop().unwrap().request.page_index, 2);
        assert_eq!(queue.pop().unwrap().request.page_index, 1);
        assert_eq!(queue.pop().unwrap().request.page_index, 0);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn fifo_within_same_purpose() {
        let mut queue = RequestQueue::new();
        for page in 0..4 {
            queue.push(request(page, RenderPurpose::Visible), 0);
        }
        for page in 0..4 {
            assert_eq!(queue.pop().unwrap().request.page_index, page);
        }
    }

    #[test]
    fn remove_if_filters_by_key() {
        let mut queue = RequestQueue::new();
        queue.push(request(0, RenderPurpose::Visible), 0);
        queue.push(request(1, RenderPurpose::Visible), 0);
        queue.push(request(0, RenderPurpose::Prefetch), 0);

        let removed = queue.remove_if(|queued| queued.request.page_index == 0);
        assert_eq!(removed, 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().unwrap().request.page_index, 1);
    }

    #[test]
    fn refresh_generation_targets_one_page() {
        let mut queue = RequestQueue::new();
        queue.push(request(0, RenderPurpose::Visible), 1);
        queue.push(request(1, RenderPurpose::Visible), 1);

        queue.refresh_generation(0, 5);

        while let Some(queued) = queue.pop() {
            match queued.request.page_index {
                0 => assert_eq!(queued.generation, 5),
                _ => assert_eq!(queued.generation, 1),
            }
        }
    }
}
