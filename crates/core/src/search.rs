//! Incremental full-document text search
//!
//! The engine advances one page per step in the requested direction,
//! materializing a page's text layer on demand through the generator and
//! caching it on the page so an already-searched page is never decoded
//! again. A session covers each document position exactly once: from the
//! origin to the document edge, then (if wrapping) from the opposite edge
//! back to the origin, reporting `Exhausted` when it returns to the start
//! without further matches.

use log::debug;

use vellum_generator::{
    CaseSensitivity, Generator, GeneratorCaps, NormalizedRect, TextLayer, TextMatch,
};

use crate::page::Page;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDirection {
    Forward,
    Backward,
}

/// Parameters of a search session.
#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub direction: SearchDirection,
    pub case: CaseSensitivity,
    /// Continue from the opposite edge of the document after passing the
    /// last/first page.
    pub wrap: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            direction: SearchDirection::Forward,
            case: CaseSensitivity::Insensitive,
            wrap: true,
        }
    }
}

/// A located match, ready for the display layer to highlight.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub page_index: usize,
    pub rects: Vec<NormalizedRect>,
}

/// Search state machine states.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SearchStatus {
    #[default]
    Idle,
    Searching,
    Found(SearchHit),
    /// The scan reached the document edge without a match and wrapping
    /// was disabled.
    NotFound,
    /// The scan wrapped all the way back to its origin.
    Exhausted,
}

/// What one `advance` step did.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchStep {
    /// The page scanned in this step, if any.
    pub scanned_page: Option<usize>,
    /// Whether the scanned page produced the match.
    pub found_on_page: bool,
    pub status: SearchStatus,
}

struct Scan {
    query: String,
    options: SearchOptions,
    origin_page: usize,
    /// Character position on the origin page where the session started.
    /// Forward sessions start at 0 (whole page eligible); backward
    /// sessions at `usize::MAX`.
    origin_offset: usize,
    cursor: usize,
    /// Intra-page continuation position. Forward: matches must start at
    /// or after it. Backward: matches must start before it.
    offset: usize,
    wrapped: bool,
    page_count: usize,
}

/// Incremental search over the document's text layers.
#[derive(Default)]
pub struct SearchEngine {
    scan: Option<Scan>,
    status: SearchStatus,
}

impl SearchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> &SearchStatus {
        &self.status
    }

    /// Begin a session. Replaces any previous session.
    pub fn start(
        &mut self,
        query: impl Into<String>,
        options: SearchOptions,
        from_page: usize,
        page_count: usize,
    ) {
        if page_count == 0 {
            self.scan = None;
            self.status = SearchStatus::NotFound;
            return;
        }
        let origin_page = from_page.min(page_count - 1);
        let origin_offset = match options.direction {
            SearchDirection::Forward => 0,
            SearchDirection::Backward => usize::MAX,
        };
        self.scan = Some(Scan {
            query: query.into(),
            options,
            origin_page,
            origin_offset,
            cursor: origin_page,
            offset: origin_offset,
            wrapped: false,
            page_count,
        });
        self.status = SearchStatus::Searching;
    }

    /// Abandon the session.
    pub fn reset(&mut self) {
        self.scan = None;
        self.status = SearchStatus::Idle;
    }

    /// Scan one page. After a `Found` status, calling `advance` again
    /// resumes the session past that match.
    pub fn advance(&mut self, pages: &mut [Page], generator: &dyn Generator) -> SearchStep {
        let Some(scan) = &mut self.scan else {
            return SearchStep {
                scanned_page: None,
                found_on_page: false,
                status: self.status.clone(),
            };
        };

        let page_index = scan.cursor;
        let matches = match ensure_text_layer(&mut pages[page_index], generator) {
            Some(layer) => layer.find_all(&scan.query, scan.options.case),
            None => Vec::new(),
        };

        if let Some(hit) = pick_match(scan, &matches) {
            scan.offset = match scan.options.direction {
                SearchDirection::Forward => hit.char_end,
                SearchDirection::Backward => hit.char_start,
            };
            let found = SearchHit {
                page_index,
                rects: hit.rects.clone(),
            };
            self.status = SearchStatus::Found(found);
            return SearchStep {
                scanned_page: Some(page_index),
                found_on_page: true,
                status: self.status.clone(),
            };
        }

        let status = match step_page(scan) {
            Some(terminal) => {
                self.scan = None;
                terminal
            }
            None => SearchStatus::Searching,
        };
        self.status = status.clone();
        SearchStep {
            scanned_page: Some(page_index),
            found_on_page: false,
            status,
        }
    }
}

/// First (forward) or last (backward) match eligible under the session's
/// position constraints.
fn pick_match<'a>(scan: &Scan, matches: &'a [TextMatch]) -> Option<&'a TextMatch> {
    let at_wrapped_origin = scan.wrapped && scan.cursor == scan.origin_page;
    match scan.options.direction {
        SearchDirection::Forward => matches.iter().find(|m| {
            m.char_start >= scan.offset && (!at_wrapped_origin || m.char_start < scan.origin_offset)
        }),
        SearchDirection::Backward => matches.iter().rev().find(|m| {
            m.char_start < scan.offset && (!at_wrapped_origin || m.char_start >= scan.origin_offset)
        }),
    }
}

/// Move the cursor to the next page, or return the terminal status when
/// the session's coverage is complete.
fn step_page(scan: &mut Scan) -> Option<SearchStatus> {
    if scan.wrapped && scan.cursor == scan.origin_page {
        return Some(SearchStatus::Exhausted);
    }
    match scan.options.direction {
        SearchDirection::Forward => {
            if !scan.wrapped && scan.cursor + 1 == scan.page_count {
                if !scan.options.wrap {
                    return Some(SearchStatus::NotFound);
                }
                scan.wrapped = true;
                scan.cursor = 0;
            } else {
                scan.cursor += 1;
            }
            scan.offset = 0;
        }
        SearchDirection::Backward => {
            if !scan.wrapped && scan.cursor == 0 {
                if !scan.options.wrap {
                    return Some(SearchStatus::NotFound);
                }
                scan.wrapped = true;
                scan.cursor = scan.page_count - 1;
            } else {
                scan.cursor -= 1;
            }
            scan.offset = usize::MAX;
        }
    }
    None
}

/// Materialize the page's text layer if needed. Extraction failure and
/// absent capability both cache an empty layer so the page is not decoded
/// again; search just yields no matches there.
fn ensure_text_layer<'a>(page: &'a mut Page, generator: &dyn Generator) -> Option<&'a TextLayer> {
    if !page.has_text_layer() {
        let layer = if !generator
            .capabilities()
            .contains(GeneratorCaps::TEXT_EXTRACTION)
        {
            TextLayer::default()
        } else {
            match generator.extract_text(page.index()) {
                Ok(layer) => layer,
                Err(error) => {
                    debug!("no text for page {}: {error}", page.index());
                    TextLayer::default()
                }
            }
        };
        page.set_text_layer(layer);
    }
    page.text_layer()
}
