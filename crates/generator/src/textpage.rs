//! Positioned text extracted from a page
//!
//! Backends with the `TEXT_EXTRACTION` capability produce a [`TextLayer`]
//! per page: text spans in reading order, each with a normalized bounding
//! rectangle. The layer also knows how to match a query against its
//! linearized text, which is what the search engine drives page by page.

use crate::geometry::NormalizedRect;

/// A run of text with its bounding rectangle on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub text: String,
    pub rect: NormalizedRect,
}

impl TextSpan {
    pub fn new(text: impl Into<String>, rect: NormalizedRect) -> Self {
        Self {
            text: text.into(),
            rect,
        }
    }
}

/// Case handling for text matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseSensitivity {
    Sensitive,
    #[default]
    Insensitive,
}

/// A query hit inside one page's text layer.
///
/// `rects` are the bounding rectangles of the spans the match covers, for
/// the display layer to highlight. `char_start`/`char_end` index into the
/// page's normalized linear text and order matches within the page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextMatch {
    pub rects: Vec<NormalizedRect>,
    pub char_start: usize,
    pub char_end: usize,
}

/// The positioned text of a single page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextLayer {
    spans: Vec<TextSpan>,
}

impl TextLayer {
    pub fn new(spans: Vec<TextSpan>) -> Self {
        Self { spans }
    }

    pub fn spans(&self) -> &[TextSpan] {
        &self.spans
    }

    pub fn is_empty(&self) -> bool {
        self.spans.iter().all(|span| span.text.trim().is_empty())
    }

    /// Find every occurrence of `query` in this page, in reading order.
    ///
    /// The page text is linearized before matching: spans are joined and
    /// any run of whitespace (inside a span or at a span boundary, e.g. a
    /// line wrap inserted by layout) collapses to a single separator, so a
    /// query spanning a line break still matches. The query undergoes the
    /// same normalization. An empty or whitespace-only query never
    /// matches.
    pub fn find_all(&self, query: &str, case: CaseSensitivity) -> Vec<TextMatch> {
        let needle = normalize_query(query, case);
        if needle.is_empty() {
            return Vec::new();
        }

        let flat = self.flatten(case);
        let mut matches = Vec::new();
        let mut start = 0;
        while start + needle.len() <= flat.chars.len() {
            if flat.chars[start..start + needle.len()] == needle[..] {
                let end = start + needle.len();
                matches.push(TextMatch {
                    rects: self.match_rects(&flat, start, end),
                    char_start: start,
                    char_end: end,
                });
                start = end;
            } else {
                start += 1;
            }
        }
        matches
    }

    fn match_rects(&self, flat: &FlatText, start: usize, end: usize) -> Vec<NormalizedRect> {
        let mut rects: Vec<NormalizedRect> = Vec::new();
        let mut last_span = usize::MAX;
        for &span_index in &flat.span_map[start..end] {
            if span_index != last_span {
                rects.push(self.spans[span_index].rect);
                last_span = span_index;
            }
        }
        rects
    }

    /// Linearize the layer: collapsed whitespace, one separator between
    /// spans, and a parallel map from each character to the span it came
    /// from (separators attach to the preceding span).
    fn flatten(&self, case: CaseSensitivity) -> FlatText {
        let mut chars = Vec::new();
        let mut span_map = Vec::new();
        for (index, span) in self.spans.iter().enumerate() {
            for ch in span.text.chars() {
                if ch.is_whitespace() {
                    push_separator(&mut chars, &mut span_map, index);
                } else {
                    chars.push(fold_case(ch, case));
                    span_map.push(index);
                }
            }
            if !chars.is_empty() {
                push_separator(&mut chars, &mut span_map, index);
            }
        }
        // Drop a trailing separator so matches never end on padding.
        if chars.last() == Some(&' ') {
            chars.pop();
            span_map.pop();
        }
        FlatText { chars, span_map }
    }
}

struct FlatText {
    chars: Vec<char>,
    span_map: Vec<usize>,
}

fn push_separator(chars: &mut Vec<char>, span_map: &mut Vec<usize>, span_index: usize) {
    if !chars.is_empty() && chars.last() != Some(&' ') {
        chars.push(' ');
        span_map.push(span_index);
    }
}

fn normalize_query(query: &str, case: CaseSensitivity) -> Vec<char> {
    let mut chars = Vec::new();
    for ch in query.trim().chars() {
        if ch.is_whitespace() {
            if chars.last() != Some(&' ') {
                chars.push(' ');
            }
        } else {
            chars.push(fold_case(ch, case));
        }
    }
    chars
}

// Single-char fold keeps the flat text and span map aligned; multi-char
// lowercase expansions are rare enough to trade for positional accuracy.
fn fold_case(ch: char, case: CaseSensitivity) -> char {
    match case {
        CaseSensitivity::Sensitive => ch,
        CaseSensitivity::Insensitive => ch.to_lowercase().next().unwrap_or(ch),
    }
}
