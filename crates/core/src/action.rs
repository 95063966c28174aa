//! Actions attached to links, outline nodes, and form triggers
//!
//! Actions are immutable once constructed; activating one is the display
//! layer's business, the model only describes what should happen.

use std::path::PathBuf;

/// A navigable reference: a page plus either a named destination or a
/// vertical offset. Used by outline entries, cross-document links, and
/// history entries.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewportTarget {
    /// A named destination to be resolved by the backend.
    Named(String),

    /// A page with a normalized vertical scroll offset.
    Offset { page_index: usize, normalized_y: f64 },
}

impl ViewportTarget {
    pub fn page(page_index: usize) -> Self {
        ViewportTarget::Offset {
            page_index,
            normalized_y: 0.0,
        }
    }
}

/// Script language of a [`Action::Script`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    JavaScript,
}

/// A command performed on the document itself rather than its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentCommand {
    PageFirst,
    PagePrev,
    PageNext,
    PageLast,
    HistoryBack,
    HistoryForward,
    Find,
    GotoPage,
    Close,
}

/// What happens when a link, outline node, or form trigger fires.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Change the viewport, within this document or an external file.
    Goto {
        file: Option<PathBuf>,
        target: ViewportTarget,
    },

    /// Execute an external application.
    Execute { command: String, arguments: String },

    /// Open a URL in the system browser or mail client.
    Browse { url: String },

    /// Run a script.
    Script { kind: ScriptKind, source: String },

    /// Play a sound. Playback itself is the embedder's concern; the model
    /// only carries the parameters.
    Sound { volume: f64, repeat: bool },

    /// A document-level command.
    DocumentCommand(DocumentCommand),
}

impl Action {
    /// Whether activating this action leaves the current document.
    pub fn is_external(&self) -> bool {
        match self {
            Action::Goto { file, .. } => file.is_some(),
            Action::Execute { .. } | Action::Browse { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goto_with_file_is_external() {
        let internal = Action::Goto {
            file: None,
            target: ViewportTarget::page(3),
        };
        let external = Action::Goto {
            file: Some(PathBuf::from("other.pdf")),
            target: ViewportTarget::Named("chapter-2".to_owned()),
        };
        assert!(!internal.is_external());
        assert!(external.is_external());
        assert!(Action::Browse {
            url: "https://example.org".to_owned()
        }
        .is_external());
    }
}
