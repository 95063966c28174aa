//! Document outline (table of contents)

use crate::action::Action;

/// One outline entry, usually carrying a goto action.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutlineNode {
    pub title: String,
    pub action: Option<Action>,
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    pub fn new(title: impl Into<String>, action: Option<Action>) -> Self {
        Self {
            title: title.into(),
            action,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<OutlineNode>) -> Self {
        self.children = children;
        self
    }
}

/// The outline tree of a document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Outline {
    pub roots: Vec<OutlineNode>,
}

impl Outline {
    pub fn new(roots: Vec<OutlineNode>) -> Self {
        Self { roots }
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Depth-first flattening with nesting depth, for list-style display.
    pub fn flatten(&self) -> Vec<(&OutlineNode, usize)> {
        let mut out = Vec::new();
        for root in &self.roots {
            flatten_into(root, 0, &mut out);
        }
        out
    }
}

fn flatten_into<'a>(
    node: &'a OutlineNode,
    depth: usize,
    out: &mut Vec<(&'a OutlineNode, usize)>,
) {
    out.push((node, depth));
    for child in &node.children {
        flatten_into(child, depth + 1, out);
    }
}
