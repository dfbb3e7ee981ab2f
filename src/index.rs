//! Per-tree indices used during matching
//!
//! Built once per enumeration: the pre-order sequence of attached nodes,
//! each node's pre-order position, the span of leaves it covers (for the
//! precedence relations) and an inverted index from label to nodes (for
//! candidate root lookup).

use crate::tree::{NodeId, Tree};
use rustc_hash::FxHashMap;

/// Inverted index and leaf spans for one tree
#[derive(Debug, Clone)]
pub struct TreeIndex {
    /// Attached nodes in pre-order
    preorder: Vec<NodeId>,
    /// Pre-order position per arena slot (`None` for detached nodes)
    position: Vec<Option<usize>>,
    /// First and last leaf ordinal covered, per arena slot
    spans: Vec<Option<(usize, usize)>>,
    /// Index by label
    by_label: FxHashMap<String, Vec<NodeId>>,
}

impl TreeIndex {
    /// Build an index from a tree
    pub fn build(tree: &Tree) -> Self {
        let preorder: Vec<NodeId> = tree.iter().collect();
        let mut position = vec![None; tree.arena_len()];
        let mut spans = vec![None; tree.arena_len()];
        let mut by_label: FxHashMap<String, Vec<NodeId>> = FxHashMap::default();

        let mut next_leaf = 0;
        for (pos, &id) in preorder.iter().enumerate() {
            position[id] = Some(pos);
            by_label
                .entry(tree.label(id).as_str().to_string())
                .or_default()
                .push(id);
            if tree.is_leaf(id) {
                spans[id] = Some((next_leaf, next_leaf));
                next_leaf += 1;
            }
        }

        // Children precede their parents in reverse pre-order
        for &id in preorder.iter().rev() {
            let children = tree.children(id);
            if let (Some(&first), Some(&last)) = (children.first(), children.last()) {
                let start = spans[first].map(|(s, _)| s);
                let end = spans[last].map(|(_, e)| e);
                if let (Some(start), Some(end)) = (start, end) {
                    spans[id] = Some((start, end));
                }
            }
        }

        Self {
            preorder,
            position,
            spans,
            by_label,
        }
    }

    pub fn preorder(&self) -> &[NodeId] {
        &self.preorder
    }

    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.position.get(id).copied().flatten()
    }

    /// First and last leaf ordinal dominated by (or equal to) the node
    pub fn span(&self, id: NodeId) -> Option<(usize, usize)> {
        self.spans.get(id).copied().flatten()
    }

    /// Get candidate nodes by label, in pre-order
    pub fn get_by_label(&self, label: &str) -> Option<&[NodeId]> {
        self.by_label.get(label).map(|v| v.as_slice())
    }
}
