//! Arena-backed constituency trees
//!
//! Nodes live in a single `Vec` owned by the [`Tree`] and refer to each
//! other by [`NodeId`]. A node's identity is its id: two nodes with equal
//! labels and children are still different nodes. Nodes that are not
//! reachable from the root are detached; traversals never visit them.
//!
//! All methods taking a `NodeId` panic if the id does not come from this
//! tree, like slice indexing.

use std::fmt;

/// Unique identifier for a node
pub type NodeId = usize;

/// A node label such as `NP`, `NP-SBJ-1` or `-NONE-`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(String);

impl Label {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Basic category: the label up to the first annotation character
    ///
    /// A leading annotation character is part of the category, and labels
    /// wrapped in dashes (`-NONE-`, `-LRB-`) are returned whole.
    pub fn category(&self, annotation_chars: &[char]) -> &str {
        let s = self.0.as_str();
        if s.len() > 2 && s.starts_with('-') && s.ends_with('-') {
            return s;
        }
        match s
            .char_indices()
            .skip(1)
            .find(|(_, c)| annotation_chars.contains(c))
        {
            Some((idx, _)) => &s[..idx],
            None => s,
        }
    }

    /// Numeric co-index carried as the last annotation (`NP-SBJ-1` is 1)
    pub fn coindex(&self, annotation_chars: &[char]) -> Option<u32> {
        let rest = &self.0[self.category(annotation_chars).len()..];
        let (idx, c) = rest
            .char_indices()
            .rev()
            .find(|(_, c)| annotation_chars.contains(c))?;
        let tail = &rest[idx + c.len_utf8()..];
        if tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        tail.parse().ok()
    }

    /// Functional tags following the basic category, co-indices excluded
    pub fn functional_tags(&self, annotation_chars: &[char]) -> Vec<&str> {
        let rest = &self.0[self.category(annotation_chars).len()..];
        rest.split(|c: char| annotation_chars.contains(&c))
            .filter(|tag| !tag.is_empty() && !tag.bytes().all(|b| b.is_ascii_digit()))
            .collect()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl PartialEq<str> for Label {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Label {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A node in a constituency tree
#[derive(Debug, Clone)]
pub struct Node {
    pub label: Label,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl Node {
    fn new(label: Label) -> Self {
        Self {
            label,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// An ordered, rooted, labeled tree
#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: Vec<Node>,
    root: Option<NodeId>,
    revision: u64,
}

impl Tree {
    /// Create a tree consisting of a single root node
    pub fn new(root_label: impl Into<Label>) -> Self {
        let mut tree = Self::empty();
        let root = tree.add_node(root_label);
        tree.root = Some(root);
        tree
    }

    /// Create a tree with no root
    pub fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            revision: 0,
        }
    }

    /// Add a detached node to the arena
    pub fn add_node(&mut self, label: impl Into<Label>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node::new(label.into()));
        id
    }

    /// Append `child` to `parent`'s children, returning the id actually
    /// inserted (a copy if `child` could not be moved)
    pub fn push_child(&mut self, parent: NodeId, child: NodeId) -> NodeId {
        let index = self.nodes[parent].children.len();
        self.insert_child(parent, index, child)
    }

    /// Insert `child` at `index` among `parent`'s children
    ///
    /// A child that already has a parent, or that dominates `parent`, is
    /// deep-copied first. `index` is clamped to the number of children.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> NodeId {
        let child = if self.must_copy(parent, child) {
            self.copy_subtree(child)
        } else {
            child
        };
        let children = &mut self.nodes[parent].children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.nodes[child].parent = Some(parent);
        self.touch(parent);
        child
    }

    /// Replace `parent`'s children wholesale
    ///
    /// Old children that are not reused become detached. Any node that is
    /// still parented elsewhere, appears twice in `children`, or dominates
    /// `parent` is copied before insertion, so the result is always a tree.
    pub fn replace_children(&mut self, parent: NodeId, children: Vec<NodeId>) -> Vec<NodeId> {
        for old in std::mem::take(&mut self.nodes[parent].children) {
            self.nodes[old].parent = None;
        }

        let mut placed = Vec::with_capacity(children.len());
        for child in children {
            let child = if placed.contains(&child) || self.must_copy(parent, child) {
                self.copy_subtree(child)
            } else {
                child
            };
            self.nodes[child].parent = Some(parent);
            placed.push(child);
        }
        self.nodes[parent].children = placed.clone();
        self.touch(parent);
        placed
    }

    /// Count a structural change under `node` if it is part of the tree
    fn touch(&mut self, node: NodeId) {
        if self.is_attached(node) {
            self.revision += 1;
        }
    }

    fn must_copy(&self, parent: NodeId, child: NodeId) -> bool {
        self.nodes[child].parent.is_some()
            || child == parent
            || self.root == Some(child)
            || self.dominates(child, parent)
    }

    /// Remove a node (and its subtree) from its parent
    ///
    /// Detaching the root leaves the tree empty.
    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node].parent {
            self.nodes[parent].children.retain(|&c| c != node);
            self.nodes[node].parent = None;
            self.touch(parent);
        } else if self.root == Some(node) {
            self.root = None;
            self.revision += 1;
        }
    }

    /// Make `node` the root, detaching it from any parent first
    pub fn set_root(&mut self, node: Option<NodeId>) {
        if let Some(node) = node {
            self.detach(node);
        }
        self.root = node;
        self.revision += 1;
    }

    /// Deep copy of a subtree within this arena; the copy is detached
    pub fn copy_subtree(&mut self, node: NodeId) -> NodeId {
        let copy = self.add_node(self.nodes[node].label.clone());
        let children = self.nodes[node].children.clone();
        for child in children {
            let child_copy = self.copy_subtree(child);
            self.nodes[child_copy].parent = Some(copy);
            self.nodes[copy].children.push(child_copy);
        }
        copy
    }

    /// Deep copy of a subtree of another tree into this arena (detached)
    pub fn import(&mut self, other: &Tree, node: NodeId) -> NodeId {
        let copy = self.add_node(other.nodes[node].label.clone());
        for &child in &other.nodes[node].children {
            let child_copy = self.import(other, child);
            self.nodes[child_copy].parent = Some(copy);
            self.nodes[copy].children.push(child_copy);
        }
        copy
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Incremented by every structural change to the attached tree
    ///
    /// Relabeling and building detached subtrees leave it alone.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Get a node by ID
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn label(&self, id: NodeId) -> &Label {
        &self.nodes[id].label
    }

    pub fn set_label(&mut self, id: NodeId, label: impl Into<Label>) {
        self.nodes[id].label = label.into();
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.nodes[id].children.is_empty()
    }

    /// A node whose only child is a leaf
    pub fn is_preterminal(&self, id: NodeId) -> bool {
        match self.nodes[id].children.as_slice() {
            [child] => self.is_leaf(*child),
            _ => false,
        }
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        self.root == Some(id)
    }

    /// Position of a node among its parent's children
    pub fn child_index(&self, id: NodeId) -> Option<usize> {
        let parent = self.nodes[id].parent?;
        self.nodes[parent].children.iter().position(|&c| c == id)
    }

    /// Whether the node is reachable from the root
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        while let Some(parent) = self.nodes[current].parent {
            current = parent;
        }
        self.root == Some(current)
    }

    /// Strict dominance: `ancestor` is a proper ancestor of `node`
    pub fn dominates(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.nodes[node].parent;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes[id].parent;
        }
        false
    }

    /// Depth-first pre-order traversal of the subtree rooted at `id`
    pub fn preorder(&self, id: NodeId) -> Preorder<'_> {
        Preorder {
            tree: self,
            stack: vec![id],
        }
    }

    /// Pre-order traversal of the whole tree
    pub fn iter(&self) -> Preorder<'_> {
        Preorder {
            tree: self,
            stack: self.root.into_iter().collect(),
        }
    }

    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.iter().filter(|&id| self.is_leaf(id))
    }

    /// Number of nodes reachable from the root
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Size of the arena, detached nodes included
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    /// Highest co-index on any attached label, 0 if there is none
    pub fn max_coindex(&self, annotation_chars: &[char]) -> u32 {
        self.iter()
            .filter_map(|id| self.nodes[id].label.coindex(annotation_chars))
            .max()
            .unwrap_or(0)
    }
}

/// Pre-order iterator over node ids
pub struct Preorder<'a> {
    tree: &'a Tree,
    stack: Vec<NodeId>,
}

impl Iterator for Preorder<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree.nodes[id].children.iter().rev().copied());
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_ANNOTATION_CHARS;

    /// (S (NP (DT the) (NN dog)) (VP (VBZ barks)))
    fn create_test_tree() -> Tree {
        let mut tree = Tree::new("S");
        let s = tree.root().unwrap();
        let np = tree.add_node("NP");
        let dt = tree.add_node("DT");
        let the = tree.add_node("the");
        let nn = tree.add_node("NN");
        let dog = tree.add_node("dog");
        let vp = tree.add_node("VP");
        let vbz = tree.add_node("VBZ");
        let barks = tree.add_node("barks");
        tree.push_child(s, np);
        tree.push_child(np, dt);
        tree.push_child(dt, the);
        tree.push_child(np, nn);
        tree.push_child(nn, dog);
        tree.push_child(s, vp);
        tree.push_child(vp, vbz);
        tree.push_child(vbz, barks);
        tree
    }

    fn labels(tree: &Tree) -> Vec<String> {
        tree.iter().map(|id| tree.label(id).to_string()).collect()
    }

    #[test]
    fn test_tree_creation() {
        let tree = create_test_tree();
        assert_eq!(
            labels(&tree),
            vec!["S", "NP", "DT", "the", "NN", "dog", "VP", "VBZ", "barks"]
        );
        assert_eq!(tree.len(), 9);
        assert!(tree.is_root(0));
        assert_eq!(tree.parent(1), Some(0));
        assert_eq!(tree.children(0), &[1, 6]);
    }

    #[test]
    fn test_leaf_and_preterminal() {
        let tree = create_test_tree();
        assert!(tree.is_leaf(3));
        assert!(tree.is_preterminal(2));
        assert!(!tree.is_preterminal(1));
        assert!(!tree.is_leaf(0));
        assert_eq!(tree.leaves().count(), 3);
    }

    #[test]
    fn test_dominance() {
        let tree = create_test_tree();
        assert!(tree.dominates(0, 3));
        assert!(tree.dominates(1, 2));
        assert!(!tree.dominates(1, 1));
        assert!(!tree.dominates(6, 2));
    }

    #[test]
    fn test_insert_attached_node_copies() {
        let mut tree = create_test_tree();
        // DT is still under NP, so inserting it under VP must copy it
        let inserted = tree.push_child(6, 2);
        assert_ne!(inserted, 2);
        assert_eq!(tree.parent(2), Some(1));
        assert_eq!(tree.parent(inserted), Some(6));
        assert_eq!(tree.label(inserted).as_str(), "DT");
        assert_ne!(tree.children(inserted)[0], 3);
    }

    #[test]
    fn test_insert_ancestor_copies() {
        let mut tree = create_test_tree();
        let np = 1;
        let dt = 2;
        let before = tree.len();
        let inserted = tree.push_child(dt, np);
        assert_ne!(inserted, np);
        assert!(!tree.dominates(inserted, dt));
        assert_eq!(tree.len(), before + 5);
    }

    #[test]
    fn test_replace_children_reorders_without_copy() {
        let mut tree = create_test_tree();
        let placed = tree.replace_children(0, vec![6, 1]);
        assert_eq!(placed, vec![6, 1]);
        assert_eq!(tree.children(0), &[6, 1]);
        assert_eq!(tree.parent(1), Some(0));
    }

    #[test]
    fn test_replace_children_duplicate_is_copied() {
        let mut tree = create_test_tree();
        let placed = tree.replace_children(0, vec![1, 1]);
        assert_eq!(placed[0], 1);
        assert_ne!(placed[1], 1);
        assert_eq!(tree.label(placed[1]).as_str(), "NP");
        assert!(!tree.is_attached(6));
    }

    #[test]
    fn test_detach() {
        let mut tree = create_test_tree();
        let revision = tree.revision();
        tree.detach(1);
        assert_eq!(tree.children(0), &[6]);
        assert!(!tree.is_attached(2));
        assert!(tree.revision() > revision);

        tree.detach(0);
        assert!(tree.is_empty());
        assert_eq!(tree.iter().count(), 0);
    }

    #[test]
    fn test_detached_building_keeps_revision() {
        let mut tree = create_test_tree();
        let revision = tree.revision();
        let pp = tree.add_node("PP");
        let inner = tree.add_node("IN");
        tree.push_child(pp, inner);
        let word = tree.add_node("with");
        tree.insert_child(inner, 0, word);
        tree.replace_children(pp, vec![inner]);
        tree.detach(word);
        assert_eq!(tree.revision(), revision);

        tree.push_child(6, pp);
        assert!(tree.revision() > revision);
        let revision = tree.revision();
        tree.detach(pp);
        assert!(tree.revision() > revision);
    }

    #[test]
    fn test_relabel_keeps_revision() {
        let mut tree = create_test_tree();
        let revision = tree.revision();
        tree.set_label(1, "NP-SBJ");
        assert_eq!(tree.revision(), revision);
        assert_eq!(tree.label(1).as_str(), "NP-SBJ");
    }

    #[test]
    fn test_copy_subtree_is_fresh() {
        let mut tree = create_test_tree();
        let copy = tree.copy_subtree(1);
        let original: Vec<_> = tree.preorder(1).collect();
        let copied: Vec<_> = tree.preorder(copy).collect();
        assert_eq!(original.len(), copied.len());
        assert!(copied.iter().all(|id| !original.contains(id)));
        assert_eq!(tree.parent(copy), None);
    }

    #[test]
    fn test_import() {
        let source = create_test_tree();
        let mut target = Tree::new("ROOT");
        let imported = target.import(&source, 6);
        target.push_child(0, imported);
        assert_eq!(labels(&target), vec!["ROOT", "VP", "VBZ", "barks"]);
    }

    #[test]
    fn test_label_helpers() {
        let chars = DEFAULT_ANNOTATION_CHARS;
        let label = Label::from("NP-SBJ-1");
        assert_eq!(label.category(chars), "NP");
        assert_eq!(label.coindex(chars), Some(1));
        assert_eq!(label.functional_tags(chars), vec!["SBJ"]);

        let label = Label::from("NP=2");
        assert_eq!(label.category(chars), "NP");
        assert_eq!(label.coindex(chars), Some(2));

        let label = Label::from("-NONE-");
        assert_eq!(label.category(chars), "-NONE-");
        assert_eq!(label.coindex(chars), None);
        assert!(label.functional_tags(chars).is_empty());

        let label = Label::from("VP");
        assert_eq!(label.category(chars), "VP");
        assert_eq!(label.coindex(chars), None);
    }

    #[test]
    fn test_label_helpers_multibyte_annotation() {
        let chars = &['§'];
        let label = Label::from("NP§SBJ§1");
        assert_eq!(label.category(chars), "NP");
        assert_eq!(label.coindex(chars), Some(1));
        assert_eq!(label.functional_tags(chars), vec!["SBJ"]);
        assert_eq!(Label::from("NP§").coindex(chars), None);
        assert_eq!(Label::from("§").category(chars), "§");
    }

    #[test]
    fn test_max_coindex() {
        let mut tree = create_test_tree();
        assert_eq!(tree.max_coindex(DEFAULT_ANNOTATION_CHARS), 0);
        tree.set_label(1, "NP-SBJ-3");
        tree.set_label(6, "VP-1");
        assert_eq!(tree.max_coindex(DEFAULT_ANNOTATION_CHARS), 3);
    }
}
