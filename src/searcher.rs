//! End-to-end tree search combining index lookup + VM execution
//!
//! Candidate match roots are taken from the label index when the pattern's
//! root node is a plain label (or a choice of labels), and are otherwise all
//! nodes in pre-order. Each candidate gets its own VM; solutions repeated
//! for the same root are dropped.
//!
//! [`MatchMode::FirstPerRoot`] reports one match per match root (the first
//! binding in the order above); [`MatchMode::AllBindings`] reports every
//! distinct binding.
//!
//! A [`Matcher`] does not borrow the tree it enumerates, so a caller can
//! edit the tree between matches. Any structural edit invalidates the
//! enumeration: the matcher notices the tree's revision changed and stops.

use crate::index::TreeIndex;
use crate::pattern::{Atom, Bindings, LabelTest, Pattern};
use crate::tree::{NodeId, Tree};
use crate::vm::VM;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::warn;

/// Result of pattern matching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    root: NodeId,
    bindings: Bindings,
    var_names: Arc<[String]>,
}

impl Match {
    /// The node the whole pattern matched against
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Get the node ID bound to a name
    ///
    /// Returns None if the name is not in the pattern or not bound in this match
    pub fn node(&self, name: &str) -> Option<NodeId> {
        let var = self.var_names.iter().position(|n| n == name)?;
        self.bindings[var]
    }

    /// Iterate over bound names, in order of first appearance in the pattern
    pub fn iter_named(&self) -> impl Iterator<Item = (&str, NodeId)> + '_ {
        self.var_names
            .iter()
            .zip(&self.bindings)
            .filter_map(|(name, bound)| bound.map(|id| (name.as_str(), id)))
    }

    pub fn bindings(&self) -> &[Option<NodeId>] {
        &self.bindings
    }
}

/// How many matches to report per match root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// The first satisfying binding only
    #[default]
    FirstPerRoot,
    /// Every distinct satisfying binding
    AllBindings,
}

/// Lazy enumeration of a pattern's matches in one tree
pub struct Matcher<'p> {
    pattern: &'p Pattern,
    mode: MatchMode,
    index: TreeIndex,
    revision: u64,
    candidates: Vec<NodeId>,
    next_candidate: usize,
    current: Option<(NodeId, VM<'p>)>,
    /// Solutions already produced for the current root
    seen_matches: FxHashSet<Bindings>,
    stale: bool,
}

impl<'p> Matcher<'p> {
    pub fn new(pattern: &'p Pattern, tree: &Tree) -> Self {
        Self::with_mode(pattern, tree, MatchMode::default())
    }

    pub fn with_mode(pattern: &'p Pattern, tree: &Tree, mode: MatchMode) -> Self {
        let index = TreeIndex::build(tree);
        let candidates = get_candidates(pattern, &index);
        Self {
            pattern,
            mode,
            index,
            revision: tree.revision(),
            candidates,
            next_candidate: 0,
            current: None,
            seen_matches: FxHashSet::default(),
            stale: false,
        }
    }

    /// True once the tree has been structurally changed since this matcher
    /// was built
    pub fn is_stale(&self, tree: &Tree) -> bool {
        self.stale || tree.revision() != self.revision
    }

    /// Next match, or `None` when the enumeration is finished or stale
    ///
    /// `tree` must be the tree the matcher was built for. Relabeling is
    /// allowed between calls; structural edits end the enumeration.
    pub fn next_match(&mut self, tree: &Tree) -> Option<Match> {
        if self.stale {
            return None;
        }
        if tree.revision() != self.revision {
            warn!(
                pattern = self.pattern.source(),
                "tree changed structurally during matching; enumeration stopped"
            );
            self.stale = true;
            return None;
        }

        loop {
            if let Some((root, vm)) = &mut self.current {
                while let Some(bindings) = vm.next_solution(tree, &self.index) {
                    if self.seen_matches.insert(bindings.clone()) {
                        let found = Match {
                            root: *root,
                            bindings,
                            var_names: Arc::clone(&self.pattern.var_names),
                        };
                        if self.mode == MatchMode::FirstPerRoot {
                            self.current = None;
                        }
                        return Some(found);
                    }
                }
            }

            let root = *self.candidates.get(self.next_candidate)?;
            self.next_candidate += 1;
            self.seen_matches.clear();
            self.current = Some((
                root,
                VM::new(
                    self.pattern.root(),
                    root,
                    self.pattern.var_names().len(),
                    self.pattern.annotation_chars(),
                ),
            ));
        }
    }
}

/// Candidate roots in pre-order, narrowed by the label index when the
/// pattern root only accepts literal labels
fn get_candidates(pattern: &Pattern, index: &TreeIndex) -> Vec<NodeId> {
    let description = &pattern.root().description;
    let literals = match &description.test {
        LabelTest::Alternatives(atoms) if !description.negated => atoms
            .iter()
            .map(|atom| match atom {
                Atom::Literal(label) => Some(label.as_str()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>(),
        _ => None,
    };

    match literals {
        Some(labels) => {
            let mut candidates: Vec<NodeId> = labels
                .into_iter()
                .filter_map(|label| index.get_by_label(label))
                .flatten()
                .copied()
                .collect();
            candidates.sort_by_key(|&id| index.position(id));
            candidates.dedup();
            candidates
        }
        None => index.preorder().to_vec(),
    }
}

/// Iterator over the matches of a pattern in a tree
pub struct MatchIter<'a> {
    matcher: Matcher<'a>,
    tree: &'a Tree,
}

impl Iterator for MatchIter<'_> {
    type Item = Match;

    fn next(&mut self) -> Option<Self::Item> {
        self.matcher.next_match(self.tree)
    }
}

/// Search a tree with a compiled pattern
///
/// Returns an iterator over the matches in the tree, one per match root,
/// with roots in pre-order.
pub fn search<'a>(pattern: &'a Pattern, tree: &'a Tree) -> MatchIter<'a> {
    search_with(pattern, tree, MatchMode::FirstPerRoot)
}

/// Search a tree, reporting every distinct binding
///
/// Roots come in pre-order; for each root, bindings come in the order the
/// pattern's relations and alternatives are written.
pub fn search_all<'a>(pattern: &'a Pattern, tree: &'a Tree) -> MatchIter<'a> {
    search_with(pattern, tree, MatchMode::AllBindings)
}

pub fn search_with<'a>(pattern: &'a Pattern, tree: &'a Tree, mode: MatchMode) -> MatchIter<'a> {
    MatchIter {
        matcher: Matcher::with_mode(pattern, tree, mode),
        tree,
    }
}
