//! Structural relations between two tree nodes
//!
//! Every relation is read as `A rel B`, where `A` is the node already
//! matched and `B` the node to be found. [`Relation::candidates`] lists
//! every `B` satisfying the relation for a given `A`, in the fixed order
//! the matcher tries them.

use crate::index::TreeIndex;
use crate::pattern::{Bindings, Description};
use crate::tree::{NodeId, Tree};
use std::iter::successors;

#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    /// `<<`: A dominates B
    Dominates,
    /// `>>`: A is dominated by B
    DominatedBy,
    /// `<`: A immediately dominates B
    ParentOf,
    /// `>`: A is immediately dominated by B
    ChildOf,
    /// `<,`: B is the first child of A
    FirstChild,
    /// `<-` or `` <` ``: B is the last child of A
    LastChild,
    /// `<:`: B is the only child of A
    OnlyChild,
    /// `<N`, `<-N`: B is the Nth child of A (negative counts from the right)
    NthChild(i32),
    /// `>,`: A is the first child of B
    FirstChildOf,
    /// `>-` or `` >` ``: A is the last child of B
    LastChildOf,
    /// `>:`: A is the only child of B
    OnlyChildOf,
    /// `>N`, `>-N`: A is the Nth child of B
    NthChildOf(i32),
    /// `<<,`: B is a leftmost descendant of A
    LeftmostDescendant,
    /// `<<-`: B is a rightmost descendant of A
    RightmostDescendant,
    /// `>>,`: A is a leftmost descendant of B
    LeftmostDescendantOf,
    /// `>>-`: A is a rightmost descendant of B
    RightmostDescendantOf,
    /// `<<:`: A dominates B through a chain of unary nodes
    UnaryDominates,
    /// `>>:`: B dominates A through a chain of unary nodes
    UnaryDominatedBy,
    /// `<+(C)`: A dominates B and every node in between matches C
    DominatesVia(Box<Description>),
    /// `>+(C)`: B dominates A and every node in between matches C
    DominatedByVia(Box<Description>),
    /// `$`: A and B are distinct children of the same parent
    Sister,
    /// `$++` or `$..`: A is a left sister of B
    LeftSisterOf,
    /// `$--` or `$,,`: A is a right sister of B
    RightSisterOf,
    /// `$+` or `$.`: A is the immediate left sister of B
    ImmediateLeftSisterOf,
    /// `$-` or `$,`: A is the immediate right sister of B
    ImmediateRightSisterOf,
    /// `..`: the last leaf under A comes before the first leaf under B
    Precedes,
    /// `.`: the first leaf under B directly follows the last leaf under A
    ImmediatelyPrecedes,
    /// `,,`: A follows B
    Follows,
    /// `,`: A immediately follows B
    ImmediatelyFollows,
    /// `==`: A and B are the same node
    Equals,
}

impl Relation {
    /// Map a relation token without arguments to its relation
    pub fn from_token(token: &str) -> Option<Relation> {
        let relation = match token {
            "<<" => Relation::Dominates,
            ">>" => Relation::DominatedBy,
            "<" => Relation::ParentOf,
            ">" => Relation::ChildOf,
            "<," => Relation::FirstChild,
            "<-" | "<`" => Relation::LastChild,
            "<:" => Relation::OnlyChild,
            ">," => Relation::FirstChildOf,
            ">-" | ">`" => Relation::LastChildOf,
            ">:" => Relation::OnlyChildOf,
            "<<," => Relation::LeftmostDescendant,
            "<<-" => Relation::RightmostDescendant,
            ">>," => Relation::LeftmostDescendantOf,
            ">>-" => Relation::RightmostDescendantOf,
            "<<:" => Relation::UnaryDominates,
            ">>:" => Relation::UnaryDominatedBy,
            "$" => Relation::Sister,
            "$++" | "$.." => Relation::LeftSisterOf,
            "$--" | "$,," => Relation::RightSisterOf,
            "$+" | "$." => Relation::ImmediateLeftSisterOf,
            "$-" | "$," => Relation::ImmediateRightSisterOf,
            ".." => Relation::Precedes,
            "." => Relation::ImmediatelyPrecedes,
            ",," => Relation::Follows,
            "," => Relation::ImmediatelyFollows,
            "==" => Relation::Equals,
            _ => return None,
        };
        Some(relation)
    }

    /// Nodes `B` such that `node rel B` holds, in matching order
    pub fn candidates(
        &self,
        tree: &Tree,
        index: &TreeIndex,
        node: NodeId,
        bindings: &Bindings,
        annotation_chars: &[char],
    ) -> Vec<NodeId> {
        let children = tree.children(node);
        let parent = tree.parent(node);

        match self {
            Relation::Dominates => tree.preorder(node).skip(1).collect(),
            Relation::DominatedBy => ancestors(tree, node).collect(),
            Relation::ParentOf => children.to_vec(),
            Relation::ChildOf => parent.into_iter().collect(),
            Relation::FirstChild => children.first().copied().into_iter().collect(),
            Relation::LastChild => children.last().copied().into_iter().collect(),
            Relation::OnlyChild => match children {
                [only] => vec![*only],
                _ => Vec::new(),
            },
            Relation::NthChild(n) => nth(children, *n).into_iter().collect(),
            Relation::FirstChildOf => parent
                .filter(|&p| tree.children(p).first() == Some(&node))
                .into_iter()
                .collect(),
            Relation::LastChildOf => parent
                .filter(|&p| tree.children(p).last() == Some(&node))
                .into_iter()
                .collect(),
            Relation::OnlyChildOf => parent
                .filter(|&p| tree.children(p).len() == 1)
                .into_iter()
                .collect(),
            Relation::NthChildOf(n) => parent
                .filter(|&p| nth(tree.children(p), *n) == Some(node))
                .into_iter()
                .collect(),
            Relation::LeftmostDescendant => {
                successors(children.first().copied(), |&c| tree.children(c).first().copied())
                    .collect()
            }
            Relation::RightmostDescendant => {
                successors(children.last().copied(), |&c| tree.children(c).last().copied())
                    .collect()
            }
            Relation::LeftmostDescendantOf => {
                climb(tree, node, |p, x| tree.children(p).first() == Some(&x))
            }
            Relation::RightmostDescendantOf => {
                climb(tree, node, |p, x| tree.children(p).last() == Some(&x))
            }
            Relation::UnaryDominates => successors(Some(node), |&x| match tree.children(x) {
                [only] => Some(*only),
                _ => None,
            })
            .skip(1)
            .collect(),
            Relation::UnaryDominatedBy => climb(tree, node, |p, _| tree.children(p).len() == 1),
            Relation::DominatesVia(via) => {
                let mut found = Vec::new();
                for &child in children {
                    collect_via(tree, child, via, bindings, annotation_chars, &mut found);
                }
                found
            }
            Relation::DominatedByVia(via) => {
                let mut found = Vec::new();
                for ancestor in ancestors(tree, node) {
                    found.push(ancestor);
                    if !via.matches(tree, ancestor, bindings, annotation_chars) {
                        break;
                    }
                }
                found
            }
            Relation::Sister => sisters(tree, node)
                .map(|(_, all)| all.iter().copied().filter(|&s| s != node).collect())
                .unwrap_or_default(),
            Relation::LeftSisterOf => sisters(tree, node)
                .map(|(idx, all)| all[idx + 1..].to_vec())
                .unwrap_or_default(),
            Relation::RightSisterOf => sisters(tree, node)
                .map(|(idx, all)| all[..idx].to_vec())
                .unwrap_or_default(),
            Relation::ImmediateLeftSisterOf => sisters(tree, node)
                .and_then(|(idx, all)| all.get(idx + 1).copied())
                .into_iter()
                .collect(),
            Relation::ImmediateRightSisterOf => sisters(tree, node)
                .and_then(|(idx, all)| idx.checked_sub(1).map(|i| all[i]))
                .into_iter()
                .collect(),
            Relation::Precedes => by_span(index, node, |a, b| a.1 < b.0),
            Relation::ImmediatelyPrecedes => by_span(index, node, |a, b| a.1 + 1 == b.0),
            Relation::Follows => by_span(index, node, |a, b| b.1 < a.0),
            Relation::ImmediatelyFollows => by_span(index, node, |a, b| b.1 + 1 == a.0),
            Relation::Equals => vec![node],
        }
    }
}

/// Child at 1-based position `n`, or `-n` counting from the right
fn nth(children: &[NodeId], n: i32) -> Option<NodeId> {
    let len = children.len() as i64;
    let idx = match n {
        0 => return None,
        n if n > 0 => i64::from(n) - 1,
        n => len + i64::from(n),
    };
    if (0..len).contains(&idx) {
        Some(children[idx as usize])
    } else {
        None
    }
}

/// Ancestors, nearest first
fn ancestors(tree: &Tree, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    successors(tree.parent(node), |&p| tree.parent(p))
}

/// Walk up from `node` while `keep(parent, child)` holds, collecting parents
fn climb(tree: &Tree, node: NodeId, keep: impl Fn(NodeId, NodeId) -> bool) -> Vec<NodeId> {
    let mut found = Vec::new();
    let mut current = node;
    while let Some(parent) = tree.parent(current) {
        if !keep(parent, current) {
            break;
        }
        found.push(parent);
        current = parent;
    }
    found
}

/// Position among siblings and the sibling slice
fn sisters(tree: &Tree, node: NodeId) -> Option<(usize, &[NodeId])> {
    let parent = tree.parent(node)?;
    let all = tree.children(parent);
    let idx = all.iter().position(|&c| c == node)?;
    Some((idx, all))
}

fn collect_via(
    tree: &Tree,
    node: NodeId,
    via: &Description,
    bindings: &Bindings,
    annotation_chars: &[char],
    found: &mut Vec<NodeId>,
) {
    found.push(node);
    if via.matches(tree, node, bindings, annotation_chars) {
        for &child in tree.children(node) {
            collect_via(tree, child, via, bindings, annotation_chars, found);
        }
    }
}

/// All attached nodes, in pre-order, whose leaf span relates to `node`'s
fn by_span(
    index: &TreeIndex,
    node: NodeId,
    holds: impl Fn((usize, usize), (usize, usize)) -> bool,
) -> Vec<NodeId> {
    let Some(anchor) = index.span(node) else {
        return Vec::new();
    };
    index
        .preorder()
        .iter()
        .copied()
        .filter(|&other| index.span(other).is_some_and(|span| holds(anchor, span)))
        .collect()
}
