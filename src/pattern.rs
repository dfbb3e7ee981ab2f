//! Pattern representation
//!
//! A compiled pattern is a tree of [`NodePattern`]s. Each one describes a
//! single tree node (its label test, predicates and optional capture name)
//! and carries a [`Condition`] over the relations hanging off that node.
//! Patterns are immutable once compiled and can be shared across threads.

use crate::relation::Relation;
use crate::tree::{NodeId, Tree};
use regex::Regex;
use std::fmt::{self, Debug};
use std::sync::Arc;

/// Type alias for pattern variable identifiers (indices into Pattern.var_names)
pub type VarId = usize;

/// Bindings of pattern variables to tree nodes, indexed by `VarId`
pub type Bindings = Vec<Option<NodeId>>;

/// One alternative of a label test
#[derive(Clone)]
pub enum Atom {
    /// Whole-label string equality
    Literal(String),
    /// Unanchored regex search; pattern string + compiled regex
    Regex(String, Regex),
    /// Basic category equality (`@NP` matches `NP-SBJ-1`)
    Category(String),
}

// Manual Debug implementation
impl Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Literal(s) => f.debug_tuple("Literal").field(s).finish(),
            Atom::Regex(pattern, _) => f.debug_tuple("Regex").field(pattern).finish(),
            Atom::Category(s) => f.debug_tuple("Category").field(s).finish(),
        }
    }
}

// Manual PartialEq implementation (compare pattern strings, not compiled regex)
impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Atom::Literal(a), Atom::Literal(b)) => a == b,
            (Atom::Regex(a, _), Atom::Regex(b, _)) => a == b,
            (Atom::Category(a), Atom::Category(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LabelTest {
    /// `__`
    Any,
    /// `NP|/^VB/|@PP`
    Alternatives(Vec<Atom>),
    /// `=name`: the node bound to `name`, binding it if still unbound
    SameNode(VarId),
    /// `~name` or `%name`: same label as the node bound to `name`
    SameLabel(VarId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePredicate {
    Leaf,
    Preterminal,
    Root,
}

/// Test applied to a single node
#[derive(Debug, Clone, PartialEq)]
pub struct Description {
    /// Negates the label test only; predicates always hold positively
    pub negated: bool,
    pub test: LabelTest,
    pub predicates: Vec<NodePredicate>,
}

impl Description {
    pub fn any() -> Self {
        Self {
            negated: false,
            test: LabelTest::Any,
            predicates: Vec::new(),
        }
    }

    pub fn literal(label: &str) -> Self {
        Self {
            negated: false,
            test: LabelTest::Alternatives(vec![Atom::Literal(label.to_string())]),
            predicates: Vec::new(),
        }
    }

    /// Check a node against this description
    pub fn matches(
        &self,
        tree: &Tree,
        node: NodeId,
        bindings: &Bindings,
        annotation_chars: &[char],
    ) -> bool {
        let predicates_hold = self.predicates.iter().all(|predicate| match predicate {
            NodePredicate::Leaf => tree.is_leaf(node),
            NodePredicate::Preterminal => tree.is_preterminal(node),
            NodePredicate::Root => tree.is_root(node),
        });
        if !predicates_hold {
            return false;
        }

        let label = tree.label(node);
        let test_holds = match &self.test {
            LabelTest::Any => true,
            LabelTest::Alternatives(atoms) => atoms.iter().any(|atom| match atom {
                Atom::Literal(s) => label.as_str() == s,
                Atom::Regex(_, regex) => regex.is_match(label.as_str()),
                Atom::Category(s) => label.category(annotation_chars) == s,
            }),
            LabelTest::SameNode(var) => bindings[*var].is_none_or(|bound| bound == node),
            LabelTest::SameLabel(var) => {
                bindings[*var].is_some_and(|bound| tree.label(bound) == label)
            }
        };

        test_holds != self.negated
    }
}

/// A pattern node: what one tree node must look like, plus the relations
/// it must stand in
#[derive(Debug, Clone, PartialEq)]
pub struct NodePattern {
    pub description: Description,
    pub capture: Option<VarId>,
    pub condition: Option<Condition>,
}

impl NodePattern {
    pub fn new(description: Description) -> Self {
        Self {
            description,
            capture: None,
            condition: None,
        }
    }

    /// Add a conjunct to this node's condition
    pub fn and(&mut self, condition: Condition) {
        self.condition = Some(match self.condition.take() {
            None => condition,
            Some(existing) => merge_conditions(existing, condition),
        });
    }
}

/// Boolean structure over relations
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    And(Vec<Condition>),
    Or(Vec<Condition>),
    /// Must have no satisfying assignment; binds nothing
    Not(Box<Condition>),
    /// Contributes bindings when satisfiable, is skipped otherwise
    Optional(Box<Condition>),
    Relation {
        relation: Relation,
        target: Box<NodePattern>,
    },
}

pub fn merge_conditions(a: Condition, b: Condition) -> Condition {
    match (a, b) {
        (Condition::And(mut x_list), Condition::And(y_list)) => {
            x_list.extend(y_list);
            Condition::And(x_list)
        }
        (Condition::And(mut x_list), y) => {
            x_list.push(y);
            Condition::And(x_list)
        }
        (x, Condition::And(y_list)) => {
            let mut list = vec![x];
            list.extend(y_list);
            Condition::And(list)
        }
        (x, y) => Condition::And(vec![x, y]),
    }
}

/// A compiled tree pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    pub(crate) source: String,
    pub(crate) root: NodePattern,
    pub(crate) var_names: Arc<[String]>,
    /// Per variable: captured somewhere outside every negation
    pub(crate) visible: Vec<bool>,
    pub(crate) annotation_chars: Vec<char>,
}

impl Pattern {
    /// Compile pattern text with the default configuration
    pub fn compile(text: &str) -> Result<Pattern, crate::query::PatternSyntaxError> {
        crate::query::compile_pattern(text)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &NodePattern {
        &self.root
    }

    pub fn var_names(&self) -> &[String] {
        &self.var_names
    }

    pub fn var_id(&self, name: &str) -> Option<VarId> {
        self.var_names.iter().position(|n| n == name)
    }

    /// Names a match can bind; names captured only under negation are
    /// never part of a match
    pub fn capture_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.var_names
            .iter()
            .zip(&self.visible)
            .filter(|(_, visible)| **visible)
            .map(|(name, _)| name.as_str())
    }

    pub fn annotation_chars(&self) -> &[char] {
        &self.annotation_chars
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
