//! Surgery operations
//!
//! A [`Script`] is an ordered list of [`Operation`]s compiled once and
//! applied to many matches. Operations refer to nodes by name: a capture
//! name from the paired pattern, or a name declared inside an auxiliary
//! tree by an earlier operation of the same script.

use crate::penn::parse_tree;
use crate::script::SurgerySyntaxError;
use crate::tree::{NodeId, Tree};
use regex::Regex;
use std::fmt::{self, Debug};

/// A compiled surgery script
#[derive(Debug, Clone)]
pub struct Script {
    pub(crate) source: String,
    pub(crate) operations: Vec<Operation>,
    pub(crate) annotation_chars: Vec<char>,
}

impl Script {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn annotation_chars(&self) -> &[char] {
        &self.annotation_chars
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// `delete n1 n2 ...`
    Delete(Vec<String>),
    /// `prune n1 n2 ...`: delete, then remove ancestors left without children
    Prune(Vec<String>),
    /// `excise top bottom`: replace `top` by the children of `bottom`
    Excise { top: String, bottom: String },
    Relabel { name: String, relabel: Relabel },
    Insert { operand: Operand, position: Position },
    Move { name: String, position: Position },
    /// `replace n operand ...`: splice the operands in place of `n`
    Replace { name: String, operands: Vec<Operand> },
    Adjoin {
        mode: AdjoinMode,
        aux: AuxTree,
        target: String,
    },
    /// `createSubtree aux n1 [n2]`: put the sisters `n1..n2` under the foot
    /// of a fresh copy of `aux`, in their place
    CreateSubtree {
        aux: AuxTree,
        start: String,
        end: Option<String>,
    },
    Coindex(Vec<String>),
    /// `if [not] exists n operation`
    IfExists {
        name: String,
        negated: bool,
        operation: Box<Operation>,
    },
}

impl Operation {
    /// Keyword the operation is written with
    pub fn keyword(&self) -> &'static str {
        match self {
            Operation::Delete(_) => "delete",
            Operation::Prune(_) => "prune",
            Operation::Excise { .. } => "excise",
            Operation::Relabel { .. } => "relabel",
            Operation::Insert { .. } => "insert",
            Operation::Move { .. } => "move",
            Operation::Replace { .. } => "replace",
            Operation::Adjoin { mode, .. } => match mode {
                AdjoinMode::Root => "adjoin",
                AdjoinMode::Head => "adjoinH",
                AdjoinMode::Foot => "adjoinF",
            },
            Operation::CreateSubtree { .. } => "createSubtree",
            Operation::Coindex(_) => "coindex",
            Operation::IfExists { .. } => "if",
        }
    }

    /// Names declared by the auxiliary trees of this operation
    pub fn declared_names(&self) -> Vec<&str> {
        let auxes: Vec<&AuxTree> = match self {
            Operation::Insert {
                operand: Operand::Hold(aux),
                ..
            } => vec![aux],
            Operation::Replace { operands, .. } => operands
                .iter()
                .filter_map(|operand| match operand {
                    Operand::Hold(aux) => Some(aux),
                    Operand::Fetch(_) => None,
                })
                .collect(),
            Operation::Adjoin { aux, .. } | Operation::CreateSubtree { aux, .. } => vec![aux],
            Operation::IfExists { operation, .. } => return operation.declared_names(),
            _ => Vec::new(),
        };
        auxes
            .into_iter()
            .flat_map(|aux| aux.names.iter().map(|(_, name)| name.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjoinMode {
    /// `adjoin`: the auxiliary root replaces the target
    Root,
    /// `adjoinH`: the target stays and takes the auxiliary root's place
    Head,
    /// `adjoinF`: the target becomes the foot
    Foot,
}

/// Something to insert: a copy of a named node or a fresh auxiliary tree
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Fetch(String),
    Hold(AuxTree),
}

/// Where to insert, relative to a named node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    /// `$+ n`: immediately left of `n`
    LeftSister(String),
    /// `$- n`: immediately right of `n`
    RightSister(String),
    /// `>N n`: as the Nth child of `n`, 1-based; `>-N` counts from the end,
    /// `>-1` appending
    Child { parent: String, index: i32 },
}

impl Position {
    pub fn anchor(&self) -> &str {
        match self {
            Position::LeftSister(name) | Position::RightSister(name) => name,
            Position::Child { parent, .. } => parent,
        }
    }
}

/// New label for a relabel operation
#[derive(Clone)]
pub enum Relabel {
    Literal(String),
    /// Replace the first match of the regex by the expanded replacement;
    /// labels the regex does not match are left alone
    Regex {
        source: String,
        regex: Regex,
        replacement: Vec<ReplacementPart>,
    },
}

// Manual Debug implementation
impl Debug for Relabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relabel::Literal(label) => f.debug_tuple("Literal").field(label).finish(),
            Relabel::Regex {
                source,
                replacement,
                ..
            } => f
                .debug_struct("Regex")
                .field("source", source)
                .field("replacement", replacement)
                .finish(),
        }
    }
}

// Manual PartialEq implementation (compare pattern strings, not compiled regex)
impl PartialEq for Relabel {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Relabel::Literal(a), Relabel::Literal(b)) => a == b,
            (
                Relabel::Regex {
                    source: a,
                    replacement: ra,
                    ..
                },
                Relabel::Regex {
                    source: b,
                    replacement: rb,
                    ..
                },
            ) => a == b && ra == rb,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplacementPart {
    Text(String),
    /// `$N` or `${N}`: a capture group of the relabel regex
    Group(usize),
    /// `={name}`: the current label of another named node
    NodeLabel(String),
}

impl ReplacementPart {
    /// Parse replacement text; `\` escapes the next character
    pub fn parse_all(text: &str) -> Result<Vec<ReplacementPart>, String> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        literal.push(escaped);
                    }
                }
                '$' if chars.peek().is_some_and(|c| c.is_ascii_digit() || *c == '{') => {
                    let braced = chars.next_if_eq(&'{').is_some();
                    let mut digits = String::new();
                    while let Some(d) = chars.next_if(|c| c.is_ascii_digit()) {
                        digits.push(d);
                    }
                    if braced && chars.next_if_eq(&'}').is_none() {
                        return Err(format!("Unclosed group reference in '{}'", text));
                    }
                    let group = digits
                        .parse()
                        .map_err(|_| format!("Bad group reference in '{}'", text))?;
                    flush(&mut literal, &mut parts);
                    parts.push(ReplacementPart::Group(group));
                }
                '=' if chars.peek() == Some(&'{') => {
                    chars.next();
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => name.push(c),
                            None => return Err(format!("Unclosed node reference in '{}'", text)),
                        }
                    }
                    if name.is_empty() {
                        return Err(format!("Empty node reference in '{}'", text));
                    }
                    flush(&mut literal, &mut parts);
                    parts.push(ReplacementPart::NodeLabel(name));
                }
                c => literal.push(c),
            }
        }
        flush(&mut literal, &mut parts);
        Ok(parts)
    }
}

fn flush(literal: &mut String, parts: &mut Vec<ReplacementPart>) {
    if !literal.is_empty() {
        parts.push(ReplacementPart::Text(std::mem::take(literal)));
    }
}

/// An auxiliary tree template
///
/// Written in bracketed notation with three kinds of markers:
/// `LABEL=name` declares a name for the node created from it, a leaf
/// `=name` is a placeholder replaced by a copy of the named node, and a
/// leaf `LABEL@` is the foot. Markers are stripped from the template's
/// labels. Co-indices such as `NP=2` are part of the label.
#[derive(Debug, Clone)]
pub struct AuxTree {
    pub(crate) source: String,
    pub(crate) tree: Tree,
    pub(crate) foot: Option<NodeId>,
    /// Declared names, by template node
    pub(crate) names: Vec<(NodeId, String)>,
    /// Placeholder leaves, by template node
    pub(crate) placeholders: Vec<(NodeId, String)>,
}

impl PartialEq for AuxTree {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl AuxTree {
    /// Parse a template; error positions are relative to `text`
    pub fn parse(text: &str) -> Result<AuxTree, SurgerySyntaxError> {
        let error = |message: String| SurgerySyntaxError {
            message,
            position: 0,
            fragment: text.to_string(),
        };

        let mut tree = parse_tree(text).map_err(|e| error(e.message))?;
        let mut foot = None;
        let mut names: Vec<(NodeId, String)> = Vec::new();
        let mut placeholders = Vec::new();

        let nodes: Vec<NodeId> = tree.iter().collect();
        for id in nodes {
            let label = tree.label(id).as_str().to_string();

            if tree.is_leaf(id)
                && let Some(name) = label.strip_prefix('=')
                && is_name(name)
            {
                placeholders.push((id, name.to_string()));
                continue;
            }

            let mut label = label.as_str();
            if tree.is_leaf(id)
                && label.len() > 1
                && let Some(stripped) = label.strip_suffix('@')
            {
                if foot.is_some() {
                    return Err(error("Auxiliary tree has more than one foot".to_string()));
                }
                foot = Some(id);
                label = stripped;
            }

            if let Some((base, name)) = label.rsplit_once('=')
                && !base.is_empty()
                && name.starts_with(|c: char| c.is_ascii_alphabetic())
                && is_name(name)
            {
                if names.iter().any(|(_, existing)| existing == name) {
                    return Err(error(format!("Name '{}' declared twice", name)));
                }
                names.push((id, name.to_string()));
                label = base;
            }

            let label = label.to_string();
            tree.set_label(id, label);
        }

        Ok(AuxTree {
            source: text.to_string(),
            tree,
            foot,
            names,
            placeholders,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The template with markers stripped
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn foot(&self) -> Option<NodeId> {
        self.foot
    }

    pub fn declared_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.iter().map(|(_, name)| name.as_str())
    }

    pub fn placeholder_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.placeholders.iter().map(|(_, name)| name.as_str())
    }
}

fn is_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
