//! Surgery executor
//!
//! [`apply`] runs one script against one match, in place. Every application
//! gets its own [`Context`]: a table of the nodes created so far by the
//! script's auxiliary trees, consulted before the match bindings when an
//! operation fetches a node by name. Names that resolve to nothing skip the
//! edit that needed them and are reported; the rest of the script still
//! runs.
//!
//! [`process`] drives a pattern and a script over a whole tree. A match is
//! always handled completely before the next one is looked for. If the
//! script changed the tree's structure, matching starts over on the new
//! tree; after relabeling only, the current enumeration continues.

use crate::config::Config;
use crate::operation::{
    AdjoinMode, AuxTree, Operand, Operation, Position, Relabel, ReplacementPart, Script,
};
use crate::pattern::Pattern;
use crate::searcher::{Match, MatchMode, Matcher};
use crate::tree::{NodeId, Tree};
use rustc_hash::FxHashMap;
use std::fmt;
use tracing::{debug, warn};

/// Something that went wrong while applying a script, without stopping it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A name resolved to no node; the edit that needed it was skipped
    UnresolvedNode { name: String },
    /// A relabel regex did not match; the label was left alone
    RegexMismatch { name: String, label: String },
    /// An edit that cannot be carried out on this tree was skipped
    Skipped {
        operation: &'static str,
        reason: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnresolvedNode { name } => write!(f, "Unresolved node '{}'", name),
            Diagnostic::RegexMismatch { name, label } => {
                write!(f, "Relabel regex does not match '{}' (node '{}')", label, name)
            }
            Diagnostic::Skipped { operation, reason } => {
                write!(f, "Skipped {}: {}", operation, reason)
            }
        }
    }
}

/// Result of applying a script to one match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Root of the tree afterwards; `None` if everything was deleted
    pub root: Option<NodeId>,
    pub diagnostics: Vec<Diagnostic>,
    /// Whether nodes were added, removed or moved
    pub restructured: bool,
}

/// Result of running pattern/script pairs over a tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    /// Number of matches a script was applied to
    pub applications: usize,
    pub diagnostics: Vec<Diagnostic>,
    /// Stopped early at the configured application limit
    pub limit_reached: bool,
}

/// Why an edit could not be made
enum Abort {
    /// Already reported as [`Diagnostic::UnresolvedNode`]
    Unresolved,
    Invalid(String),
}

type Step = Result<(), Abort>;

fn invalid<T>(reason: &str) -> Result<T, Abort> {
    Err(Abort::Invalid(reason.to_string()))
}

/// A fresh copy of an auxiliary tree
struct Instance {
    root: NodeId,
    foot: Option<NodeId>,
}

/// Per-application state
struct Context<'m> {
    matched: &'m Match,
    annotation_chars: &'m [char],
    /// Nodes created by auxiliary trees during this application
    created: FxHashMap<String, NodeId>,
    diagnostics: Vec<Diagnostic>,
}

impl<'m> Context<'m> {
    fn new(matched: &'m Match, annotation_chars: &'m [char]) -> Self {
        Self {
            matched,
            annotation_chars,
            created: FxHashMap::default(),
            diagnostics: Vec::new(),
        }
    }

    fn lookup(&self, name: &str) -> Option<NodeId> {
        self.created
            .get(name)
            .copied()
            .or_else(|| self.matched.node(name))
    }

    /// Resolve a name, reporting it if it resolves to nothing
    fn fetch(&mut self, name: &str) -> Result<NodeId, Abort> {
        match self.lookup(name) {
            Some(node) => Ok(node),
            None => {
                warn!(name, "unresolved node name; edit skipped");
                self.diagnostics.push(Diagnostic::UnresolvedNode {
                    name: name.to_string(),
                });
                Err(Abort::Unresolved)
            }
        }
    }

    fn run(&mut self, tree: &mut Tree, operation: &Operation) {
        if let Err(Abort::Invalid(reason)) = self.dispatch(tree, operation) {
            warn!(operation = operation.keyword(), %reason, "edit skipped");
            self.diagnostics.push(Diagnostic::Skipped {
                operation: operation.keyword(),
                reason,
            });
        }
    }

    fn dispatch(&mut self, tree: &mut Tree, operation: &Operation) -> Step {
        match operation {
            Operation::Delete(names) => {
                for name in names {
                    if let Ok(node) = self.fetch(name) {
                        tree.detach(node);
                    }
                }
                Ok(())
            }
            Operation::Prune(names) => {
                for name in names {
                    if let Ok(node) = self.fetch(name) {
                        prune(tree, node);
                    }
                }
                Ok(())
            }
            Operation::Excise { top, bottom } => {
                let top = self.fetch(top)?;
                let bottom = self.fetch(bottom)?;
                excise(tree, top, bottom)
            }
            Operation::Relabel { name, relabel } => {
                let node = self.fetch(name)?;
                self.relabel(tree, name, node, relabel)
            }
            Operation::Insert { operand, position } => {
                let (parent, index) = self.resolve_position(tree, position, None)?;
                let node = self.materialize(tree, operand)?;
                tree.insert_child(parent, index, node);
                Ok(())
            }
            Operation::Move { name, position } => {
                let node = self.fetch(name)?;
                let anchor = self.fetch(position.anchor())?;
                if tree.is_root(node) {
                    return invalid("cannot move the root");
                }
                if anchor == node || tree.dominates(node, anchor) {
                    return invalid("target position is inside the moved subtree");
                }
                let (parent, index) = self.resolve_position(tree, position, Some(node))?;
                tree.detach(node);
                tree.insert_child(parent, index, node);
                Ok(())
            }
            Operation::Replace { name, operands } => {
                let node = self.fetch(name)?;
                if !tree.is_attached(node) {
                    return invalid("node is not in the tree");
                }
                let replacements = operands
                    .iter()
                    .map(|operand| self.materialize(tree, operand))
                    .collect::<Result<Vec<_>, _>>()?;
                put_in_place(tree, node, replacements)
            }
            Operation::Adjoin { mode, aux, target } => {
                let target = self.fetch(target)?;
                if !tree.is_attached(target) {
                    return invalid("target is not in the tree");
                }
                self.adjoin(tree, *mode, aux, target)
            }
            Operation::CreateSubtree { aux, start, end } => {
                let start = self.fetch(start)?;
                let end = match end {
                    Some(end) => Some(self.fetch(end)?),
                    None => None,
                };
                self.create_subtree(tree, aux, start, end)
            }
            Operation::Coindex(names) => {
                let index = tree.max_coindex(self.annotation_chars) + 1;
                for name in names {
                    if let Ok(node) = self.fetch(name) {
                        let label = format!("{}-{}", tree.label(node), index);
                        tree.set_label(node, label);
                    }
                }
                Ok(())
            }
            Operation::IfExists {
                name,
                negated,
                operation,
            } => {
                if self.lookup(name).is_some() != *negated {
                    self.dispatch(tree, operation)
                } else {
                    Ok(())
                }
            }
        }
    }

    fn relabel(&mut self, tree: &mut Tree, name: &str, node: NodeId, relabel: &Relabel) -> Step {
        match relabel {
            Relabel::Literal(label) => {
                tree.set_label(node, label.as_str());
                Ok(())
            }
            Relabel::Regex {
                regex, replacement, ..
            } => {
                let label = tree.label(node).as_str().to_string();
                let Some(captures) = regex.captures(&label) else {
                    debug!(name, %label, "relabel regex does not match");
                    self.diagnostics.push(Diagnostic::RegexMismatch {
                        name: name.to_string(),
                        label: label.clone(),
                    });
                    return Ok(());
                };

                let mut expansion = String::new();
                for part in replacement {
                    match part {
                        ReplacementPart::Text(text) => expansion.push_str(text),
                        ReplacementPart::Group(group) => {
                            if let Some(m) = captures.get(*group) {
                                expansion.push_str(m.as_str());
                            }
                        }
                        ReplacementPart::NodeLabel(other) => {
                            let other = self.fetch(other)?;
                            expansion.push_str(tree.label(other).as_str());
                        }
                    }
                }

                let whole = captures.get(0).map_or(0..0, |m| m.range());
                let new_label = format!(
                    "{}{}{}",
                    &label[..whole.start],
                    expansion,
                    &label[whole.end..]
                );
                tree.set_label(node, new_label);
                Ok(())
            }
        }
    }

    /// Parent and child index an insertion position refers to
    ///
    /// With `moving`, the index is computed as if that node had already been
    /// detached, so nothing needs to change before the position is known to
    /// be valid.
    fn resolve_position(
        &mut self,
        tree: &Tree,
        position: &Position,
        moving: Option<NodeId>,
    ) -> Result<(NodeId, usize), Abort> {
        let anchor = self.fetch(position.anchor())?;
        if !tree.is_attached(anchor) {
            return invalid("anchor is not in the tree");
        }
        match position {
            Position::LeftSister(_) | Position::RightSister(_) => {
                let Some(parent) = tree.parent(anchor) else {
                    return invalid("the root has no sisters");
                };
                let mut sisters = remaining(tree, parent, moving);
                let Some(index) = sisters.position(|child| child == anchor) else {
                    return invalid("anchor is not in the tree");
                };
                match position {
                    Position::LeftSister(_) => Ok((parent, index)),
                    _ => Ok((parent, index + 1)),
                }
            }
            Position::Child { index, .. } => {
                let len = remaining(tree, anchor, moving).count() as i64;
                let index = i64::from(*index);
                let slot = if index > 0 { index - 1 } else { len + 1 + index };
                if (0..=len).contains(&slot) {
                    Ok((anchor, slot as usize))
                } else {
                    invalid("child position out of range")
                }
            }
        }
    }

    /// A detached node ready for insertion: a copy of a named node or a
    /// fresh auxiliary tree
    fn materialize(&mut self, tree: &mut Tree, operand: &Operand) -> Result<NodeId, Abort> {
        match operand {
            Operand::Fetch(name) => {
                let node = self.fetch(name)?;
                Ok(tree.copy_subtree(node))
            }
            Operand::Hold(aux) => Ok(self.instantiate(tree, aux)?.root),
        }
    }

    /// Copy a template into the tree (detached), filling placeholders with
    /// copies of the named nodes and recording the names it declares
    fn instantiate(&mut self, tree: &mut Tree, aux: &AuxTree) -> Result<Instance, Abort> {
        let template = aux.tree();
        let Some(template_root) = template.root() else {
            return invalid("auxiliary tree is empty");
        };

        // Resolve every placeholder before touching the tree
        let mut fills = FxHashMap::default();
        for (id, name) in &aux.placeholders {
            fills.insert(*id, self.fetch(name)?);
        }

        let mut mapping: FxHashMap<NodeId, NodeId> = FxHashMap::default();
        let root = copy_template(tree, template, template_root, &fills, &mut mapping);

        for (id, name) in &aux.names {
            if let Some(&node) = mapping.get(id) {
                self.created.insert(name.clone(), node);
            }
        }
        Ok(Instance {
            root,
            foot: aux.foot().and_then(|foot| mapping.get(&foot).copied()),
        })
    }

    fn adjoin(&mut self, tree: &mut Tree, mode: AdjoinMode, aux: &AuxTree, target: NodeId) -> Step {
        let instance = self.instantiate(tree, aux)?;
        let Some(foot) = instance.foot else {
            return invalid("auxiliary tree has no foot");
        };

        match mode {
            AdjoinMode::Root => {
                let children = take_children(tree, target);
                tree.replace_children(foot, children);
                put_in_place(tree, target, vec![instance.root])
            }
            AdjoinMode::Head => {
                let children = take_children(tree, target);
                tree.replace_children(foot, children);
                let spine = take_children(tree, instance.root);
                tree.replace_children(target, spine);
                self.rename(instance.root, target);
                Ok(())
            }
            AdjoinMode::Foot => {
                put_in_place(tree, target, vec![instance.root])?;
                put_in_place(tree, foot, vec![target])?;
                self.rename(foot, target);
                Ok(())
            }
        }
    }

    /// Point the names declared on a discarded template node at its stand-in
    fn rename(&mut self, discarded: NodeId, stand_in: NodeId) {
        for node in self.created.values_mut() {
            if *node == discarded {
                *node = stand_in;
            }
        }
    }

    fn create_subtree(
        &mut self,
        tree: &mut Tree,
        aux: &AuxTree,
        start: NodeId,
        end: Option<NodeId>,
    ) -> Step {
        if !tree.is_attached(start) {
            return invalid("node is not in the tree");
        }

        let span = match end {
            None => None,
            Some(end) if end == start => None,
            Some(end) => {
                let parent = tree.parent(start);
                if parent.is_none() || parent != tree.parent(end) {
                    return invalid("span ends are not sisters");
                }
                let (Some(i), Some(j)) = (tree.child_index(start), tree.child_index(end)) else {
                    return invalid("span ends are not sisters");
                };
                Some((parent, i.min(j), i.max(j)))
            }
        };

        let instance = self.instantiate(tree, aux)?;
        let Some(foot) = instance.foot else {
            return invalid("auxiliary tree has no foot");
        };

        match span {
            Some((Some(parent), first, last)) => {
                let mut children = tree.children(parent).to_vec();
                let moved: Vec<NodeId> = children
                    .splice(first..=last, [instance.root])
                    .collect();
                tree.replace_children(parent, children);
                tree.replace_children(foot, moved);
                Ok(())
            }
            _ => {
                put_in_place(tree, start, vec![instance.root])?;
                tree.replace_children(foot, vec![start]);
                Ok(())
            }
        }
    }
}

fn copy_template(
    tree: &mut Tree,
    template: &Tree,
    node: NodeId,
    fills: &FxHashMap<NodeId, NodeId>,
    mapping: &mut FxHashMap<NodeId, NodeId>,
) -> NodeId {
    let copy = match fills.get(&node) {
        Some(&source) => tree.copy_subtree(source),
        None => tree.add_node(template.label(node).clone()),
    };
    mapping.insert(node, copy);
    for &child in template.children(node) {
        let child_copy = copy_template(tree, template, child, fills, mapping);
        tree.push_child(copy, child_copy);
    }
    copy
}

/// Detach and return a node's children
fn take_children(tree: &mut Tree, node: NodeId) -> Vec<NodeId> {
    let children = tree.children(node).to_vec();
    tree.replace_children(node, Vec::new());
    children
}

/// Children of `parent` other than `excluded`
fn remaining(
    tree: &Tree,
    parent: NodeId,
    excluded: Option<NodeId>,
) -> impl Iterator<Item = NodeId> + '_ {
    tree.children(parent)
        .iter()
        .copied()
        .filter(move |&child| Some(child) != excluded)
}

/// Put detached `nodes` where `old` is; `old` ends up detached
fn put_in_place(tree: &mut Tree, old: NodeId, nodes: Vec<NodeId>) -> Step {
    if let (Some(parent), Some(index)) = (tree.parent(old), tree.child_index(old)) {
        let mut children = tree.children(parent).to_vec();
        children.splice(index..=index, nodes);
        tree.replace_children(parent, children);
        return Ok(());
    }
    if !tree.is_root(old) {
        return invalid("node is not in the tree");
    }
    match nodes.as_slice() {
        [single] => {
            tree.set_root(Some(*single));
            Ok(())
        }
        _ => invalid("the root can only be replaced by a single node"),
    }
}

/// Detach a node, then every ancestor left without children
fn prune(tree: &mut Tree, node: NodeId) {
    let mut parent = tree.parent(node);
    tree.detach(node);
    while let Some(current) = parent {
        if !tree.children(current).is_empty() {
            break;
        }
        parent = tree.parent(current);
        tree.detach(current);
    }
}

fn excise(tree: &mut Tree, top: NodeId, bottom: NodeId) -> Step {
    if top != bottom && !tree.dominates(top, bottom) {
        return invalid("first node does not dominate the second");
    }
    if !tree.is_attached(top) {
        return invalid("node is not in the tree");
    }
    if tree.is_root(top) && tree.children(bottom).len() != 1 {
        return invalid("excising the root must leave a single root");
    }
    let children = take_children(tree, bottom);
    put_in_place(tree, top, children)
}

/// Apply a script to one match, in place
pub fn apply(script: &Script, tree: &mut Tree, matched: &Match) -> Outcome {
    let revision = tree.revision();
    let mut context = Context::new(matched, script.annotation_chars());
    for operation in script.operations() {
        context.run(tree, operation);
    }
    Outcome {
        root: tree.root(),
        diagnostics: context.diagnostics,
        restructured: tree.revision() != revision,
    }
}

/// Apply `script` to every match of `pattern` in `tree`
///
/// Every distinct binding counts as a match. After a structural edit the
/// search starts over on the edited tree, so a script whose result still
/// matches the pattern is applied again, up to `config.max_applications`.
pub fn process(tree: &mut Tree, pattern: &Pattern, script: &Script, config: &Config) -> Report {
    let mut report = Report::default();
    run(tree, pattern, script, config, &mut report);
    report
}

/// Run several pattern/script pairs in order
pub fn process_all(tree: &mut Tree, pairs: &[(Pattern, Script)], config: &Config) -> Report {
    let mut report = Report::default();
    for (pattern, script) in pairs {
        run(tree, pattern, script, config, &mut report);
    }
    report
}

fn run(tree: &mut Tree, pattern: &Pattern, script: &Script, config: &Config, report: &mut Report) {
    let mut applications = 0;
    let mut matcher = Matcher::with_mode(pattern, tree, MatchMode::AllBindings);

    while !tree.is_empty() {
        let Some(matched) = matcher.next_match(tree) else {
            break;
        };
        if applications >= config.max_applications {
            warn!(
                pattern = pattern.source(),
                limit = config.max_applications,
                "application limit reached; pattern still matches"
            );
            report.limit_reached = true;
            break;
        }

        let outcome = apply(script, tree, &matched);
        applications += 1;
        report.diagnostics.extend(outcome.diagnostics);
        if outcome.restructured {
            debug!(pattern = pattern.source(), "tree restructured; matching restarts");
            matcher = Matcher::with_mode(pattern, tree, MatchMode::AllBindings);
        }
    }

    report.applications += applications;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::compile_pattern;
    use crate::script::{compile_script, parse_script};
    use crate::searcher::search;

    const COORD: &str = "(NP (NP (NNP John)) (CC and) (NP (NNP Mary)))";

    /// Apply a script to the first match and return the resulting tree text
    fn run_first(tree: &str, pattern: &str, script: &str) -> (String, Outcome) {
        let mut tree: Tree = tree.parse().unwrap();
        let pattern = compile_pattern(pattern).unwrap();
        let script = compile_script(script, &pattern).unwrap();
        let matched = search(&pattern, &tree).next().unwrap();
        let outcome = apply(&script, &mut tree, &matched);
        (tree.to_string(), outcome)
    }

    #[test]
    fn test_relabel_inner() {
        let (text, outcome) = run_first(COORD, "NP < (NP=inner $ CC)", "relabel inner VP");
        assert_eq!(text, "(NP (VP (NNP John)) (CC and) (NP (NNP Mary)))");
        assert!(outcome.diagnostics.is_empty());
        assert!(!outcome.restructured);
    }

    #[test]
    fn test_unresolved_delete_is_reported_once() {
        let mut tree: Tree = COORD.parse().unwrap();
        let pattern = compile_pattern("NP < (NP=inner ?$ PP=pp)").unwrap();
        let script = compile_script("delete pp", &pattern).unwrap();
        let matched = search(&pattern, &tree).next().unwrap();

        let outcome = apply(&script, &mut tree, &matched);
        assert_eq!(tree.to_string(), COORD);
        assert!(!outcome.restructured);
        assert_eq!(
            outcome.diagnostics,
            vec![Diagnostic::UnresolvedNode {
                name: "pp".to_string()
            }]
        );
    }

    #[test]
    fn test_relabel_to_same_value_is_idempotent() {
        let (text, outcome) = run_first(COORD, "NP < (NP=inner $ CC)", "relabel inner NP");
        assert_eq!(text, COORD);
        assert!(!outcome.restructured);
    }

    #[test]
    fn test_regex_relabel() {
        let (text, _) = run_first(
            "(S (NP-SBJ-1 (NNP John)) (VP (VBD left)))",
            "@NP=np",
            "relabel np /^(NP)-.*$/$1-TMP/",
        );
        assert_eq!(text, "(S (NP-TMP (NNP John)) (VP (VBD left)))");

        let (text, _) = run_first(COORD, "NP < CC=cc", "relabel cc /C/X/");
        assert_eq!(text, "(NP (NP (NNP John)) (XC and) (NP (NNP Mary)))");

        let (text, outcome) = run_first(COORD, "NP < CC=cc", "relabel cc /^NN/X/");
        assert_eq!(text, COORD);
        assert_eq!(
            outcome.diagnostics,
            vec![Diagnostic::RegexMismatch {
                name: "cc".to_string(),
                label: "CC".to_string()
            }]
        );

        let (text, _) = run_first(
            COORD,
            "NP < (NP=a < NNP) < CC=cc",
            "relabel cc /^.*$/={a}-and/",
        );
        assert_eq!(text, "(NP (NP (NNP John)) (NP-and and) (NP (NNP Mary)))");
    }

    #[test]
    fn test_delete_and_prune() {
        let (text, outcome) = run_first(COORD, "CC=cc", "delete cc");
        assert_eq!(text, "(NP (NP (NNP John)) (NP (NNP Mary)))");
        assert!(outcome.restructured);

        let (text, _) = run_first(
            "(S (NP (DT the)) (VP (VBD left)))",
            "DT=d > NP",
            "prune d",
        );
        assert_eq!(text, "(S (VP (VBD left)))");

        let (text, _) = run_first("(S (NP (DT the)) (VP (VBD left)))", "DT=d", "delete d");
        assert_eq!(text, "(S NP (VP (VBD left)))");
    }

    #[test]
    fn test_delete_root_empties_tree() {
        let (text, outcome) = run_first(COORD, "NP=top !> __", "delete top");
        assert_eq!(text, "()");
        assert_eq!(outcome.root, None);
    }

    #[test]
    fn test_excise() {
        let (text, _) = run_first(
            "(S (NP (NP (NNP John))) (VP (VBD left)))",
            "NP=outer < NP=inner",
            "excise outer inner",
        );
        assert_eq!(text, "(S (NNP John) (VP (VBD left)))");

        let (text, _) = run_first(
            "(ROOT (S (VP (VBD left))))",
            "ROOT=r",
            "excise r r",
        );
        assert_eq!(text, "(S (VP (VBD left)))");

        let (text, outcome) = run_first(COORD, "NP=a < (CC=b)", "excise b a");
        assert_eq!(text, COORD);
        assert!(matches!(&outcome.diagnostics[0], Diagnostic::Skipped { operation: "excise", .. }));
    }

    #[test]
    fn test_insert_positions() {
        let (text, _) = run_first(COORD, "CC=cc", "insert (DT both) $+ cc");
        assert_eq!(text, "(NP (NP (NNP John)) (DT both) (CC and) (NP (NNP Mary)))");

        let (text, _) = run_first(COORD, "CC=cc", "insert (DT both) $- cc");
        assert_eq!(text, "(NP (NP (NNP John)) (CC and) (DT both) (NP (NNP Mary)))");

        let (text, _) = run_first(COORD, "NP=np !> __", "insert (DT both) >1 np");
        assert_eq!(text, "(NP (DT both) (NP (NNP John)) (CC and) (NP (NNP Mary)))");

        let (text, _) = run_first(COORD, "NP=np !> __", "insert (. .) >-1 np");
        assert_eq!(text, "(NP (NP (NNP John)) (CC and) (NP (NNP Mary)) (. .))");

        let (text, outcome) = run_first(COORD, "NP=np !> __", "insert (X x) >9 np");
        assert_eq!(text, COORD);
        assert!(matches!(&outcome.diagnostics[0], Diagnostic::Skipped { .. }));

        let (_, outcome) = run_first(COORD, "NP=np !> __", "insert (X x) $+ np");
        assert!(matches!(
            &outcome.diagnostics[0],
            Diagnostic::Skipped { reason, .. } if reason.contains("root")
        ));
    }

    #[test]
    fn test_insert_copies_fetched_node() {
        let (text, _) = run_first(COORD, "NP < (NP=a < NNP) < CC=cc", "insert a $- cc");
        assert_eq!(
            text,
            "(NP (NP (NNP John)) (CC and) (NP (NNP John)) (NP (NNP Mary)))"
        );
    }

    #[test]
    fn test_placeholders_and_created_names() {
        let (text, _) = run_first(
            COORD,
            "NP=top < (NP=a < NNP) < CC=cc",
            "insert (PP=pp (IN with) =a) >-1 top\nrelabel pp PP-COM",
        );
        assert_eq!(
            text,
            "(NP (NP (NNP John)) (CC and) (NP (NNP Mary)) (PP-COM (IN with) (NP (NNP John))))"
        );
    }

    #[test]
    fn test_move() {
        let (text, _) = run_first(COORD, "NP=top < CC=cc", "move cc >-1 top");
        assert_eq!(text, "(NP (NP (NNP John)) (NP (NNP Mary)) (CC and))");

        let (text, outcome) = run_first(COORD, "NP=top < NP=inner", "move top >1 inner");
        assert_eq!(text, COORD);
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[test]
    fn test_move_within_the_same_parent() {
        let (text, _) = run_first(COORD, "NP=top < CC=cc", "move cc >1 top");
        assert_eq!(text, "(NP (CC and) (NP (NNP John)) (NP (NNP Mary)))");

        let (text, _) = run_first(COORD, "NP=top < CC=cc", "move cc >3 top");
        assert_eq!(text, "(NP (NP (NNP John)) (NP (NNP Mary)) (CC and))");

        let (text, _) = run_first(COORD, "NP < (CC=cc $+ NP=last)", "move cc $- last");
        assert_eq!(text, "(NP (NP (NNP John)) (NP (NNP Mary)) (CC and))");
    }

    #[test]
    fn test_move_to_invalid_position_keeps_node() {
        for (script, reason) in [
            ("move cc >9 top", "child position out of range"),
            ("move cc $+ top", "the root has no sisters"),
            ("move cc $- top", "the root has no sisters"),
        ] {
            let (text, outcome) = run_first(COORD, "NP=top < CC=cc", script);
            assert_eq!(text, COORD, "{script}");
            assert!(!outcome.restructured, "{script}");
            assert_eq!(
                outcome.diagnostics,
                vec![Diagnostic::Skipped {
                    operation: "move",
                    reason: reason.to_string(),
                }],
                "{script}"
            );
        }
    }

    #[test]
    fn test_replace() {
        let (text, _) = run_first(COORD, "CC=cc", "replace cc (CONJ and) (ADV also)");
        assert_eq!(
            text,
            "(NP (NP (NNP John)) (CONJ and) (ADV also) (NP (NNP Mary)))"
        );
    }

    #[test]
    fn test_adjoin_variants() {
        let tree = "(S (VP (VBD left)))";

        let (text, _) = run_first(tree, "VP=vp", "adjoin (VP (ADVP early) VP@) vp");
        assert_eq!(text, "(S (VP (ADVP early) (VP (VBD left))))");

        let (text, _) = run_first(tree, "VP=vp", "adjoinH (XP (ADVP early) YP@) vp");
        assert_eq!(text, "(S (VP (ADVP early) (YP (VBD left))))");

        let (text, _) = run_first(
            tree,
            "VP=vp",
            "adjoinF (VP=outer (ADVP early) VP@) vp\nrelabel outer VP-OUT",
        );
        assert_eq!(text, "(S (VP-OUT (ADVP early) (VP (VBD left))))");
    }

    #[test]
    fn test_adjoin_f_keeps_target_identity() {
        let mut tree: Tree = "(S (VP (VBD left)))".parse().unwrap();
        let pattern = compile_pattern("VP=vp").unwrap();
        let script = compile_script("adjoinF (XP (ADVP early) XP@) vp", &pattern).unwrap();
        let matched = search(&pattern, &tree).next().unwrap();
        let vp = matched.node("vp").unwrap();

        apply(&script, &mut tree, &matched);
        assert_eq!(tree.to_string(), "(S (XP (ADVP early) (VP (VBD left))))");
        assert!(tree.is_attached(vp));
        assert_eq!(tree.label(tree.parent(vp).unwrap()).as_str(), "XP");
    }

    #[test]
    fn test_create_subtree() {
        let (text, _) = run_first(
            "(S (DT the) (JJ big) (NN dog) (VBD left))",
            "S < DT=a < NN=b",
            "createSubtree (NP NP@) a b",
        );
        assert_eq!(text, "(S (NP (NP (DT the) (JJ big) (NN dog))) (VBD left))");

        let (text, _) = run_first(
            "(S (DT the) (JJ big) (NN dog) (VBD left))",
            "S < DT=a < NN=b",
            "createSubtree (NP@) a b",
        );
        assert_eq!(text, "(S (NP (DT the) (JJ big) (NN dog)) (VBD left))");

        let (text, _) = run_first(
            "(S (DT the) (VBD left))",
            "DT=a",
            "createSubtree (NP (QP X@)) a",
        );
        assert_eq!(text, "(S (NP (QP (X (DT the)))) (VBD left))");
    }

    #[test]
    fn test_coindex() {
        let (text, _) = run_first(
            "(S (NP-SBJ-1 (NNP John)) (VP (VBD left) (NP (-NONE- *))))",
            "S < (@NP=a < NNP) < (VP < (NP=b < -NONE-))",
            "coindex a b",
        );
        assert_eq!(
            text,
            "(S (NP-SBJ-1-2 (NNP John)) (VP (VBD left) (NP-2 (-NONE- *))))"
        );

        let (text, outcome) = run_first(
            "(S (NP-SBJ-3 (-NONE- *)) (NP (NNP John)) (VP (VBD left) (NP (-NONE- *T*))))",
            "S < (NP=a < NNP) < (VP < (NP=b < -NONE-))",
            "coindex a b",
        );
        assert_eq!(
            text,
            "(S (NP-SBJ-3 (-NONE- *)) (NP-4 (NNP John)) (VP (VBD left) (NP-4 (-NONE- *T*))))"
        );
        assert!(!outcome.restructured);
    }

    #[test]
    fn test_if_exists() {
        let pattern = "NP < (NP=inner ?$ PP=pp)";
        let (text, outcome) = run_first(COORD, pattern, "if exists pp delete inner");
        assert_eq!(text, COORD);
        assert!(outcome.diagnostics.is_empty());

        let (text, _) = run_first(COORD, pattern, "if not exists pp delete inner");
        assert_eq!(text, "(NP (CC and) (NP (NNP Mary)))");
    }

    #[test]
    fn test_unresolved_skips_only_dependent_edit() {
        let mut tree: Tree = COORD.parse().unwrap();
        let script = parse_script("delete ghost cc\nrelabel ghost X\nrelabel inner VP").unwrap();
        let pattern = compile_pattern("NP < (NP=inner $ CC=cc)").unwrap();
        let matched = search(&pattern, &tree).next().unwrap();

        let outcome = apply(&script, &mut tree, &matched);
        assert_eq!(tree.to_string(), "(NP (VP (NNP John)) (NP (NNP Mary)))");
        assert_eq!(outcome.diagnostics.len(), 2);
    }

    #[test]
    fn test_auxiliary_trees_are_not_shared() {
        let mut tree: Tree = "(S (NP (NN a)) (NP (NN b)))".parse().unwrap();
        let pattern = compile_pattern("NP=np").unwrap();
        let script = compile_script("insert (DT=det the) >1 np", &pattern).unwrap();

        let matches: Vec<_> = search(&pattern, &tree).collect();
        assert_eq!(matches.len(), 2);
        for matched in &matches {
            apply(&script, &mut tree, matched);
        }
        assert_eq!(tree.to_string(), "(S (NP (DT the) (NN a)) (NP (DT the) (NN b)))");

        let root = tree.root().unwrap();
        let dets: Vec<NodeId> = tree
            .children(root)
            .iter()
            .map(|&np| tree.children(np)[0])
            .collect();
        assert_ne!(dets[0], dets[1]);
        assert_ne!(tree.children(dets[0])[0], tree.children(dets[1])[0]);
        for id in tree.iter() {
            if let Some(parent) = tree.parent(id) {
                assert_eq!(tree.children(parent).iter().filter(|&&c| c == id).count(), 1);
            }
        }
    }

    #[test]
    fn test_process_relabels_every_binding() {
        let mut tree: Tree = COORD.parse().unwrap();
        let pattern = compile_pattern("NP < (NP=inner $ CC)").unwrap();
        let script = compile_script("relabel inner NX", &pattern).unwrap();
        let report = process(&mut tree, &pattern, &script, &Config::default());

        assert_eq!(tree.to_string(), "(NP (NX (NNP John)) (CC and) (NX (NNP Mary)))");
        assert_eq!(report.applications, 2);
        assert!(!report.limit_reached);
    }

    #[test]
    fn test_process_restarts_after_restructuring() {
        let mut tree: Tree = "(S (NP (NN a)) (VP (V b) (NP (NN c))))".parse().unwrap();
        let pattern = compile_pattern("NP=np !< DT").unwrap();
        let script = compile_script("insert (DT the) >1 np", &pattern).unwrap();
        let report = process(&mut tree, &pattern, &script, &Config::default());

        assert_eq!(
            tree.to_string(),
            "(S (NP (DT the) (NN a)) (VP (V b) (NP (DT the) (NN c))))"
        );
        assert_eq!(report.applications, 2);
    }

    #[test]
    fn test_process_stops_at_limit() {
        let mut tree: Tree = "(S (NP x))".parse().unwrap();
        let pattern = compile_pattern("S=s").unwrap();
        let script = compile_script("insert (X x) >-1 s", &pattern).unwrap();
        let config = Config::default().with_max_applications(5);
        let report = process(&mut tree, &pattern, &script, &config);

        assert_eq!(report.applications, 5);
        assert!(report.limit_reached);
        assert_eq!(tree.children(tree.root().unwrap()).len(), 6);
    }

    #[test]
    fn test_process_skipped_edit_does_not_restart() {
        let mut tree: Tree = "(S (NP x))".parse().unwrap();
        let pattern = compile_pattern("S=s !> __").unwrap();
        let script = compile_script("replace s (A a) (B b)", &pattern).unwrap();
        let report = process(&mut tree, &pattern, &script, &Config::default());

        assert_eq!(tree.to_string(), "(S (NP x))");
        assert_eq!(report.applications, 1);
        assert!(!report.limit_reached);
        assert_eq!(report.diagnostics.len(), 1);
        assert!(matches!(
            &report.diagnostics[0],
            Diagnostic::Skipped { operation: "replace", .. }
        ));
    }

    #[test]
    fn test_process_stops_when_tree_is_empty() {
        let mut tree: Tree = "(S (NP x))".parse().unwrap();
        let pattern = compile_pattern("__=n").unwrap();
        let script = compile_script("delete n", &pattern).unwrap();
        let report = process(&mut tree, &pattern, &script, &Config::default());

        assert!(tree.is_empty());
        assert_eq!(report.applications, 1);
    }

    #[test]
    fn test_process_all() {
        let mut tree: Tree = COORD.parse().unwrap();
        let first = compile_pattern("CC=cc").unwrap();
        let second = compile_pattern("NP=np !> __").unwrap();
        let pairs = vec![
            (first.clone(), compile_script("relabel cc CONJ", &first).unwrap()),
            (second.clone(), compile_script("relabel np NP-COORD", &second).unwrap()),
        ];
        let report = process_all(&mut tree, &pairs, &Config::default());

        assert_eq!(
            tree.to_string(),
            "(NP-COORD (NP (NNP John)) (CONJ and) (NP (NNP Mary)))"
        );
        assert_eq!(report.applications, 2);
    }
}
