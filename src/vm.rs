//! Backtracking machine for pattern matching
//!
//! The machine works through a stack of goals: "this node must match this
//! pattern node" and "this node must satisfy this condition". Relations and
//! disjunctions create choice points; a failed goal restores the most
//! recent choice point and tries its next alternative. When the goal stack
//! is empty the current bindings are a solution.

use crate::index::TreeIndex;
use crate::pattern::{Bindings, Condition, LabelTest, NodePattern};
use crate::tree::{NodeId, Tree};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy)]
enum Goal<'p> {
    /// Node must match the pattern node (description, capture, condition)
    Node {
        node: NodeId,
        pattern: &'p NodePattern,
    },
    /// Node must satisfy the condition
    Cond {
        node: NodeId,
        condition: &'p Condition,
    },
}

/// A choice point for backtracking
#[derive(Debug, Clone)]
struct ChoicePoint<'p> {
    /// Goals pending when the choice was made
    goals: Vec<Goal<'p>>,
    /// Saved bindings from when choice was created
    bindings: Bindings,
    /// Alternatives still to try, in order
    alternatives: VecDeque<Goal<'p>>,
}

/// Execution state for one pattern against one candidate root
#[derive(Debug)]
pub struct VM<'p> {
    goals: Vec<Goal<'p>>,
    bindings: Bindings,
    backtrack_stack: Vec<ChoicePoint<'p>>,
    annotation_chars: &'p [char],
    started: bool,
}

impl<'p> VM<'p> {
    /// Start matching `pattern` at `root`
    pub fn new(
        pattern: &'p NodePattern,
        root: NodeId,
        num_vars: usize,
        annotation_chars: &'p [char],
    ) -> Self {
        Self::with_goal(
            Goal::Node {
                node: root,
                pattern,
            },
            vec![None; num_vars],
            annotation_chars,
        )
    }

    fn with_goal(goal: Goal<'p>, bindings: Bindings, annotation_chars: &'p [char]) -> Self {
        Self {
            goals: vec![goal],
            bindings,
            backtrack_stack: Vec::new(),
            annotation_chars,
            started: false,
        }
    }

    /// Find the next solution, or `None` once every alternative is spent
    pub fn next_solution(&mut self, tree: &Tree, index: &TreeIndex) -> Option<Bindings> {
        // Resume after a previous solution by forcing backtracking
        if self.started && !self.backtrack() {
            return None;
        }
        self.started = true;

        loop {
            let Some(goal) = self.goals.pop() else {
                return Some(self.bindings.clone());
            };
            if !self.step(goal, tree, index) && !self.backtrack() {
                self.goals.clear();
                return None;
            }
        }
    }

    /// Work on one goal; false means the current branch failed
    fn step(&mut self, goal: Goal<'p>, tree: &Tree, index: &TreeIndex) -> bool {
        match goal {
            Goal::Node { node, pattern } => {
                if !pattern
                    .description
                    .matches(tree, node, &self.bindings, self.annotation_chars)
                {
                    return false;
                }
                if let LabelTest::SameNode(var) = pattern.description.test
                    && self.bindings[var].is_none()
                {
                    self.bindings[var] = Some(node);
                }
                if let Some(var) = pattern.capture {
                    match self.bindings[var] {
                        Some(bound) if bound != node => return false,
                        _ => self.bindings[var] = Some(node),
                    }
                }
                if let Some(condition) = &pattern.condition {
                    self.goals.push(Goal::Cond { node, condition });
                }
                true
            }
            Goal::Cond { node, condition } => match condition {
                Condition::And(conjuncts) => {
                    // Reversed so the first conjunct is worked on first
                    for condition in conjuncts.iter().rev() {
                        self.goals.push(Goal::Cond { node, condition });
                    }
                    true
                }
                Condition::Or(disjuncts) => self.branch(
                    disjuncts
                        .iter()
                        .map(|condition| Goal::Cond { node, condition })
                        .collect(),
                ),
                Condition::Not(inner) => !self.satisfiable(node, inner, tree, index),
                Condition::Optional(inner) => {
                    if self.satisfiable(node, inner, tree, index) {
                        self.goals.push(Goal::Cond {
                            node,
                            condition: inner,
                        });
                    }
                    true
                }
                Condition::Relation { relation, target } => {
                    let candidates = relation.candidates(
                        tree,
                        index,
                        node,
                        &self.bindings,
                        self.annotation_chars,
                    );
                    self.branch(
                        candidates
                            .into_iter()
                            .map(|node| Goal::Node {
                                node,
                                pattern: target,
                            })
                            .collect(),
                    )
                }
            },
        }
    }

    /// Check a condition in a throwaway machine; its bindings are discarded
    fn satisfiable(
        &self,
        node: NodeId,
        condition: &'p Condition,
        tree: &Tree,
        index: &TreeIndex,
    ) -> bool {
        let mut sub = VM::with_goal(
            Goal::Cond { node, condition },
            self.bindings.clone(),
            self.annotation_chars,
        );
        sub.next_solution(tree, index).is_some()
    }

    /// Continue with the first alternative, saving the rest
    fn branch(&mut self, mut alternatives: VecDeque<Goal<'p>>) -> bool {
        let Some(first) = alternatives.pop_front() else {
            return false;
        };
        if !alternatives.is_empty() {
            self.backtrack_stack.push(ChoicePoint {
                goals: self.goals.clone(),
                bindings: self.bindings.clone(),
                alternatives,
            });
        }
        self.goals.push(first);
        true
    }

    /// Attempt to backtrack to a previous choice point
    fn backtrack(&mut self) -> bool {
        while let Some(mut choice) = self.backtrack_stack.pop() {
            if let Some(next_alternative) = choice.alternatives.pop_front() {
                self.goals = choice.goals.clone();
                self.bindings = choice.bindings.clone();
                self.goals.push(next_alternative);

                // Put choice point back if more alternatives remain
                if !choice.alternatives.is_empty() {
                    self.backtrack_stack.push(choice);
                }
                return true;
            }
        }
        false
    }
}
