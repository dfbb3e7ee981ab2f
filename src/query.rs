//! Pattern language compiler
//!
//! Parses pattern text into a [`Pattern`] using the pest grammar in
//! `pattern.pest`, then checks that every backreference names a capture.

use pest::Parser;
use pest::iterators::{Pair, Pairs};
use pest_derive::Parser;
use regex::Regex;
use thiserror::Error;

use crate::config::Config;
use crate::pattern::{
    Atom, Condition, Description, LabelTest, NodePattern, NodePredicate, Pattern, VarId,
};
use crate::relation::Relation;

#[derive(Parser)]
#[grammar = "pattern.pest"]
struct PatternParser;

/// Malformed pattern text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Pattern syntax error at position {position}: {message} (near `{fragment}`)")]
pub struct PatternSyntaxError {
    pub message: String,
    /// Byte offset into the pattern text
    pub position: usize,
    /// The offending substring
    pub fragment: String,
}

impl PatternSyntaxError {
    fn at(text: &str, position: usize, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position,
            fragment: token_at(text, position).to_string(),
        }
    }

    fn spanning(pair: &Pair<'_, Rule>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: pair.as_span().start(),
            fragment: pair.as_str().to_string(),
        }
    }

    fn from_pest(text: &str, err: pest::error::Error<Rule>) -> Self {
        let (position, fragment) = match err.location {
            pest::error::InputLocation::Pos(pos) => (pos, token_at(text, pos)),
            pest::error::InputLocation::Span((start, end)) => (start, &text[start..end]),
        };
        let message = err.renamed_rules(rule_name).variant.message().into_owned();
        Self {
            message,
            position,
            fragment: fragment.to_string(),
        }
    }
}

/// Text from `pos` up to the next whitespace
fn token_at(text: &str, pos: usize) -> &str {
    let rest = text.get(pos..).unwrap_or("");
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    &rest[..end]
}

fn rule_name(rule: &Rule) -> String {
    match rule {
        Rule::EOI => "end of pattern",
        Rule::node_expr | Rule::description | Rule::label_test => "node description",
        Rule::rel_disjunction | Rule::rel_conjunction | Rule::rel_term | Rule::relation => {
            "relation"
        }
        Rule::rel_op | Rule::chain_op | Rule::nth_op | Rule::simple_op => "relation operator",
        Rule::predicate | Rule::predicate_kind => "node predicate",
        Rule::capture | Rule::name => "name",
        _ => return format!("{:?}", rule),
    }
    .to_string()
}

/// Compile a pattern with the default configuration
pub fn compile_pattern(text: &str) -> Result<Pattern, PatternSyntaxError> {
    compile_pattern_with(text, &Config::default())
}

/// Compile a pattern
pub fn compile_pattern_with(text: &str, config: &Config) -> Result<Pattern, PatternSyntaxError> {
    let mut pairs = PatternParser::parse(Rule::pattern, text)
        .map_err(|e| PatternSyntaxError::from_pest(text, e))?;
    let pattern_pair = next_pair(text, &mut pairs)?;
    let mut inner = pattern_pair.into_inner();
    let node_pair = next_pair(text, &mut inner)?;

    let mut compiler = Compiler::new(text);
    let root = compiler.node_expr(node_pair)?;
    compiler.validate()?;

    Ok(Pattern {
        source: text.to_string(),
        root,
        var_names: compiler.var_names.into(),
        visible: compiler.visible,
        annotation_chars: config.annotation_chars.clone(),
    })
}

fn next_pair<'i>(text: &str, pairs: &mut Pairs<'i, Rule>) -> Result<Pair<'i, Rule>, PatternSyntaxError> {
    pairs
        .next()
        .ok_or_else(|| PatternSyntaxError::at(text, text.len(), "Incomplete pattern"))
}

/// A use of a name as a backreference
struct Reference {
    var: VarId,
    position: usize,
    fragment: String,
    negated: bool,
}

struct Compiler<'a> {
    text: &'a str,
    var_names: Vec<String>,
    /// Per variable: captured anywhere
    captured: Vec<bool>,
    /// Per variable: captured outside every negation
    visible: Vec<bool>,
    references: Vec<Reference>,
    negation_depth: usize,
}

impl<'a> Compiler<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            var_names: Vec::new(),
            captured: Vec::new(),
            visible: Vec::new(),
            references: Vec::new(),
            negation_depth: 0,
        }
    }

    /// Variable for a name, allocated on first appearance
    fn var(&mut self, name: &str) -> VarId {
        if let Some(id) = self.var_names.iter().position(|n| n == name) {
            return id;
        }
        self.var_names.push(name.to_string());
        self.captured.push(false);
        self.visible.push(false);
        self.var_names.len() - 1
    }

    fn capture(&mut self, name: &str) -> VarId {
        let var = self.var(name);
        self.captured[var] = true;
        if self.negation_depth == 0 {
            self.visible[var] = true;
        }
        var
    }

    fn reference(&mut self, pair: &Pair<'_, Rule>, name: &str) -> VarId {
        let var = self.var(name);
        self.references.push(Reference {
            var,
            position: pair.as_span().start(),
            fragment: pair.as_str().to_string(),
            negated: self.negation_depth > 0,
        });
        var
    }

    fn next<'i>(&self, pairs: &mut Pairs<'i, Rule>) -> Result<Pair<'i, Rule>, PatternSyntaxError> {
        next_pair(self.text, pairs)
    }

    /// Backreferences must name a capture, and outside negations a capture
    /// that is itself outside every negation
    fn validate(&self) -> Result<(), PatternSyntaxError> {
        for reference in &self.references {
            let name = &self.var_names[reference.var];
            let message = if !self.captured[reference.var] {
                format!("Unknown name '{}'", name)
            } else if !reference.negated && !self.visible[reference.var] {
                format!("Name '{}' is only captured inside a negation", name)
            } else {
                continue;
            };
            return Err(PatternSyntaxError {
                message,
                position: reference.position,
                fragment: reference.fragment.clone(),
            });
        }
        Ok(())
    }

    fn node_expr(&mut self, pair: Pair<'_, Rule>) -> Result<NodePattern, PatternSyntaxError> {
        let mut inner = pair.into_inner();
        let head = self.next(&mut inner)?;
        let mut node = match head.as_rule() {
            Rule::node_expr => self.node_expr(head)?,
            _ => self.node_description(head)?,
        };
        if let Some(relations) = inner.next() {
            let condition = self.disjunction(relations)?;
            node.and(condition);
        }
        Ok(node)
    }

    fn node_description(&mut self, pair: Pair<'_, Rule>) -> Result<NodePattern, PatternSyntaxError> {
        let (description, capture) = self.description(pair)?;
        let mut node = NodePattern::new(description);
        node.capture = capture.map(|name| self.capture(&name));
        Ok(node)
    }

    fn disjunction(&mut self, pair: Pair<'_, Rule>) -> Result<Condition, PatternSyntaxError> {
        let mut branches = pair
            .into_inner()
            .map(|conj| self.conjunction(conj))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(match branches.len() {
            1 => branches.remove(0),
            _ => Condition::Or(branches),
        })
    }

    fn conjunction(&mut self, pair: Pair<'_, Rule>) -> Result<Condition, PatternSyntaxError> {
        let mut terms = pair
            .into_inner()
            .map(|term| self.term(term))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(match terms.len() {
            1 => terms.remove(0),
            _ => Condition::And(terms),
        })
    }

    fn term(&mut self, pair: Pair<'_, Rule>) -> Result<Condition, PatternSyntaxError> {
        let mut inner = pair.into_inner();
        let first = self.next(&mut inner)?;
        match first.as_rule() {
            Rule::negation => {
                let operand = self.next(&mut inner)?;
                self.negation_depth += 1;
                let condition = self.term(operand);
                self.negation_depth -= 1;
                Ok(Condition::Not(Box::new(condition?)))
            }
            Rule::optional => {
                let operand = self.next(&mut inner)?;
                Ok(Condition::Optional(Box::new(self.term(operand)?)))
            }
            Rule::rel_disjunction => self.disjunction(first),
            _ => self.relation(first),
        }
    }

    fn relation(&mut self, pair: Pair<'_, Rule>) -> Result<Condition, PatternSyntaxError> {
        let mut inner = pair.into_inner();
        let op_pair = self.next(&mut inner)?;
        let relation = self.rel_op(op_pair)?;

        let target_pair = self.next(&mut inner)?;
        let target = match target_pair.as_rule() {
            Rule::node_expr => self.node_expr(target_pair)?,
            _ => self.node_description(target_pair)?,
        };

        Ok(Condition::Relation {
            relation,
            target: Box::new(target),
        })
    }

    fn rel_op(&mut self, pair: Pair<'_, Rule>) -> Result<Relation, PatternSyntaxError> {
        let op = self.next(&mut pair.into_inner())?;
        match op.as_rule() {
            Rule::chain_op => {
                let mut inner = op.clone().into_inner();
                let dir = self.next(&mut inner)?;
                let (via, capture) = self.description(self.next(&mut inner)?)?;
                if capture.is_some() {
                    return Err(PatternSyntaxError::spanning(
                        &op,
                        "Names cannot be captured inside a dominance chain",
                    ));
                }
                Ok(match dir.as_str() {
                    "<+" => Relation::DominatesVia(Box::new(via)),
                    _ => Relation::DominatedByVia(Box::new(via)),
                })
            }
            Rule::nth_op => {
                let token = op.as_str();
                let n: i32 = token[1..].parse().map_err(|_| {
                    PatternSyntaxError::spanning(&op, "Child position out of range")
                })?;
                if n == 0 {
                    return Err(PatternSyntaxError::spanning(
                        &op,
                        "Child positions start at 1",
                    ));
                }
                Ok(if token.starts_with('<') {
                    Relation::NthChild(n)
                } else {
                    Relation::NthChildOf(n)
                })
            }
            _ => Relation::from_token(op.as_str())
                .ok_or_else(|| PatternSyntaxError::spanning(&op, "Unknown relation")),
        }
    }

    /// A description and its capture name, if any
    fn description(
        &mut self,
        pair: Pair<'_, Rule>,
    ) -> Result<(Description, Option<String>), PatternSyntaxError> {
        let mut description = Description::any();
        let mut capture = None;

        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::desc_negation => description.negated = true,
                Rule::label_test => description.test = self.label_test(part)?,
                Rule::predicate => {
                    let kind = self.next(&mut part.into_inner())?;
                    description.predicates.push(match kind.as_str() {
                        "leaf" => NodePredicate::Leaf,
                        "preterminal" => NodePredicate::Preterminal,
                        _ => NodePredicate::Root,
                    });
                }
                Rule::capture => {
                    if capture.is_some() {
                        return Err(PatternSyntaxError::spanning(
                            &part,
                            "Node is named more than once",
                        ));
                    }
                    let name = self.next(&mut part.into_inner())?;
                    capture = Some(name.as_str().to_string());
                }
                _ => {}
            }
        }

        Ok((description, capture))
    }

    fn label_test(&mut self, pair: Pair<'_, Rule>) -> Result<LabelTest, PatternSyntaxError> {
        let test = self.next(&mut pair.into_inner())?;
        match test.as_rule() {
            Rule::wildcard => Ok(LabelTest::Any),
            Rule::same_node => {
                let name = self.next(&mut test.clone().into_inner())?;
                Ok(LabelTest::SameNode(self.reference(&test, name.as_str())))
            }
            Rule::same_label => {
                let name = self.next(&mut test.clone().into_inner())?;
                Ok(LabelTest::SameLabel(self.reference(&test, name.as_str())))
            }
            _ => {
                let atoms = test
                    .into_inner()
                    .map(|atom| self.atom(atom))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(LabelTest::Alternatives(atoms))
            }
        }
    }

    fn atom(&mut self, pair: Pair<'_, Rule>) -> Result<Atom, PatternSyntaxError> {
        let atom = self.next(&mut pair.into_inner())?;
        match atom.as_rule() {
            Rule::regex => {
                let body = self.next(&mut atom.clone().into_inner())?;
                let source = body.as_str().replace("\\/", "/");
                let regex = Regex::new(&source).map_err(|e| {
                    PatternSyntaxError::spanning(&atom, format!("Invalid regex: {}", e))
                })?;
                Ok(Atom::Regex(source, regex))
            }
            Rule::category => {
                let label = self.next(&mut atom.into_inner())?;
                Ok(Atom::Category(self.label_text(label)?))
            }
            _ => Ok(Atom::Literal(self.label_text(atom)?)),
        }
    }

    /// Text of a bare or quoted label
    fn label_text(&self, pair: Pair<'_, Rule>) -> Result<String, PatternSyntaxError> {
        match pair.as_rule() {
            Rule::quoted => {
                let body = self.next(&mut pair.into_inner())?;
                Ok(body.as_str().replace("\\\"", "\"").replace("\\\\", "\\"))
            }
            _ => Ok(pair.as_str().to_string()),
        }
    }
}
