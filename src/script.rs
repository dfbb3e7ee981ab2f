//! Surgery script compiler
//!
//! Parses surgery text into a [`Script`] using the pest grammar in
//! `surgery.pest`. [`compile_script`] also checks every name an operation
//! refers to against the paired pattern's captures and the names declared
//! by auxiliary trees of earlier operations.

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use regex::Regex;
use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::config::{Config, DEFAULT_ANNOTATION_CHARS};
use crate::operation::{
    AdjoinMode, AuxTree, Operand, Operation, Position, Relabel, ReplacementPart, Script,
};
use crate::pattern::Pattern;
use crate::query::{PatternSyntaxError, compile_pattern_with};

#[derive(Parser)]
#[grammar = "surgery.pest"]
struct SurgeryParser;

/// Malformed surgery text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Surgery syntax error at position {position}: {message} (near `{fragment}`)")]
pub struct SurgerySyntaxError {
    pub message: String,
    /// Byte offset into the script text
    pub position: usize,
    pub fragment: String,
}

/// A script refers to a name that is neither captured by the pattern nor
/// declared by an earlier operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unresolved node name '{name}' at position {position}")]
pub struct UnresolvedNodeError {
    pub name: String,
    pub position: usize,
}

/// Error type for script compilation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurgeryError {
    #[error(transparent)]
    Syntax(#[from] SurgerySyntaxError),

    #[error(transparent)]
    Unresolved(#[from] UnresolvedNodeError),

    #[error(transparent)]
    Pattern(#[from] PatternSyntaxError),
}

/// Compile a script for use with `pattern`
pub fn compile_script(text: &str, pattern: &Pattern) -> Result<Script, SurgeryError> {
    let known = pattern.capture_names().map(str::to_string).collect();
    let operations = Compiler::new(text, Some(known)).script()?;
    Ok(Script {
        source: text.to_string(),
        operations,
        annotation_chars: pattern.annotation_chars().to_vec(),
    })
}

/// Parse a script without checking names
pub fn parse_script(text: &str) -> Result<Script, SurgeryError> {
    let operations = Compiler::new(text, None).script()?;
    Ok(Script {
        source: text.to_string(),
        operations,
        annotation_chars: DEFAULT_ANNOTATION_CHARS.to_vec(),
    })
}

/// Read pattern/script pairs
///
/// Blocks of text are separated by blank lines and alternate between a
/// pattern and the script to run for it. Lines starting with `%` are
/// comments.
pub fn read_pattern_file(
    text: &str,
    config: &Config,
) -> Result<Vec<(Pattern, Script)>, SurgeryError> {
    let mut blocks: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('%') {
            continue;
        }
        if trimmed.is_empty() {
            if !current.is_empty() {
                blocks.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }

    let mut pairs = Vec::new();
    let mut blocks = blocks.into_iter();
    while let Some(pattern_text) = blocks.next() {
        let pattern = compile_pattern_with(&pattern_text, config)?;
        let Some(script_text) = blocks.next() else {
            return Err(SurgerySyntaxError {
                message: "Pattern has no operations".to_string(),
                position: 0,
                fragment: pattern_text,
            }
            .into());
        };
        let script = compile_script(&script_text, &pattern)?;
        pairs.push((pattern, script));
    }
    Ok(pairs)
}

struct Compiler<'a> {
    text: &'a str,
    /// Names an operation may refer to; `None` skips the check
    known: Option<FxHashSet<String>>,
}

impl<'a> Compiler<'a> {
    fn new(text: &'a str, known: Option<FxHashSet<String>>) -> Self {
        Self { text, known }
    }

    fn syntax_error(&self, pair: &Pair<'_, Rule>, message: impl Into<String>) -> SurgeryError {
        SurgerySyntaxError {
            message: message.into(),
            position: pair.as_span().start(),
            fragment: pair.as_str().to_string(),
        }
        .into()
    }

    fn next<'i>(
        &self,
        pairs: &mut impl Iterator<Item = Pair<'i, Rule>>,
    ) -> Result<Pair<'i, Rule>, SurgeryError> {
        pairs.next().ok_or_else(|| {
            SurgerySyntaxError {
                message: "Incomplete operation".to_string(),
                position: self.text.len(),
                fragment: String::new(),
            }
            .into()
        })
    }

    fn script(&mut self) -> Result<Vec<Operation>, SurgeryError> {
        let mut pairs = SurgeryParser::parse(Rule::script, self.text).map_err(|e| {
            let (position, end) = match e.location {
                pest::error::InputLocation::Pos(pos) => (pos, self.fragment_end(pos)),
                pest::error::InputLocation::Span(span) => span,
            };
            SurgerySyntaxError {
                message: e.variant.message().into_owned(),
                position,
                fragment: self.text[position..end].to_string(),
            }
        })?;
        let script = self.next(&mut pairs)?;

        let mut operations = Vec::new();
        for pair in script.into_inner() {
            if pair.as_rule() == Rule::operation {
                operations.push(self.operation(pair)?);
            }
        }
        Ok(operations)
    }

    /// End of the line starting at `pos`
    fn fragment_end(&self, pos: usize) -> usize {
        self.text[pos..]
            .find('\n')
            .map_or(self.text.len(), |offset| pos + offset)
    }

    /// Name used as a reference to an existing node
    fn reference(&self, pair: &Pair<'_, Rule>) -> Result<String, SurgeryError> {
        let name = pair.as_str().to_string();
        self.check_name(&name, pair.as_span().start())?;
        Ok(name)
    }

    fn check_name(&self, name: &str, position: usize) -> Result<(), SurgeryError> {
        match &self.known {
            Some(known) if !known.contains(name) => Err(UnresolvedNodeError {
                name: name.to_string(),
                position,
            }
            .into()),
            _ => Ok(()),
        }
    }

    fn operation(&mut self, pair: Pair<'_, Rule>) -> Result<Operation, SurgeryError> {
        let op = self.next(&mut pair.into_inner())?;
        let operation = match op.as_rule() {
            Rule::if_exists => {
                let mut inner = op.into_inner().skip(1).peekable();
                let negated = inner.next_if(|p| p.as_rule() == Rule::not_kw).is_some();
                let mut inner = inner.skip(1);
                let name = self.reference(&self.next(&mut inner)?)?;
                let operation = self.operation(self.next(&mut inner)?)?;
                // Names declared by the guarded operation are already known
                return Ok(Operation::IfExists {
                    name,
                    negated,
                    operation: Box::new(operation),
                });
            }
            Rule::delete | Rule::prune | Rule::coindex => {
                let rule = op.as_rule();
                let names = op
                    .into_inner()
                    .skip(1)
                    .map(|name| self.reference(&name))
                    .collect::<Result<Vec<_>, _>>()?;
                match rule {
                    Rule::delete => Operation::Delete(names),
                    Rule::prune => Operation::Prune(names),
                    _ => Operation::Coindex(names),
                }
            }
            Rule::excise => {
                let mut inner = op.into_inner().skip(1);
                let top = self.reference(&self.next(&mut inner)?)?;
                let bottom = self.reference(&self.next(&mut inner)?)?;
                Operation::Excise { top, bottom }
            }
            Rule::relabel => {
                let mut inner = op.into_inner().skip(1);
                let name = self.reference(&self.next(&mut inner)?)?;
                let relabel = self.new_label(self.next(&mut inner)?)?;
                Operation::Relabel { name, relabel }
            }
            Rule::insert => {
                let mut inner = op.into_inner().skip(1);
                let operand = self.operand(self.next(&mut inner)?)?;
                let position = self.position(self.next(&mut inner)?)?;
                Operation::Insert { operand, position }
            }
            Rule::move_node => {
                let mut inner = op.into_inner().skip(1);
                let name = self.reference(&self.next(&mut inner)?)?;
                let position = self.position(self.next(&mut inner)?)?;
                Operation::Move { name, position }
            }
            Rule::replace => {
                let mut inner = op.into_inner().skip(1);
                let name = self.reference(&self.next(&mut inner)?)?;
                let operands = inner
                    .map(|operand| self.operand(operand))
                    .collect::<Result<Vec<_>, _>>()?;
                Operation::Replace { name, operands }
            }
            Rule::adjoin => {
                let mut inner = op.into_inner();
                let keyword = self.next(&mut inner)?;
                let mode = match keyword.as_str() {
                    "adjoinH" => AdjoinMode::Head,
                    "adjoinF" => AdjoinMode::Foot,
                    _ => AdjoinMode::Root,
                };
                let aux = self.aux_tree(self.next(&mut inner)?, true)?;
                let target = self.reference(&self.next(&mut inner)?)?;
                Operation::Adjoin { mode, aux, target }
            }
            Rule::create_subtree => {
                let mut inner = op.into_inner().skip(1);
                let aux = self.aux_tree(self.next(&mut inner)?, true)?;
                let start = self.reference(&self.next(&mut inner)?)?;
                let end = inner.next().map(|end| self.reference(&end)).transpose()?;
                Operation::CreateSubtree { aux, start, end }
            }
            _ => return Err(self.syntax_error(&op, "Unknown operation")),
        };

        if let Some(known) = &mut self.known {
            known.extend(operation.declared_names().into_iter().map(str::to_string));
        }
        Ok(operation)
    }

    fn operand(&self, pair: Pair<'_, Rule>) -> Result<Operand, SurgeryError> {
        let inner = self.next(&mut pair.into_inner())?;
        match inner.as_rule() {
            Rule::aux_tree => Ok(Operand::Hold(self.aux_tree(inner, false)?)),
            _ => Ok(Operand::Fetch(self.reference(&inner)?)),
        }
    }

    fn position(&self, pair: Pair<'_, Rule>) -> Result<Position, SurgeryError> {
        let mut inner = pair.into_inner();
        let op = self.next(&mut inner)?;
        let anchor = self.reference(&self.next(&mut inner)?)?;
        match op.as_str() {
            "$+" => Ok(Position::LeftSister(anchor)),
            "$-" => Ok(Position::RightSister(anchor)),
            token => {
                let index: i32 = token[1..]
                    .parse()
                    .map_err(|_| self.syntax_error(&op, "Child position out of range"))?;
                if index == 0 {
                    return Err(self.syntax_error(&op, "Child positions start at 1"));
                }
                Ok(Position::Child {
                    parent: anchor,
                    index,
                })
            }
        }
    }

    /// Parse a template; placeholders must name known nodes
    fn aux_tree(&self, pair: Pair<'_, Rule>, needs_foot: bool) -> Result<AuxTree, SurgeryError> {
        let start = pair.as_span().start();
        let aux = AuxTree::parse(pair.as_str()).map_err(|mut e| {
            e.position += start;
            e
        })?;
        if needs_foot && aux.foot().is_none() {
            return Err(self.syntax_error(&pair, "Auxiliary tree needs a foot (a leaf marked with @)"));
        }
        for name in aux.placeholder_names() {
            self.check_name(name, start)?;
        }
        Ok(aux)
    }

    fn new_label(&self, pair: Pair<'_, Rule>) -> Result<Relabel, SurgeryError> {
        let label = self.next(&mut pair.into_inner())?;
        match label.as_rule() {
            Rule::relabel_regex => {
                let mut inner = label.clone().into_inner();
                let body = self.next(&mut inner)?;
                let replacement = self.next(&mut inner)?;

                let source = body.as_str().replace("\\/", "/");
                let regex = Regex::new(&source)
                    .map_err(|e| self.syntax_error(&body, format!("Invalid regex: {}", e)))?;
                let parts = ReplacementPart::parse_all(replacement.as_str())
                    .map_err(|message| self.syntax_error(&replacement, message))?;
                for part in &parts {
                    if let ReplacementPart::NodeLabel(name) = part {
                        self.check_name(name, replacement.as_span().start())?;
                    }
                }
                Ok(Relabel::Regex {
                    source,
                    regex,
                    replacement: parts,
                })
            }
            Rule::quoted => {
                let body = self.next(&mut label.into_inner())?;
                Ok(Relabel::Literal(
                    body.as_str().replace("\\\"", "\"").replace("\\\\", "\\"),
                ))
            }
            _ => Ok(Relabel::Literal(label.as_str().to_string())),
        }
    }
}
