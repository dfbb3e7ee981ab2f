//! Bracketed (Penn Treebank style) tree notation
//!
//! Reads trees such as `(S (NP (NNP John)) (VP (VBZ runs)))` into [`Tree`]s
//! and writes them back. Writing normalizes whitespace to a single space
//! between constituents; apart from that, parsing and re-serializing a
//! tree reproduces the input text. An empty root label is kept, so
//! `( (S ...))` round-trips too. A bracket with a label but no children
//! (`(NP)`) is read as a leaf and written back as `NP`. The empty tree is
//! written as `()` and `()` reads back as the empty tree.
//!
//! Files ending in `.gz` are decompressed transparently.

use crate::tree::{NodeId, Tree};
use flate2::read::MultiGzDecoder;
use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Lines};
use std::path::Path;
use std::str::FromStr;

/// Error while reading bracketed trees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line_num: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parse error at line {}: {}", self.line_num, self.message)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Open,
    Close,
    Atom(&'a str),
}

/// Split text into brackets and atoms, keeping byte offsets
fn tokenize(text: &str) -> Vec<(usize, Token<'_>)> {
    let mut tokens = Vec::new();
    let mut atom_start = None;

    for (pos, c) in text.char_indices() {
        if c == '(' || c == ')' || c.is_whitespace() {
            if let Some(start) = atom_start.take() {
                tokens.push((start, Token::Atom(&text[start..pos])));
            }
            match c {
                '(' => tokens.push((pos, Token::Open)),
                ')' => tokens.push((pos, Token::Close)),
                _ => {}
            }
        } else if atom_start.is_none() {
            atom_start = Some(pos);
        }
    }
    if let Some(start) = atom_start {
        tokens.push((start, Token::Atom(&text[start..])));
    }

    tokens
}

fn line_of(text: &str, offset: usize) -> usize {
    text[..offset].matches('\n').count() + 1
}

/// Parse exactly one tree
pub fn parse_tree(text: &str) -> Result<Tree, ParseError> {
    let error = |offset: usize, message: String| ParseError {
        line_num: line_of(text, offset),
        message,
    };

    let mut tree = Tree::empty();
    let mut stack: Vec<NodeId> = Vec::new();
    let mut expect_label = false;

    for (offset, token) in tokenize(text) {
        if stack.is_empty() && !tree.is_empty() {
            return Err(error(offset, "Unexpected text after the end of the tree".to_string()));
        }
        match token {
            Token::Open => {
                let node = tree.add_node("");
                match stack.last() {
                    Some(&parent) => {
                        tree.push_child(parent, node);
                    }
                    None => tree.set_root(Some(node)),
                }
                stack.push(node);
                expect_label = true;
            }
            Token::Atom(atom) => match stack.last() {
                Some(&parent) if expect_label => {
                    tree.set_label(parent, atom);
                    expect_label = false;
                }
                Some(&parent) => {
                    let leaf = tree.add_node(atom);
                    tree.push_child(parent, leaf);
                }
                None => {
                    let leaf = tree.add_node(atom);
                    tree.set_root(Some(leaf));
                }
            },
            Token::Close => {
                expect_label = false;
                if stack.pop().is_none() {
                    return Err(error(offset, "Unbalanced ')'".to_string()));
                }
            }
        }
    }

    if !stack.is_empty() {
        return Err(error(text.len(), format!("{} unclosed '('", stack.len())));
    }
    let Some(root) = tree.root() else {
        return Err(error(text.len(), "No tree found".to_string()));
    };
    if tree.is_leaf(root) && tree.label(root).as_str().is_empty() {
        return Ok(Tree::empty());
    }

    Ok(tree)
}

impl FromStr for Tree {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_tree(s)
    }
}

/// Display adapter for one subtree
pub struct Subtree<'a> {
    tree: &'a Tree,
    id: NodeId,
}

impl Tree {
    /// Bracketed rendering of the subtree rooted at `id`
    pub fn subtree(&self, id: NodeId) -> Subtree<'_> {
        Subtree { tree: self, id }
    }
}

fn write_node(tree: &Tree, id: NodeId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = tree.label(id);
    if tree.is_leaf(id) {
        return write!(f, "{}", label);
    }
    write!(f, "({}", label)?;
    for &child in tree.children(id) {
        f.write_str(" ")?;
        write_node(tree, child, f)?;
    }
    f.write_str(")")
}

impl fmt::Display for Subtree<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_node(self.tree, self.id, f)
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root() {
            Some(root) => write_node(self, root, f),
            None => f.write_str("()"),
        }
    }
}

/// Reader over a stream of bracketed trees
///
/// Trees may span several lines, and several trees may share a line.
pub struct PennReader<R: BufRead> {
    lines: Lines<R>,
    line_num: usize,
    pending: String,
    pending_line: usize,
    depth: usize,
    ready: VecDeque<(usize, String)>,
}

impl PennReader<Box<dyn BufRead>> {
    /// Create a reader from a file path, decompressing `.gz` files
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path)?;
        let reader: Box<dyn BufRead> = if path.extension().is_some_and(|ext| ext == "gz") {
            Box::new(BufReader::new(MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        Ok(Self::new(reader))
    }
}

impl PennReader<Cursor<String>> {
    /// Create a reader from a string
    pub fn from_str(text: &str) -> Self {
        Self::new(Cursor::new(text.to_string()))
    }
}

impl<R: BufRead> PennReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_num: 0,
            pending: String::new(),
            pending_line: 0,
            depth: 0,
            ready: VecDeque::new(),
        }
    }

    /// Split one line into complete trees, carrying partial ones over
    fn scan_line(&mut self, line: &str) -> Result<(), ParseError> {
        for c in line.chars() {
            if self.depth == 0 {
                match c {
                    '(' => {
                        self.pending_line = self.line_num;
                    }
                    c if c.is_whitespace() => continue,
                    _ => {
                        return Err(ParseError {
                            line_num: self.line_num,
                            message: format!("Unexpected '{}' outside brackets", c),
                        });
                    }
                }
            }

            self.pending.push(c);
            match c {
                '(' => self.depth += 1,
                ')' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        let text = std::mem::take(&mut self.pending);
                        self.ready.push_back((self.pending_line, text));
                    }
                }
                _ => {}
            }
        }
        if self.depth > 0 {
            self.pending.push('\n');
        }
        Ok(())
    }
}

impl<R: BufRead> Iterator for PennReader<R> {
    type Item = Result<Tree, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((first_line, text)) = self.ready.pop_front() {
                return Some(parse_tree(&text).map_err(|e| ParseError {
                    line_num: first_line + e.line_num - 1,
                    message: e.message,
                }));
            }

            self.line_num += 1;
            match self.lines.next() {
                None => {
                    if self.pending.trim().is_empty() {
                        return None;
                    }
                    self.pending.clear();
                    self.depth = 0;
                    return Some(Err(ParseError {
                        line_num: self.pending_line,
                        message: "Unclosed tree at end of input".to_string(),
                    }));
                }
                Some(Err(e)) => {
                    return Some(Err(ParseError {
                        line_num: self.line_num,
                        message: format!("IO error: {}", e),
                    }));
                }
                Some(Ok(line)) => {
                    if let Err(e) = self.scan_line(&line) {
                        self.pending.clear();
                        self.depth = 0;
                        return Some(Err(e));
                    }
                }
            }
        }
    }
}
