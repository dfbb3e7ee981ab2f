//! Treesurgeon: pattern matching and surgery on constituency trees
//!
//! Patterns describe nodes and the structural relations between them
//! (`NP < (NP=inner $ CC)`); surgery scripts name matched nodes and edit the
//! tree around them (`relabel inner NX`).
//!
//! ```
//! use treesurgeon::{Config, Tree, compile_pattern, compile_script, process};
//!
//! let mut tree: Tree = "(NP (NP (NNP John)) (CC and) (NP (NNP Mary)))".parse().unwrap();
//! let pattern = compile_pattern("NP < (NP=inner $ CC)").unwrap();
//! let script = compile_script("relabel inner NX", &pattern).unwrap();
//!
//! process(&mut tree, &pattern, &script, &Config::default());
//! assert_eq!(tree.to_string(), "(NP (NX (NNP John)) (CC and) (NX (NNP Mary)))");
//! ```

pub mod config; // Annotation characters and application limits
pub mod executor; // Applying surgery scripts to matches
pub mod index; // Per-tree label index and leaf spans
pub mod iterators; // Treebanks and match sets
pub mod operation; // Surgery operation AST
pub mod pattern; // Pattern AST
pub mod penn; // Bracketed tree reading and writing
pub mod query; // Pattern language compiler
pub mod relation; // Structural relations between nodes
pub mod script; // Surgery script compiler
pub mod searcher; // End-to-end search (index + VM)
pub mod tree; // Arena-backed trees
pub mod vm; // Backtracking matcher

// Re-exports for convenience
pub use config::Config;
pub use executor::{Diagnostic, Outcome, Report, apply, process, process_all};
pub use iterators::{MatchSet, Treebank};
pub use operation::{Operation, Script};
pub use pattern::Pattern;
pub use penn::{ParseError, PennReader, parse_tree};
pub use query::{PatternSyntaxError, compile_pattern, compile_pattern_with};
pub use script::{
    SurgeryError, SurgerySyntaxError, UnresolvedNodeError, compile_script, parse_script,
    read_pattern_file,
};
pub use searcher::{Match, MatchMode, Matcher, search, search_all, search_with};
pub use tree::{Label, NodeId, Tree};
