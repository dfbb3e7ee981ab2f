//! Iterators for trees and matches
//!
//! Provides collection interfaces for:
//! - Iterating over bracketed trees from a string, a file, or several files
//! - Searching a pattern across all of those trees
//!
//! Files that cannot be opened and trees that do not parse are logged and
//! skipped.

use crate::pattern::Pattern;
use crate::penn::PennReader;
use crate::searcher::{Match, MatchMode, search_with};
use crate::tree::Tree;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Source of trees for a collection
#[derive(Debug, Clone)]
enum TreeSource {
    /// In-memory bracketed text
    String(String),
    /// Single file path
    File(PathBuf),
    /// Multiple file paths, read in order
    Files(Vec<PathBuf>),
}

/// Collection of trees from a string, a file, or a list of files
///
/// Gzipped files (`.gz`) are decompressed on the fly.
///
/// # Examples
///
/// ```no_run
/// use treesurgeon::Treebank;
///
/// for tree in Treebank::from_file("wsj_0001.mrg") {
///     println!("{}", tree);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Treebank {
    source: TreeSource,
}

impl Treebank {
    /// Create from in-memory bracketed text
    pub fn from_string(text: &str) -> Self {
        Self {
            source: TreeSource::String(text.to_string()),
        }
    }

    /// Create from a single file path
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        Self {
            source: TreeSource::File(path.as_ref().to_path_buf()),
        }
    }

    /// Create from explicit file paths
    pub fn from_paths(file_paths: Vec<PathBuf>) -> Self {
        Self {
            source: TreeSource::Files(file_paths),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = Arc<Tree>>> {
        self.clone().into_iter()
    }
}

impl IntoIterator for Treebank {
    type Item = Arc<Tree>;
    type IntoIter = Box<dyn Iterator<Item = Self::Item>>;

    fn into_iter(self) -> Self::IntoIter {
        match self.source {
            TreeSource::String(text) => Box::new(
                PennReader::from_str(&text)
                    .filter_map(|result| skip_bad_tree(result, "<string>"))
                    .map(Arc::new),
            ),
            TreeSource::File(path) => open_file_trees(path),
            TreeSource::Files(paths) => Box::new(paths.into_iter().flat_map(open_file_trees)),
        }
    }
}

/// Collection of matches of one pattern across a [`Treebank`]
///
/// # Examples
///
/// ```no_run
/// use treesurgeon::{MatchSet, Treebank, compile_pattern};
///
/// let pattern = compile_pattern("NP < (NP=inner $ CC)").unwrap();
/// let treebank = Treebank::from_file("wsj_0001.mrg");
/// for (tree, m) in MatchSet::new(&treebank, &pattern) {
///     println!("{}", tree.subtree(m.node("inner").unwrap()));
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MatchSet {
    tree_bank: Treebank,
    pattern: Pattern,
    mode: MatchMode,
}

impl MatchSet {
    /// Create from a Treebank and pattern, one match per match root
    pub fn new(tree_bank: &Treebank, pattern: &Pattern) -> Self {
        Self {
            tree_bank: tree_bank.clone(),
            pattern: pattern.clone(),
            mode: MatchMode::default(),
        }
    }

    /// Report every distinct binding instead of one match per root
    pub fn all_bindings(mut self) -> Self {
        self.mode = MatchMode::AllBindings;
        self
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = (Arc<Tree>, Match)>> {
        self.clone().into_iter()
    }
}

impl IntoIterator for MatchSet {
    type Item = (Arc<Tree>, Match);
    type IntoIter = Box<dyn Iterator<Item = Self::Item>>;

    fn into_iter(self) -> Self::IntoIter {
        let pattern = self.pattern;
        let mode = self.mode;
        let iter = self.tree_bank.into_iter().flat_map(move |tree| {
            let matches: Vec<Match> = search_with(&pattern, &tree, mode).collect();
            matches.into_iter().map(move |m| (Arc::clone(&tree), m))
        });
        Box::new(iter)
    }
}

fn skip_bad_tree(
    result: Result<Tree, crate::penn::ParseError>,
    source: &str,
) -> Option<Tree> {
    match result {
        Ok(tree) => Some(tree),
        Err(e) => {
            warn!(source, error = %e, "skipping unparsable tree");
            None
        }
    }
}

/// Open a file and return an iterator over its trees; an unreadable file
/// yields nothing
fn open_file_trees(path: PathBuf) -> Box<dyn Iterator<Item = Arc<Tree>>> {
    match PennReader::from_file(&path) {
        Ok(reader) => {
            let source = path.display().to_string();
            Box::new(
                reader
                    .filter_map(move |result| skip_bad_tree(result, &source))
                    .map(Arc::new),
            )
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to open treebank file");
            Box::new(std::iter::empty())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::compile_pattern;

    const TWO_TREES: &str = "(S (NP (DT The) (NN dog)) (VP (VBZ runs)))\n\
                             (S (NP (NNS Cats)) (VP (VBP sleep)))\n";

    #[test]
    fn test_treebank_from_string() {
        let trees: Vec<_> = Treebank::from_string(TWO_TREES).into_iter().collect();

        assert_eq!(trees.len(), 2);
        assert_eq!(trees[0].leaves().count(), 3);
        assert_eq!(trees[1].leaves().count(), 2);
    }

    #[test]
    fn test_treebank_skips_bad_trees() {
        let text = "junk\n(S (VP (VBZ runs)))\n";
        let trees: Vec<_> = Treebank::from_string(text).into_iter().collect();

        assert_eq!(trees.len(), 1);
    }

    #[test]
    fn test_match_set_from_string() {
        let pattern = compile_pattern("/^VB/").unwrap();
        let treebank = Treebank::from_string(TWO_TREES);
        let matches: Vec<_> = MatchSet::new(&treebank, &pattern).into_iter().collect();

        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn test_match_set_modes() {
        let text = "(NP (NP (NNP John)) (CC and) (NP (NNP Mary)))";
        let pattern = compile_pattern("NP < (NP=inner $ CC)").unwrap();
        let treebank = Treebank::from_string(text);

        let first: Vec<_> = MatchSet::new(&treebank, &pattern).into_iter().collect();
        assert_eq!(first.len(), 1);

        let all: Vec<_> = MatchSet::new(&treebank, &pattern)
            .all_bindings()
            .into_iter()
            .collect();
        assert_eq!(all.len(), 2);
        let (tree, m) = &all[1];
        assert_eq!(tree.subtree(m.node("inner").unwrap()).to_string(), "(NP (NNP Mary))");
    }

    #[test]
    fn test_match_set_no_matches() {
        let pattern = compile_pattern("FRAG").unwrap();
        let treebank = Treebank::from_string(TWO_TREES);

        assert_eq!(MatchSet::new(&treebank, &pattern).iter().count(), 0);
    }

    mod file_tests {
        use super::*;
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;
        use tempfile::TempDir;

        fn create_test_files(files: &[(&str, &str)]) -> (TempDir, Vec<PathBuf>) {
            let dir = TempDir::new().unwrap();
            let mut paths = Vec::new();

            for (name, content) in files {
                let path = dir.path().join(name);
                std::fs::write(&path, content).unwrap();
                paths.push(path);
            }

            (dir, paths)
        }

        #[test]
        fn test_treebank_from_paths() {
            let (_dir, paths) = create_test_files(&[
                ("file1.mrg", "(S (NP (DT The) (NN dog)) (VP (VBZ runs)))\n"),
                ("file2.mrg", "(S (NP (NNS Cats)) (VP (VBP sleep)))\n"),
            ]);

            let results: Vec<_> = Treebank::from_paths(paths).into_iter().collect();

            assert_eq!(results.len(), 2);
            assert_eq!(results[0].leaves().count(), 3);
            assert_eq!(results[1].leaves().count(), 2);
        }

        #[test]
        fn test_treebank_from_gzip_file() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("trees.mrg.gz");
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(TWO_TREES.as_bytes()).unwrap();
            std::fs::write(&path, encoder.finish().unwrap()).unwrap();

            let results: Vec<_> = Treebank::from_file(&path).into_iter().collect();

            assert_eq!(results.len(), 2);
        }

        #[test]
        fn test_match_set_from_paths() {
            let (_dir, paths) = create_test_files(&[
                ("a.mrg", "(S (VP (VBZ runs)))\n"),
                ("b.mrg", "(S (VP (VBZ sleeps)))\n"),
            ]);

            let pattern = compile_pattern("VP < VBZ").unwrap();
            let treebank = Treebank::from_paths(paths);
            let results: Vec<_> = MatchSet::new(&treebank, &pattern).into_iter().collect();

            assert_eq!(results.len(), 2);
        }

        #[test]
        fn test_skips_bad_files() {
            let (dir, mut paths) = create_test_files(&[("good.mrg", "(S (VP (VBZ runs)))\n")]);

            let good_file = paths[0].clone();
            let bad_file = dir.path().join("nonexistent.mrg");
            paths = vec![good_file.clone(), bad_file, good_file];

            let results: Vec<_> = Treebank::from_paths(paths).into_iter().collect();

            assert_eq!(results.len(), 2);
        }
    }
}
