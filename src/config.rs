//! Configuration shared by the pattern compiler and the surgery driver

/// Characters that introduce functional tags and co-indices in Penn-style
/// labels (`NP-SBJ-1`, `NP=2`, `S|VP`)
pub const DEFAULT_ANNOTATION_CHARS: &[char] = &['-', '=', '|', '#', '^', '~', '_'];

/// Upper bound on script applications to a single tree
pub const DEFAULT_MAX_APPLICATIONS: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Used by basic-category tests (`@NP`) and the label helpers
    pub annotation_chars: Vec<char>,
    /// `process` stops applying a script to a tree after this many
    /// applications. Patterns that keep matching their own output would
    /// otherwise never terminate.
    pub max_applications: usize,
}

impl Config {
    pub fn new() -> Self {
        Self {
            annotation_chars: DEFAULT_ANNOTATION_CHARS.to_vec(),
            max_applications: DEFAULT_MAX_APPLICATIONS,
        }
    }

    pub fn with_annotation_chars(mut self, chars: &[char]) -> Self {
        self.annotation_chars = chars.to_vec();
        self
    }

    pub fn with_max_applications(mut self, limit: usize) -> Self {
        self.max_applications = limit;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
