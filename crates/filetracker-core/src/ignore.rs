//! Suffix-based ignore rules for editor, lock and temp artifacts.

use std::path::Path;

/// Suffixes excluded from baseline construction and change detection.
pub const DEFAULT_IGNORE_SUFFIXES: &[&str] = &[".swp", ".tmp", ".bak", "~", ".lock"];

/// Immutable set of lower-cased suffixes matched against the full path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreRules {
    suffixes: Vec<String>,
}

impl IgnoreRules {
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            suffixes: suffixes
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn should_ignore(&self, path: &Path) -> bool {
        let lower = path.to_string_lossy().to_lowercase();
        self.suffixes.iter().any(|suffix| lower.ends_with(suffix.as_str()))
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORE_SUFFIXES)
    }
}
