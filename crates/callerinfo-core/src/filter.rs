//! Class-file path filtering

use crate::pattern::PatternError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Include/exclude lists of class-name regexes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassFilterSet {
    /// Patterns a class path must match
    pub includes: Vec<String>,
    /// Patterns that reject a class path
    pub excludes: Vec<String>,
}

impl ClassFilterSet {
    /// Filters from explicit lists
    pub fn new(includes: Vec<String>, excludes: Vec<String>) -> Self {
        Self { includes, excludes }
    }

    /// Compile into a [`ClassFilter`]
    pub fn compile(&self) -> Result<ClassFilter, PatternError> {
        Ok(ClassFilter {
            include: alternation(&self.includes)?,
            exclude: alternation(&self.excludes)?,
        })
    }
}

impl Default for ClassFilterSet {
    /// Everything included, nothing excluded
    fn default() -> Self {
        Self {
            includes: vec![".*".to_string()],
            excludes: Vec::new(),
        }
    }
}

/// Compiled path filter.
///
/// A path is selected when its full text matches `.*(inc1|inc2|...)\.class`
/// and does not match `.*(exc1|exc2|...)\.class`. No includes selects nothing.
#[derive(Debug, Clone)]
pub struct ClassFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl ClassFilter {
    /// Whether the class file at `path` should be rewritten
    pub fn select(&self, path: &Path) -> bool {
        let path = path.to_string_lossy();
        let Some(include) = &self.include else {
            return false;
        };
        include.is_match(&path) && !self.exclude.as_ref().is_some_and(|e| e.is_match(&path))
    }

    /// Whether no path can ever be selected
    pub fn selects_nothing(&self) -> bool {
        self.include.is_none()
    }
}

fn alternation(patterns: &[String]) -> Result<Option<Regex>, PatternError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let joined = patterns.join("|");
    Regex::new(&format!(r"^(?:.*({joined})\.class)$"))
        .map(Some)
        .map_err(|source| PatternError::InvalidRegex {
            pattern: joined,
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(includes: &[&str], excludes: &[&str]) -> ClassFilter {
        ClassFilterSet::new(
            includes.iter().map(|s| s.to_string()).collect(),
            excludes.iter().map(|s| s.to_string()).collect(),
        )
        .compile()
        .unwrap()
    }

    #[test]
    fn test_include_and_exclude() {
        let filter = filter(&["Excluded", "Included", "Included2"], &["Test", "Excluded"]);
        assert!(filter.select(Path::new("some/path/Included.class")));
        assert!(filter.select(Path::new("some/path/Included2.class")));
        assert!(!filter.select(Path::new("some/path/Excluded.class")));
        assert!(!filter.select(Path::new("some/path/Test.class")));
        assert!(!filter.select(Path::new("some/path/Some/Random/Class.class")));
    }

    #[test]
    fn test_empty_includes_select_nothing() {
        let filter = filter(&[], &[]);
        assert!(filter.selects_nothing());
        assert!(!filter.select(Path::new("some/path/Included.class")));
        assert!(!filter.select(Path::new("some/path/Some/Random/Class.class")));
    }

    #[test]
    fn test_empty_excludes() {
        let filter = filter(&["Included", "Included2"], &[]);
        assert!(filter.select(Path::new("some/path/Included.class")));
        assert!(filter.select(Path::new("some/path/Included2.class")));
        assert!(!filter.select(Path::new("some/path/Some/Random/Class.class")));
    }

    #[test]
    fn test_default_filters() {
        let filter = ClassFilterSet::default().compile().unwrap();
        assert!(filter.select(Path::new("some/path/Included.class")));
        assert!(filter.select(Path::new("some/path/Excluded.class")));
        assert!(filter.select(Path::new("some/path/Some/Random/Class.class")));
        assert!(!filter.select(Path::new("some/path/Included.java")));
    }

    #[test]
    fn test_invalid_pattern() {
        let result = ClassFilterSet::new(vec!["(".to_string()], Vec::new()).compile();
        assert!(matches!(result, Err(PatternError::InvalidRegex { .. })));
    }
}
