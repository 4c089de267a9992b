use regex::{Regex, RegexBuilder};

/// An ordered set of case-insensitive URL regexes
///
/// Order matters: [`PatternSet::first_match`] reports the earliest pattern
/// that matches, which is how "first match wins" rules are expressed.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    /// Compiles the given patterns in order
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| RegexBuilder::new(p.as_ref()).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Compiles `patterns`, or `defaults` when `patterns` is empty
    pub fn compile_or_default<S: AsRef<str>>(
        patterns: &[S],
        defaults: &[&str],
    ) -> Result<Self, regex::Error> {
        if patterns.is_empty() {
            Self::compile(defaults)
        } else {
            Self::compile(patterns)
        }
    }

    /// Index of the first pattern matching `candidate`
    pub fn first_match(&self, candidate: &str) -> Option<usize> {
        self.patterns.iter().position(|p| p.is_match(candidate))
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.first_match(candidate).is_some()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
