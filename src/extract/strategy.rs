//! Ordered fallback strategies for a single field
//!
//! Every strategy returns an explicit `Result`; the cascade tries them in
//! order and stops at the first success.

use super::ExtractionError;
use tracing::trace;

type Strategy<'a, T> = Box<dyn FnOnce() -> Result<T, ExtractionError> + 'a>;

/// A named, ordered list of strategies producing a `T`
pub struct Cascade<'a, T> {
    field: &'static str,
    strategies: Vec<(&'static str, Strategy<'a, T>)>,
}

impl<'a, T> Cascade<'a, T> {
    pub fn new(field: &'static str) -> Self {
        Self {
            field,
            strategies: Vec::new(),
        }
    }

    /// Appends a strategy; earlier strategies take priority
    pub fn then<F>(mut self, name: &'static str, strategy: F) -> Self
    where
        F: FnOnce() -> Result<T, ExtractionError> + 'a,
    {
        self.strategies.push((name, Box::new(strategy)));
        self
    }

    /// Runs strategies in order and returns the first success
    ///
    /// When every strategy fails the last failure is returned, or
    /// [`ExtractionError::NoSelectorMatched`] if the cascade is empty.
    pub fn run(self) -> Result<T, ExtractionError> {
        let field = self.field;
        let mut last_error = ExtractionError::NoSelectorMatched { field };

        for (name, strategy) in self.strategies {
            match strategy() {
                Ok(value) => {
                    trace!("{}: strategy '{}' succeeded", field, name);
                    return Ok(value);
                }
                Err(e) => {
                    trace!("{}: strategy '{}' failed: {}", field, name, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    /// Runs the cascade, falling back to `default` when every strategy fails
    pub fn run_or(self, default: T) -> T {
        self.run().unwrap_or(default)
    }
}

/// Wraps a possibly-empty string as a strategy result
pub fn non_empty(field: &'static str, value: String) -> Result<String, ExtractionError> {
    if value.is_empty() {
        Err(ExtractionError::NoSelectorMatched { field })
    } else {
        Ok(value)
    }
}

/// Accepts `value` only if it is longer than `min` characters
pub fn longer_than(
    field: &'static str,
    value: String,
    min: usize,
) -> Result<String, ExtractionError> {
    let len = value.chars().count();
    if len > min {
        Ok(value)
    } else {
        Err(ExtractionError::FieldTooShort { field, len, min })
    }
}
