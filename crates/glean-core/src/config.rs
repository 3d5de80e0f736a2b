//! Limits applied when compiling and running scraper definitions.
//!
//! # Example
//!
//! ```rust
//! use glean_core::config::ScraperConfig;
//!
//! let config = ScraperConfig::default()
//!     .with_max_selector_complexity(16)
//!     .with_max_expression_depth(8);
//! assert_eq!(config.max_selector_complexity, 16);
//! ```

use crate::error::ScrapeError;

pub const DEFAULT_MAX_SELECTOR_COMPLEXITY: usize = 32;
pub const DEFAULT_MAX_EXPRESSION_DEPTH: usize = 32;
pub const DEFAULT_MAX_FIELD_DEPTH: usize = 32;

/// Limits for scraper compilation and evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScraperConfig {
    /// Maximum number of combinator and clause tokens in one CSS selector.
    pub max_selector_complexity: usize,

    /// Maximum nesting depth of an eval expression's syntax tree.
    pub max_expression_depth: usize,

    /// Maximum nesting depth of fields inside a definition.
    pub max_field_depth: usize,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_selector_complexity: DEFAULT_MAX_SELECTOR_COMPLEXITY,
            max_expression_depth: DEFAULT_MAX_EXPRESSION_DEPTH,
            max_field_depth: DEFAULT_MAX_FIELD_DEPTH,
        }
    }
}

impl ScraperConfig {
    pub fn with_max_selector_complexity(mut self, max: usize) -> Self {
        self.max_selector_complexity = max;
        self
    }

    pub fn with_max_expression_depth(mut self, max: usize) -> Self {
        self.max_expression_depth = max;
        self
    }

    pub fn with_max_field_depth(mut self, max: usize) -> Self {
        self.max_field_depth = max;
        self
    }

    /// Read configuration from environment variables.
    ///
    /// - `GLEAN_MAX_SELECTOR_COMPLEXITY` (optional, defaults to 32)
    /// - `GLEAN_MAX_EXPRESSION_DEPTH` (optional, defaults to 32)
    /// - `GLEAN_MAX_FIELD_DEPTH` (optional, defaults to 32)
    pub fn from_env() -> Result<Self, ScrapeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ScrapeError> {
        let read = |key: &str, default: usize| -> Result<usize, ScrapeError> {
            match lookup(key) {
                None => Ok(default),
                Some(raw) => {
                    let parsed: usize = raw.trim().parse().map_err(|_| {
                        ScrapeError::ConfigError(format!(
                            "Invalid {key} '{raw}': must be a positive integer"
                        ))
                    })?;
                    if parsed == 0 {
                        return Err(ScrapeError::ConfigError(format!(
                            "{key} must be at least 1"
                        )));
                    }
                    Ok(parsed)
                }
            }
        };

        Ok(Self {
            max_selector_complexity: read(
                "GLEAN_MAX_SELECTOR_COMPLEXITY",
                DEFAULT_MAX_SELECTOR_COMPLEXITY,
            )?,
            max_expression_depth: read("GLEAN_MAX_EXPRESSION_DEPTH", DEFAULT_MAX_EXPRESSION_DEPTH)?,
            max_field_depth: read("GLEAN_MAX_FIELD_DEPTH", DEFAULT_MAX_FIELD_DEPTH)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ScraperConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ScraperConfig::default());
    }

    #[test]
    fn test_reads_overrides() {
        let config = ScraperConfig::from_lookup(lookup(&[
            ("GLEAN_MAX_SELECTOR_COMPLEXITY", "8"),
            ("GLEAN_MAX_FIELD_DEPTH", " 4 "),
        ]))
        .unwrap();
        assert_eq!(config.max_selector_complexity, 8);
        assert_eq!(config.max_field_depth, 4);
        assert_eq!(config.max_expression_depth, DEFAULT_MAX_EXPRESSION_DEPTH);
    }

    #[test]
    fn test_rejects_zero_and_garbage() {
        let err = ScraperConfig::from_lookup(lookup(&[("GLEAN_MAX_EXPRESSION_DEPTH", "0")]))
            .unwrap_err();
        assert!(matches!(err, ScrapeError::ConfigError(_)));

        let err = ScraperConfig::from_lookup(lookup(&[("GLEAN_MAX_FIELD_DEPTH", "deep")]))
            .unwrap_err();
        assert!(err.to_string().contains("GLEAN_MAX_FIELD_DEPTH"));
    }
}
