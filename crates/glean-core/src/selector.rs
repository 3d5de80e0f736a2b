//! CSS selector guard.
//!
//! Every selector a scraper uses passes through [`SelectorGuard::compile`],
//! which first bounds its structural complexity and only then hands it to the
//! CSS parser. The complexity count is a single pass over the selector text,
//! so the check costs O(selector length) regardless of the documents the
//! selector will later run against.

use scraper::{ElementRef, Selector};
use thiserror::Error;

use crate::config::ScraperConfig;
use crate::error::RuntimeError;
use crate::issue::{IssueKind, ValidationIssue};
use crate::path::FieldPath;

/// Why a selector was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("invalid CSS selector '{selector}': {reason}")]
    Invalid { selector: String, reason: String },

    #[error("CSS selector '{selector}' is too complex ({complexity} > {max})")]
    TooComplex {
        selector: String,
        complexity: usize,
        max: usize,
    },
}

impl SelectorError {
    /// Report this failure as a definition issue at `path`.
    pub fn into_issue(self, path: FieldPath) -> ValidationIssue {
        let kind = match self {
            SelectorError::Invalid { selector, reason } => {
                IssueKind::InvalidCssSelector { selector, reason }
            }
            SelectorError::TooComplex {
                selector,
                complexity,
                max,
            } => IssueKind::CssSelectorTooComplex {
                selector,
                complexity,
                max,
            },
        };
        ValidationIssue::new(path, kind)
    }

    /// Report this failure as a runtime error at `path`.
    pub fn at(self, path: FieldPath) -> RuntimeError {
        match self {
            SelectorError::Invalid { selector, reason } => RuntimeError::InvalidCssSelector {
                selector,
                reason,
                path,
            },
            SelectorError::TooComplex {
                selector,
                complexity,
                max,
            } => RuntimeError::CssSelectorTooComplex {
                selector,
                complexity,
                max,
                path,
            },
        }
    }
}

/// Count combinator and clause tokens in a selector.
///
/// Counted: descendant whitespace, `>`, `+`, `~`, list commas, attribute
/// clauses and pseudo clauses (`::x` counts once). Quoted text and the inside
/// of attribute brackets are skipped.
pub fn complexity(selector: &str) -> usize {
    let mut count = 0;
    let mut chars = selector.chars();
    let mut quote: Option<char> = None;
    let mut bracket_depth = 0usize;
    let mut prev: Option<char> = None;
    let mut pending_space = false;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if c == '\\' {
                chars.next();
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\\' => {
                chars.next();
                prev = Some('\\');
                continue;
            }
            '"' | '\'' => {
                quote = Some(c);
                prev = Some(c);
                continue;
            }
            _ => {}
        }

        if bracket_depth > 0 {
            match c {
                '[' => bracket_depth += 1,
                ']' => bracket_depth -= 1,
                _ => {}
            }
            prev = Some(c);
            continue;
        }

        if c.is_whitespace() {
            pending_space = true;
            continue;
        }

        if pending_space {
            pending_space = false;
            let after_operator = matches!(prev, None | Some('>' | '+' | '~' | ',' | '('));
            let before_operator = matches!(c, '>' | '+' | '~' | ',' | ')');
            if !after_operator && !before_operator {
                count += 1;
            }
        }

        match c {
            '[' => {
                bracket_depth += 1;
                count += 1;
            }
            '>' | '+' | '~' | ',' => count += 1,
            ':' if prev != Some(':') => count += 1,
            _ => {}
        }
        prev = Some(c);
    }

    count
}

/// Compiles selectors under a fixed complexity budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorGuard {
    max_complexity: usize,
}

impl SelectorGuard {
    pub fn new(max_complexity: usize) -> Self {
        Self { max_complexity }
    }

    pub fn from_config(config: &ScraperConfig) -> Self {
        Self::new(config.max_selector_complexity)
    }

    pub fn max_complexity(&self) -> usize {
        self.max_complexity
    }

    /// Check the complexity budget without parsing.
    pub fn check(&self, selector: &str) -> Result<usize, SelectorError> {
        let complexity = complexity(selector);
        if complexity > self.max_complexity {
            return Err(SelectorError::TooComplex {
                selector: selector.to_string(),
                complexity,
                max: self.max_complexity,
            });
        }
        Ok(complexity)
    }

    /// Check the budget, then parse the selector into a reusable matcher.
    pub fn compile(&self, selector: &str) -> Result<CompiledSelector, SelectorError> {
        if selector.trim().is_empty() {
            return Err(SelectorError::Invalid {
                selector: selector.to_string(),
                reason: "selector is empty".to_string(),
            });
        }

        let complexity = self.check(selector)?;
        let inner = Selector::parse(selector).map_err(|e| SelectorError::Invalid {
            selector: selector.to_string(),
            reason: e.to_string(),
        })?;

        Ok(CompiledSelector {
            source: selector.to_string(),
            inner,
            complexity,
        })
    }
}

impl Default for SelectorGuard {
    fn default() -> Self {
        Self::from_config(&ScraperConfig::default())
    }
}

/// A parsed selector that passed the guard.
#[derive(Debug, Clone)]
pub struct CompiledSelector {
    source: String,
    inner: Selector,
    complexity: usize,
}

impl CompiledSelector {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn complexity(&self) -> usize {
        self.complexity
    }

    /// Descendants of `node` matching this selector, in document order.
    pub fn select<'a>(&self, node: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        node.select(&self.inner).collect()
    }

    pub fn select_first<'a>(&self, node: ElementRef<'a>) -> Option<ElementRef<'a>> {
        node.select(&self.inner).next()
    }
}
