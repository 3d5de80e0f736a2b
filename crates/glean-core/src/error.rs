use thiserror::Error;

use crate::issue::ValidationIssue;
use crate::path::FieldPath;

/// Failure while evaluating a scraper against one document.
///
/// Any of these aborts the current document; the scraper itself stays usable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// An expression failed while running.
    #[error("eval error at {path}: {reason} (expression: `{expression}`)")]
    Eval {
        reason: String,
        expression: String,
        path: FieldPath,
    },

    /// An expression could not be compiled.
    ///
    /// A built [`crate::Scraper`] never raises this: expressions are compiled
    /// while the definition is validated, where a failure is reported as an
    /// `eval_syntax` issue instead.
    #[error("eval syntax error at {path}: {reason} (expression: `{expression}`)")]
    EvalSyntax {
        reason: String,
        expression: String,
        path: FieldPath,
    },

    /// An expression returned a value of the wrong type.
    #[error("eval type error at {path}: expected {expected}, got {got} (expression: `{expression}`)")]
    EvalType {
        expected: String,
        got: String,
        expression: String,
        path: FieldPath,
    },

    /// An expression returned null where a value was required.
    #[error("eval returned null at {path} (expression: `{expression}`)")]
    EvalNone { expression: String, path: FieldPath },

    /// A table extraction landed on something other than a `<table>`.
    #[error("not a table at {path}: found <{tag}>")]
    NotATable { tag: String, path: FieldPath },

    #[error("invalid CSS selector '{selector}' at {path}: {reason}")]
    InvalidCssSelector {
        selector: String,
        reason: String,
        path: FieldPath,
    },

    #[error("CSS selector '{selector}' at {path} is too complex ({complexity} > {max})")]
    CssSelectorTooComplex {
        selector: String,
        complexity: usize,
        max: usize,
        path: FieldPath,
    },
}

impl RuntimeError {
    /// Path of the field where evaluation failed.
    pub fn path(&self) -> &FieldPath {
        match self {
            RuntimeError::Eval { path, .. }
            | RuntimeError::EvalSyntax { path, .. }
            | RuntimeError::EvalType { path, .. }
            | RuntimeError::EvalNone { path, .. }
            | RuntimeError::NotATable { path, .. }
            | RuntimeError::InvalidCssSelector { path, .. }
            | RuntimeError::CssSelectorTooComplex { path, .. } => path,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            RuntimeError::Eval { reason, .. }
            | RuntimeError::EvalSyntax { reason, .. }
            | RuntimeError::InvalidCssSelector { reason, .. } => Some(reason),
            _ => None,
        }
    }

    pub fn expression(&self) -> Option<&str> {
        match self {
            RuntimeError::Eval { expression, .. }
            | RuntimeError::EvalSyntax { expression, .. }
            | RuntimeError::EvalType { expression, .. }
            | RuntimeError::EvalNone { expression, .. } => Some(expression),
            _ => None,
        }
    }
}

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// The scraper definition was rejected before touching any document.
    #[error("invalid scraper definition: {}", summarize(.0))]
    InvalidScraper(Vec<ValidationIssue>),

    /// Evaluation against a document failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// YAML definition could not be parsed.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml_ng::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// A scraper definition file could not be located.
    #[error("Load error: {0}")]
    LoadError(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

fn summarize(issues: &[ValidationIssue]) -> String {
    match issues {
        [] => "no issues reported".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
    }
}

impl ScrapeError {
    /// Returns true if the definition itself must be fixed; retrying won't help.
    pub fn is_specification_error(&self) -> bool {
        matches!(self, ScrapeError::InvalidScraper(_))
    }

    /// Returns true if only the current document failed and the caller may move
    /// on to the next one.
    pub fn aborts_document(&self) -> bool {
        matches!(self, ScrapeError::Runtime(_))
    }

    /// Validation issues carried by an `InvalidScraper` error.
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            ScrapeError::InvalidScraper(issues) => issues,
            _ => &[],
        }
    }
}

/// Result type alias for scraper operations.
pub type Result<T> = std::result::Result<T, ScrapeError>;
