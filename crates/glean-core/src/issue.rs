use std::fmt;

use serde::Serialize;

use crate::path::FieldPath;

/// What is wrong with a scraper definition, with the offending details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum IssueKind {
    /// Two or more keys collide once shorthand forms are resolved.
    Conflict { keys: Vec<String> },
    /// A field declares more than one extraction concern.
    MixedConcern { concerns: Vec<String> },
    /// A plural-only modifier is set on a single field.
    IrrelevantPluralModifier { modifier: String },
    /// A modifier value is outside its accepted domain.
    InvalidPluralModifier { modifier: String, reason: String },
    InvalidCssSelector { selector: String, reason: String },
    CssSelectorTooComplex {
        selector: String,
        complexity: usize,
        max: usize,
    },
    EvalSyntax { expression: String, reason: String },
    /// A table extraction also declares child fields.
    TableShape,
    UnknownKey { key: String },
    Malformed { reason: String },
    DuplicateField { name: String },
    NestingTooDeep { depth: usize, max: usize },
}

impl IssueKind {
    /// Stable snake_case identifier for this kind of issue.
    pub fn code(&self) -> &'static str {
        match self {
            IssueKind::Conflict { .. } => "conflict",
            IssueKind::MixedConcern { .. } => "mixed_concern",
            IssueKind::IrrelevantPluralModifier { .. } => "irrelevant_plural_modifier",
            IssueKind::InvalidPluralModifier { .. } => "invalid_plural_modifier",
            IssueKind::InvalidCssSelector { .. } => "invalid_css_selector",
            IssueKind::CssSelectorTooComplex { .. } => "css_selector_too_complex",
            IssueKind::EvalSyntax { .. } => "eval_syntax",
            IssueKind::TableShape => "table_shape",
            IssueKind::UnknownKey { .. } => "unknown_key",
            IssueKind::Malformed { .. } => "malformed",
            IssueKind::DuplicateField { .. } => "duplicate_field",
            IssueKind::NestingTooDeep { .. } => "nesting_too_deep",
        }
    }

    fn describe(&self) -> String {
        match self {
            IssueKind::Conflict { keys } => format!("conflicting keys: {}", keys.join(", ")),
            IssueKind::MixedConcern { concerns } => {
                format!("field mixes extraction concerns: {}", concerns.join(", "))
            }
            IssueKind::IrrelevantPluralModifier { modifier } => {
                format!("modifier '{modifier}' only applies to plural fields")
            }
            IssueKind::InvalidPluralModifier { modifier, reason } => {
                format!("invalid value for modifier '{modifier}': {reason}")
            }
            IssueKind::InvalidCssSelector { selector, reason } => {
                format!("invalid CSS selector '{selector}': {reason}")
            }
            IssueKind::CssSelectorTooComplex {
                selector,
                complexity,
                max,
            } => format!("CSS selector '{selector}' is too complex ({complexity} > {max})"),
            IssueKind::EvalSyntax { expression, reason } => {
                format!("syntax error in expression `{expression}`: {reason}")
            }
            IssueKind::TableShape => "table extraction cannot declare child fields".to_string(),
            IssueKind::UnknownKey { key } => format!("unknown key '{key}'"),
            IssueKind::Malformed { reason } => reason.clone(),
            IssueKind::DuplicateField { name } => format!("duplicate field name '{name}'"),
            IssueKind::NestingTooDeep { depth, max } => {
                format!("fields nested {depth} levels deep (max {max})")
            }
        }
    }
}

/// A single problem found in a scraper definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub path: FieldPath,
    #[serde(flatten)]
    pub kind: IssueKind,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: FieldPath, kind: IssueKind) -> Self {
        let message = kind.describe();
        Self {
            path,
            kind,
            message,
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] at {}: {}", self.code(), self.path, self.message)
    }
}
