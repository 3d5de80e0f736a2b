//! Static checks over a parsed [`Specification`].
//!
//! Validation never touches a document. It walks the field tree depth-first
//! and reports every issue it finds, so a definition can be fixed in one pass.

use tracing::trace;

use crate::config::ScraperConfig;
use crate::expression::Expression;
use crate::issue::{IssueKind, ValidationIssue};
use crate::model::{Extraction, FieldBody, FieldSpec, Specification};
use crate::path::FieldPath;
use crate::selector::SelectorGuard;

/// Check `spec` against the structural rules and the configured limits.
///
/// An empty result means the definition is valid.
pub fn validate(spec: &Specification, config: &ScraperConfig) -> Vec<ValidationIssue> {
    let mut validator = Validator {
        config,
        guard: SelectorGuard::from_config(config),
        issues: Vec::new(),
        path: FieldPath::root(),
    };
    validator.fields(&spec.fields);
    trace!(issues = validator.issues.len(), "Validated scraper definition");
    validator.issues
}

struct Validator<'c> {
    config: &'c ScraperConfig,
    guard: SelectorGuard,
    issues: Vec<ValidationIssue>,
    path: FieldPath,
}

impl Validator<'_> {
    fn report(&mut self, kind: IssueKind) {
        self.issues.push(ValidationIssue::new(self.path.clone(), kind));
    }

    fn fields(&mut self, fields: &[FieldSpec]) {
        let mut seen: Vec<&str> = Vec::with_capacity(fields.len());
        for field in fields {
            if seen.contains(&field.name.as_str()) {
                self.report(IssueKind::DuplicateField {
                    name: field.name.clone(),
                });
                continue;
            }
            seen.push(&field.name);

            self.path.push_name(field.name.as_str());
            self.field(field);
            self.path.pop();
        }
    }

    fn field(&mut self, field: &FieldSpec) {
        if field.name.trim().is_empty() {
            self.report(IssueKind::Malformed {
                reason: "field names must not be empty".to_string(),
            });
        }

        let depth = self.path.depth();
        if depth > self.config.max_field_depth {
            self.report(IssueKind::NestingTooDeep {
                depth,
                max: self.config.max_field_depth,
            });
            return;
        }

        if let Some(selector) = &field.selector {
            if let Err(err) = self.guard.compile(selector) {
                self.issues.push(err.into_issue(self.path.clone()));
            }
        }

        self.modifiers(field);

        if field.default.is_some() && field.is_plural() {
            self.report(IssueKind::Malformed {
                reason: "default only applies to single fields".to_string(),
            });
        }

        match &field.body {
            FieldBody::Extract(Extraction::Eval { expression, .. }) => {
                if let Err(err) = Expression::compile(expression, self.config) {
                    self.issues.push(err.into_issue(self.path.clone()));
                }
            }
            FieldBody::Extract(Extraction::Attribute(name)) if name.trim().is_empty() => {
                self.report(IssueKind::Malformed {
                    reason: "attribute name must not be empty".to_string(),
                });
            }
            FieldBody::Extract(_) => {}
            FieldBody::Record(children) => {
                if children.is_empty() {
                    self.report(IssueKind::Malformed {
                        reason: "fields must declare at least one field".to_string(),
                    });
                }
                self.fields(children);
            }
        }
    }

    fn modifiers(&mut self, field: &FieldSpec) {
        let modifiers = &field.modifiers;
        if !field.is_plural() {
            for modifier in modifiers.present() {
                self.report(IssueKind::IrrelevantPluralModifier {
                    modifier: modifier.to_string(),
                });
            }
            return;
        }

        if let Some(limit) = modifiers.limit {
            if limit < 0 {
                self.report(IssueKind::InvalidPluralModifier {
                    modifier: "limit".to_string(),
                    reason: format!("must be zero or more, got {limit}"),
                });
            }
        }

        if modifiers.join.is_some() {
            let non_scalar = match &field.body {
                FieldBody::Record(_) => Some("nested records"),
                FieldBody::Extract(Extraction::Table) => Some("tables"),
                FieldBody::Extract(_) => None,
            };
            if let Some(what) = non_scalar {
                self.report(IssueKind::InvalidPluralModifier {
                    modifier: "join".to_string(),
                    reason: format!("cannot join {what}"),
                });
            }
        }
    }
}
