//! Compiled field tree and the evaluator that walks it over a document.

use std::collections::HashSet;

use scraper::ElementRef;

use crate::config::ScraperConfig;
use crate::document;
use crate::error::RuntimeError;
use crate::expression::Expression;
use crate::issue::ValidationIssue;
use crate::model::{Cardinality, Extraction, FieldBody, FieldSpec, Modifiers, ValueType};
use crate::path::FieldPath;
use crate::sandbox::Scope;
use crate::selector::{CompiledSelector, SelectorGuard};
use crate::value::{ExtractedValue, Record, Scalar};

/// A field with its selector and expression already compiled.
#[derive(Debug, Clone)]
pub(crate) struct CompiledField {
    name: String,
    selector: Option<CompiledSelector>,
    cardinality: Cardinality,
    modifiers: Modifiers,
    default: Option<Scalar>,
    body: CompiledBody,
}

#[derive(Debug, Clone)]
enum CompiledBody {
    Text,
    Html,
    OuterHtml,
    Attribute(String),
    Eval {
        expression: Expression,
        expected: Option<ValueType>,
    },
    Table,
    Record(Vec<CompiledField>),
}

/// Compile a field tree. Run after validation; any failure is still reported
/// as an issue rather than assumed away.
pub(crate) fn compile_fields(
    fields: &[FieldSpec],
    guard: &SelectorGuard,
    config: &ScraperConfig,
) -> Result<Vec<CompiledField>, Vec<ValidationIssue>> {
    let mut issues = Vec::new();
    let mut path = FieldPath::root();
    let compiled = compile_level(fields, guard, config, &mut path, &mut issues);
    if issues.is_empty() {
        Ok(compiled)
    } else {
        Err(issues)
    }
}

fn compile_level(
    fields: &[FieldSpec],
    guard: &SelectorGuard,
    config: &ScraperConfig,
    path: &mut FieldPath,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<CompiledField> {
    let mut compiled = Vec::with_capacity(fields.len());
    for field in fields {
        path.push_name(field.name.as_str());

        let selector = match field.selector.as_deref().map(|s| guard.compile(s)) {
            Some(Ok(selector)) => Some(selector),
            Some(Err(err)) => {
                issues.push(err.into_issue(path.clone()));
                None
            }
            None => None,
        };

        let body = match &field.body {
            FieldBody::Extract(Extraction::Text) => Some(CompiledBody::Text),
            FieldBody::Extract(Extraction::Html) => Some(CompiledBody::Html),
            FieldBody::Extract(Extraction::OuterHtml) => Some(CompiledBody::OuterHtml),
            FieldBody::Extract(Extraction::Attribute(name)) => {
                Some(CompiledBody::Attribute(name.clone()))
            }
            FieldBody::Extract(Extraction::Table) => Some(CompiledBody::Table),
            FieldBody::Extract(Extraction::Eval {
                expression,
                expected,
            }) => match Expression::compile(expression, config) {
                Ok(expression) => Some(CompiledBody::Eval {
                    expression,
                    expected: *expected,
                }),
                Err(err) => {
                    issues.push(err.into_issue(path.clone()));
                    None
                }
            },
            FieldBody::Record(children) => Some(CompiledBody::Record(compile_level(
                children, guard, config, path, issues,
            ))),
        };

        if let Some(body) = body {
            compiled.push(CompiledField {
                name: field.name.clone(),
                selector,
                cardinality: field.cardinality,
                modifiers: field.modifiers.clone(),
                default: field.default.clone(),
                body,
            });
        }
        path.pop();
    }
    compiled
}

/// Walks a compiled field tree over one document.
///
/// Owns the path breadcrumb for the evaluation; one evaluator per document.
pub(crate) struct Evaluator<'s> {
    guard: &'s SelectorGuard,
    path: FieldPath,
}

impl<'s> Evaluator<'s> {
    pub(crate) fn new(guard: &'s SelectorGuard) -> Self {
        Self {
            guard,
            path: FieldPath::root(),
        }
    }

    /// Evaluate `fields` as a record rooted at `context`.
    ///
    /// `index` is the position of the enclosing plural match, if any. The
    /// first runtime error aborts the evaluation; nothing partial is returned.
    pub(crate) fn record(
        &mut self,
        fields: &[CompiledField],
        context: ElementRef<'_>,
        index: Option<usize>,
    ) -> Result<Record, RuntimeError> {
        let mut record = Record::new();
        for field in fields {
            self.path.push_name(field.name.as_str());
            let value = self.field(field, context, &record, index)?;
            self.path.pop();
            record.insert(field.name.as_str(), value);
        }
        Ok(record)
    }

    fn field(
        &mut self,
        field: &CompiledField,
        context: ElementRef<'_>,
        siblings: &Record,
        index: Option<usize>,
    ) -> Result<ExtractedValue, RuntimeError> {
        let mut matches = match &field.selector {
            Some(selector) => selector.select(context),
            None => vec![context],
        };
        tracing::trace!(path = %self.path, matches = matches.len(), "Resolved field");

        match field.cardinality {
            Cardinality::Single => {
                let value = match matches.first() {
                    Some(node) => self.extract(field, *node, index, siblings)?,
                    None => ExtractedValue::absent(),
                };
                match (&field.default, value.is_absent()) {
                    (Some(default), true) => Ok(default.clone().into()),
                    _ => Ok(value),
                }
            }
            Cardinality::Plural => {
                let modifiers = &field.modifiers;
                let limit = modifiers.limit.map(|n| usize::try_from(n).unwrap_or(0));

                // Items past the limit are never seen unless filtering could
                // drop earlier ones.
                if let (Some(limit), None | Some(false)) = (limit, modifiers.filter) {
                    matches.truncate(limit);
                }

                let mut items = Vec::with_capacity(matches.len());
                for (index, node) in matches.into_iter().enumerate() {
                    self.path.push_index(index);
                    items.push(self.extract(field, node, Some(index), siblings)?);
                    self.path.pop();
                }

                Ok(self.post_process(items, modifiers, limit))
            }
        }
    }

    fn extract(
        &mut self,
        field: &CompiledField,
        node: ElementRef<'_>,
        index: Option<usize>,
        siblings: &Record,
    ) -> Result<ExtractedValue, RuntimeError> {
        let value = match &field.body {
            CompiledBody::Text => ExtractedValue::text(document::visible_text(node)),
            CompiledBody::Html => ExtractedValue::text(document::inner_html(node)),
            CompiledBody::OuterHtml => ExtractedValue::text(document::outer_html(node)),
            CompiledBody::Attribute(name) => match document::attribute(node, name) {
                Some(value) => ExtractedValue::text(value),
                None => ExtractedValue::absent(),
            },
            CompiledBody::Eval {
                expression,
                expected,
            } => {
                let scope = Scope {
                    node,
                    index,
                    record: siblings,
                    guard: self.guard,
                };
                expression.extract(&scope, *expected, &self.path)?
            }
            CompiledBody::Table => {
                if !document::is_table(node) {
                    return Err(RuntimeError::NotATable {
                        tag: document::tag_name(node).to_string(),
                        path: self.path.clone(),
                    });
                }
                ExtractedValue::List(
                    document::table_rows(node)
                        .into_iter()
                        .map(|row| {
                            ExtractedValue::List(
                                row.into_iter().map(ExtractedValue::text).collect(),
                            )
                        })
                        .collect(),
                )
            }
            CompiledBody::Record(children) => {
                ExtractedValue::Record(self.record(children, node, index)?)
            }
        };
        Ok(value)
    }

    /// Apply plural modifiers in order: filter, limit, dedupe, join.
    fn post_process(
        &self,
        mut items: Vec<ExtractedValue>,
        modifiers: &Modifiers,
        limit: Option<usize>,
    ) -> ExtractedValue {
        if modifiers.filter == Some(true) {
            items.retain(|item| !item.is_absent() && item.as_text() != Some(""));
        }

        if let Some(limit) = limit {
            items.truncate(limit);
        }

        if modifiers.dedupe == Some(true) {
            let mut seen = HashSet::with_capacity(items.len());
            items.retain(|item| seen.insert(item.fingerprint()));
        }

        if let Some(separator) = &modifiers.join {
            let present: Vec<&ExtractedValue> =
                items.iter().filter(|item| !item.is_absent()).collect();
            if present.iter().all(|item| item.as_text().is_some()) {
                let joined = present
                    .iter()
                    .filter_map(|item| item.as_text())
                    .collect::<Vec<_>>()
                    .join(separator.as_str());
                return ExtractedValue::text(joined);
            }
            tracing::debug!(path = %self.path, "Skipping join: items are not all text");
        }

        ExtractedValue::List(items)
    }
}
