//! Typed scraper definitions and the parser that builds them from raw
//! JSON/YAML documents.
//!
//! # Grammar
//!
//! A definition is a mapping of field keys to declarations:
//!
//! ```json
//! {
//!   "title": "h1",
//!   "links[]": { "sel": "a", "attr": "href", "limit": 10 },
//!   "items": {
//!     "selector": "li.item",
//!     "cardinality": "plural",
//!     "fields": { "name": ".name", "price": { "eval": "float(node.text)", "type": "number" } }
//!   }
//! }
//! ```
//!
//! - A string declaration is a text field using the string as selector.
//! - A `[]` suffix on the key is shorthand for `"cardinality": "plural"`.
//! - `sel`/`selector`, `attr`/`attribute` and `fields`/`children` are aliases;
//!   declaring both forms of one alias is a conflict.
//! - Modifiers (`limit`, `dedupe`, `join`, `filter`) go either in a
//!   `modifiers` mapping or directly on the field.
//!
//! Parsing never stops at the first problem: every issue found is reported.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ScrapeError;
use crate::issue::{IssueKind, ValidationIssue};
use crate::path::FieldPath;
use crate::value::Scalar;

/// Whether a field expects one match or many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    #[default]
    Single,
    Plural,
}

impl FromStr for Cardinality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(Cardinality::Single),
            "plural" => Ok(Cardinality::Plural),
            _ => Err(format!("unknown cardinality '{s}' (expected single or plural)")),
        }
    }
}

/// Declared result type of an eval extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" | "str" => Ok(ValueType::String),
            "number" | "int" | "float" => Ok(ValueType::Number),
            "boolean" | "bool" => Ok(ValueType::Boolean),
            _ => Err(format!(
                "unknown type '{s}' (expected string, number or boolean)"
            )),
        }
    }
}

/// How a matched node becomes a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Text,
    Html,
    OuterHtml,
    Attribute(String),
    Eval {
        expression: String,
        expected: Option<ValueType>,
    },
    Table,
}

impl Extraction {
    /// Name of the concern, as used in definitions.
    pub fn concern(&self) -> &'static str {
        match self {
            Extraction::Text => "text",
            Extraction::Html => "html",
            Extraction::OuterHtml => "outer_html",
            Extraction::Attribute(_) => "attribute",
            Extraction::Eval { .. } => "eval",
            Extraction::Table => "table",
        }
    }
}

/// Plural-only post-processing knobs.
///
/// Values are kept as declared; range checks belong to the validator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub limit: Option<i64>,
    pub dedupe: Option<bool>,
    pub join: Option<String>,
    /// Drop absent and empty-text items.
    pub filter: Option<bool>,
}

impl Modifiers {
    pub const NAMES: [&'static str; 4] = ["limit", "dedupe", "join", "filter"];

    pub fn is_empty(&self) -> bool {
        self.present().is_empty()
    }

    /// Names of the modifiers that are set, in canonical order.
    pub fn present(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.limit.is_some() {
            names.push("limit");
        }
        if self.dedupe.is_some() {
            names.push("dedupe");
        }
        if self.join.is_some() {
            names.push("join");
        }
        if self.filter.is_some() {
            names.push("filter");
        }
        names
    }
}

/// A field either extracts a value or opens a nested record.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldBody {
    Extract(Extraction),
    Record(Vec<FieldSpec>),
}

/// One named extraction rule.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub selector: Option<String>,
    pub cardinality: Cardinality,
    pub modifiers: Modifiers,
    /// Used when a single field comes out absent.
    pub default: Option<Scalar>,
    pub body: FieldBody,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, body: FieldBody) -> Self {
        Self {
            name: name.into(),
            selector: None,
            cardinality: Cardinality::Single,
            modifiers: Modifiers::default(),
            default: None,
            body,
        }
    }

    /// Single text field scoped by `selector`.
    pub fn text(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self::new(name, FieldBody::Extract(Extraction::Text)).with_selector(selector)
    }

    pub fn record(name: impl Into<String>, children: Vec<FieldSpec>) -> Self {
        Self::new(name, FieldBody::Record(children))
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_extraction(mut self, extraction: Extraction) -> Self {
        self.body = FieldBody::Extract(extraction);
        self
    }

    pub fn plural(mut self) -> Self {
        self.cardinality = Cardinality::Plural;
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_default(mut self, default: Scalar) -> Self {
        self.default = Some(default);
        self
    }

    pub fn is_plural(&self) -> bool {
        self.cardinality == Cardinality::Plural
    }

    pub fn children(&self) -> &[FieldSpec] {
        match &self.body {
            FieldBody::Record(children) => children,
            FieldBody::Extract(_) => &[],
        }
    }

    pub fn extraction(&self) -> Option<&Extraction> {
        match &self.body {
            FieldBody::Extract(extraction) => Some(extraction),
            FieldBody::Record(_) => None,
        }
    }
}

/// A whole scraper definition: the fields of the root record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Specification {
    pub fields: Vec<FieldSpec>,
}

impl Specification {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Build the model from a raw definition, reporting every structural issue.
    pub fn parse(raw: &Value) -> Result<Self, Vec<ValidationIssue>> {
        let (spec, issues) = Self::parse_with_issues(raw);
        if issues.is_empty() {
            Ok(spec)
        } else {
            Err(issues)
        }
    }

    /// Like [`Specification::parse`], but also hands back the fields that
    /// parsed cleanly so they can still be validated.
    ///
    /// A field with a structural issue is left out together with its
    /// subtree; a record keeps its clean children.
    pub fn parse_with_issues(raw: &Value) -> (Self, Vec<ValidationIssue>) {
        let mut parser = Parser::default();
        let root = FieldPath::root();
        let fields = match raw {
            Value::Object(map) if map.is_empty() => {
                parser.malformed(&root, "scraper definition declares no fields");
                Vec::new()
            }
            Value::Object(map) => parser.field_map(map, &root),
            other => {
                parser.malformed(
                    &root,
                    format!(
                        "scraper definition must be a mapping of fields, got {}",
                        json_type(other)
                    ),
                );
                Vec::new()
            }
        };

        (Self { fields }, parser.issues)
    }

    pub fn from_json_str(source: &str) -> Result<Self, ScrapeError> {
        let raw: Value = serde_json::from_str(source)?;
        Self::parse(&raw).map_err(ScrapeError::InvalidScraper)
    }

    pub fn from_yaml_str(source: &str) -> Result<Self, ScrapeError> {
        let raw: Value = serde_yaml_ng::from_str(source)?;
        Self::parse(&raw).map_err(ScrapeError::InvalidScraper)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Keys accepted in a longhand field declaration.
const FIELD_KEYS: &[&str] = &[
    "selector",
    "sel",
    "cardinality",
    "extraction",
    "attribute",
    "attr",
    "eval",
    "type",
    "fields",
    "children",
    "modifiers",
    "limit",
    "dedupe",
    "join",
    "filter",
    "default",
];

/// Split `links[]` into `("links", true)`.
fn split_key(key: &str) -> (&str, bool) {
    match key.strip_suffix("[]") {
        Some(name) => (name, true),
        None => (key, false),
    }
}

#[derive(Default)]
struct Parser {
    issues: Vec<ValidationIssue>,
}

impl Parser {
    fn report(&mut self, path: &FieldPath, kind: IssueKind) {
        self.issues.push(ValidationIssue::new(path.clone(), kind));
    }

    fn malformed(&mut self, path: &FieldPath, reason: impl Into<String>) {
        self.report(
            path,
            IssueKind::Malformed {
                reason: reason.into(),
            },
        );
    }

    /// Group declared keys by field name, reporting keys that collide.
    ///
    /// Returns the keys that are safe to parse, in declaration order.
    fn disambiguate<'k>(&mut self, keys: &[&'k str], path: &FieldPath) -> Vec<&'k str> {
        let mut groups: Vec<(&'k str, Vec<&'k str>)> = Vec::new();
        for &key in keys {
            let (name, _) = split_key(key);
            match groups.iter_mut().find(|(n, _)| *n == name) {
                Some((_, group)) => group.push(key),
                None => groups.push((name, vec![key])),
            }
        }

        let mut accepted = Vec::new();
        for (name, group) in groups {
            if name.trim().is_empty() {
                self.malformed(path, "field names must not be empty");
            } else if group.len() > 1 {
                self.report(
                    path,
                    IssueKind::Conflict {
                        keys: group.iter().map(|k| k.to_string()).collect(),
                    },
                );
            } else {
                accepted.extend(group);
            }
        }
        accepted
    }

    fn field_map(&mut self, map: &Map<String, Value>, path: &FieldPath) -> Vec<FieldSpec> {
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        let accepted = self.disambiguate(&keys, path);
        accepted
            .into_iter()
            .filter_map(|key| self.field(key, &map[key], path, false))
            .collect()
    }

    fn field_seq(&mut self, items: &[Value], path: &FieldPath) -> Vec<FieldSpec> {
        let mut named = Vec::new();
        for (i, item) in items.iter().enumerate() {
            match item {
                Value::Object(map) => match map.get("name") {
                    Some(Value::String(name)) => named.push((name.as_str(), item)),
                    _ => self.malformed(
                        path,
                        format!("field #{i} in sequence needs a string 'name' key"),
                    ),
                },
                other => self.malformed(
                    path,
                    format!("field #{i} in sequence must be a mapping, got {}", json_type(other)),
                ),
            }
        }

        let keys: Vec<&str> = named.iter().map(|(name, _)| *name).collect();
        let accepted = self.disambiguate(&keys, path);
        named
            .into_iter()
            .filter(|(name, _)| accepted.contains(name))
            .filter_map(|(name, item)| self.field(name, item, path, true))
            .collect()
    }

    fn field(
        &mut self,
        key: &str,
        raw: &Value,
        parent: &FieldPath,
        named_item: bool,
    ) -> Option<FieldSpec> {
        let (name, key_plural) = split_key(key);
        let path = parent.child(name);
        let cardinality = if key_plural {
            Cardinality::Plural
        } else {
            Cardinality::Single
        };

        match raw {
            Value::String(selector) => Some(FieldSpec {
                cardinality,
                ..FieldSpec::text(name, selector.as_str())
            }),
            Value::Object(map) => self.longhand(key, name, key_plural, map, &path, named_item),
            other => {
                self.malformed(
                    &path,
                    format!(
                        "field must be a selector string or a mapping, got {}",
                        json_type(other)
                    ),
                );
                None
            }
        }
    }

    /// Report aliases declared more than once; returns the declared value.
    fn alias<'m>(
        &mut self,
        map: &'m Map<String, Value>,
        aliases: &[&str],
        path: &FieldPath,
    ) -> Option<&'m Value> {
        let present: Vec<&str> = aliases
            .iter()
            .copied()
            .filter(|a| map.contains_key(*a))
            .collect();
        if present.len() > 1 {
            self.report(
                path,
                IssueKind::Conflict {
                    keys: present.iter().map(|k| k.to_string()).collect(),
                },
            );
        }
        present.first().and_then(|k| map.get(*k))
    }

    fn string<'v>(&mut self, value: &'v Value, what: &str, path: &FieldPath) -> Option<&'v str> {
        match value {
            Value::String(s) => Some(s),
            other => {
                self.malformed(path, format!("{what} must be a string, got {}", json_type(other)));
                None
            }
        }
    }

    fn longhand(
        &mut self,
        key: &str,
        name: &str,
        key_plural: bool,
        map: &Map<String, Value>,
        path: &FieldPath,
        named_item: bool,
    ) -> Option<FieldSpec> {
        let issues_before = self.issues.len();
        let mut child_issues = 0;

        for k in map.keys() {
            if !FIELD_KEYS.contains(&k.as_str()) && !(named_item && k == "name") {
                self.report(path, IssueKind::UnknownKey { key: k.clone() });
            }
        }

        let selector = self
            .alias(map, &["selector", "sel"], path)
            .and_then(|v| self.string(v, "selector", path))
            .map(str::to_string);

        let mut cardinality = if key_plural {
            Cardinality::Plural
        } else {
            Cardinality::Single
        };
        if let Some(raw) = map.get("cardinality") {
            match self.string(raw, "cardinality", path).map(str::parse::<Cardinality>) {
                Some(Ok(declared)) => {
                    if key_plural && declared == Cardinality::Single {
                        self.report(
                            path,
                            IssueKind::Conflict {
                                keys: vec![key.to_string(), "cardinality".to_string()],
                            },
                        );
                    }
                    cardinality = declared;
                }
                Some(Err(reason)) => self.malformed(path, reason),
                None => {}
            }
        }

        let attribute = self.alias(map, &["attribute", "attr"], path);
        let children = self.alias(map, &["fields", "children"], path);
        let extraction_raw = map.get("extraction");
        let eval_raw = map.get("eval");

        let mut concerns = Vec::new();
        if extraction_raw.is_some() {
            concerns.push("extraction".to_string());
        }
        if attribute.is_some() {
            concerns.push("attribute".to_string());
        }
        if eval_raw.is_some() {
            concerns.push("eval".to_string());
        }
        if children.is_some() {
            concerns.push("fields".to_string());
        }
        if concerns.len() > 1 {
            let is_table = matches!(extraction_raw, Some(Value::String(s)) if s == "table");
            if is_table && children.is_some() {
                self.report(path, IssueKind::TableShape);
            } else {
                self.report(path, IssueKind::MixedConcern { concerns });
            }
            return None;
        }

        let declared_type = match map.get("type") {
            Some(raw) => match self.string(raw, "type", path).map(str::parse::<ValueType>) {
                Some(Ok(t)) => Some(t),
                Some(Err(reason)) => {
                    self.malformed(path, reason);
                    None
                }
                None => None,
            },
            None => None,
        };
        let declares_eval = eval_raw.is_some()
            || matches!(extraction_raw, Some(Value::Object(m)) if m.contains_key("eval"));
        if map.contains_key("type") && !declares_eval {
            self.malformed(path, "'type' only applies to eval extraction");
        }

        let body = if let Some(raw) = extraction_raw {
            self.extraction(raw, declared_type, path)
                .map(FieldBody::Extract)
        } else if let Some(raw) = attribute {
            self.string(raw, "attribute", path)
                .map(|a| FieldBody::Extract(Extraction::Attribute(a.to_string())))
        } else if let Some(raw) = eval_raw {
            self.string(raw, "eval", path).map(|expression| {
                FieldBody::Extract(Extraction::Eval {
                    expression: expression.to_string(),
                    expected: declared_type,
                })
            })
        } else if let Some(raw) = children {
            let children_before = self.issues.len();
            let fields = match raw {
                Value::Object(m) => self.field_map(m, path),
                Value::Array(items) => self.field_seq(items, path),
                other => {
                    self.malformed(
                        path,
                        format!("fields must be a mapping or a sequence, got {}", json_type(other)),
                    );
                    Vec::new()
                }
            };
            child_issues = self.issues.len() - children_before;
            let empty = match raw {
                Value::Object(m) => m.is_empty(),
                Value::Array(items) => items.is_empty(),
                _ => false,
            };
            if empty {
                self.malformed(path, "fields must declare at least one field");
            }
            Some(FieldBody::Record(fields))
        } else {
            Some(FieldBody::Extract(Extraction::Text))
        };

        let modifiers = self.modifiers(map, path);

        let default = match map.get("default") {
            Some(raw) => match Scalar::from_json(raw) {
                Some(scalar) => Some(scalar),
                None => {
                    self.malformed(path, "default must be a scalar value");
                    None
                }
            },
            None => None,
        };

        if self.issues.len() - child_issues > issues_before {
            return None;
        }
        if matches!(&body, Some(FieldBody::Record(fields)) if fields.is_empty()) {
            return None;
        }

        Some(FieldSpec {
            name: name.to_string(),
            selector,
            cardinality,
            modifiers,
            default,
            body: body?,
        })
    }

    fn extraction(
        &mut self,
        raw: &Value,
        declared_type: Option<ValueType>,
        path: &FieldPath,
    ) -> Option<Extraction> {
        match raw {
            Value::String(s) => match s.as_str() {
                "text" => Some(Extraction::Text),
                "html" | "inner_html" => Some(Extraction::Html),
                "outer_html" => Some(Extraction::OuterHtml),
                "table" => Some(Extraction::Table),
                other => {
                    self.malformed(path, format!("unknown extraction '{other}'"));
                    None
                }
            },
            Value::Object(m) => {
                for k in m.keys() {
                    if !matches!(k.as_str(), "attribute" | "eval" | "type") {
                        self.report(
                            path,
                            IssueKind::UnknownKey {
                                key: format!("extraction.{k}"),
                            },
                        );
                    }
                }
                match (m.get("attribute"), m.get("eval")) {
                    (Some(_), Some(_)) => {
                        self.report(
                            path,
                            IssueKind::MixedConcern {
                                concerns: vec!["attribute".to_string(), "eval".to_string()],
                            },
                        );
                        None
                    }
                    (Some(attr), None) => self
                        .string(attr, "attribute", path)
                        .map(|a| Extraction::Attribute(a.to_string())),
                    (None, Some(eval)) => {
                        let inner_type = match m.get("type") {
                            Some(raw) => {
                                match self.string(raw, "type", path).map(str::parse::<ValueType>) {
                                    Some(Ok(t)) => Some(t),
                                    Some(Err(reason)) => {
                                        self.malformed(path, reason);
                                        None
                                    }
                                    None => None,
                                }
                            }
                            None => None,
                        };
                        if inner_type.is_some() && declared_type.is_some() {
                            self.report(
                                path,
                                IssueKind::Conflict {
                                    keys: vec!["type".to_string(), "extraction.type".to_string()],
                                },
                            );
                        }
                        self.string(eval, "eval", path)
                            .map(|expression| Extraction::Eval {
                                expression: expression.to_string(),
                                expected: inner_type.or(declared_type),
                            })
                    }
                    (None, None) => {
                        self.malformed(path, "extraction mapping needs 'attribute' or 'eval'");
                        None
                    }
                }
            }
            other => {
                self.malformed(
                    path,
                    format!("extraction must be a string or a mapping, got {}", json_type(other)),
                );
                None
            }
        }
    }

    fn modifiers(&mut self, map: &Map<String, Value>, path: &FieldPath) -> Modifiers {
        let nested = match map.get("modifiers") {
            Some(Value::Object(m)) => Some(m),
            Some(other) => {
                self.malformed(
                    path,
                    format!("modifiers must be a mapping, got {}", json_type(other)),
                );
                None
            }
            None => None,
        };

        if let Some(nested) = nested {
            for k in nested.keys() {
                if !Modifiers::NAMES.contains(&k.as_str()) {
                    self.report(
                        path,
                        IssueKind::UnknownKey {
                            key: format!("modifiers.{k}"),
                        },
                    );
                }
            }
        }

        let mut modifiers = Modifiers::default();
        for name in Modifiers::NAMES {
            let inline = map.get(name);
            let grouped = nested.and_then(|m| m.get(name));
            if inline.is_some() && grouped.is_some() {
                self.report(
                    path,
                    IssueKind::Conflict {
                        keys: vec![format!("modifiers.{name}"), name.to_string()],
                    },
                );
                continue;
            }
            let Some(raw) = inline.or(grouped) else {
                continue;
            };

            let invalid = |reason: &str| IssueKind::InvalidPluralModifier {
                modifier: name.to_string(),
                reason: reason.to_string(),
            };
            match name {
                "limit" => match raw.as_i64() {
                    Some(n) => modifiers.limit = Some(n),
                    None => self.report(path, invalid("expected an integer")),
                },
                "dedupe" => match raw.as_bool() {
                    Some(b) => modifiers.dedupe = Some(b),
                    None => self.report(path, invalid("expected a boolean")),
                },
                "filter" => match raw.as_bool() {
                    Some(b) => modifiers.filter = Some(b),
                    None => self.report(path, invalid("expected a boolean")),
                },
                "join" => match raw.as_str() {
                    Some(s) => modifiers.join = Some(s.to_string()),
                    None => self.report(path, invalid("expected a string separator")),
                },
                _ => {}
            }
        }
        modifiers
    }
}
