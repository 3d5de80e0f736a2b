//! Interpreter for compiled [`Expression`]s.
//!
//! An expression can read exactly three things: the matched `node`, its
//! `index` among the matches of a plural field, and the partially built
//! `record` of its enclosing fields. There is no I/O and no way to reach
//! anything else; CSS selectors issued through `node.select(...)` go through
//! the same [`SelectorGuard`] as declared selectors.

use scraper::ElementRef;

use crate::document;
use crate::error::RuntimeError;
use crate::expression::{BinaryOp, Expr, Expression, Function, Literal, Variable};
use crate::model::ValueType;
use crate::path::FieldPath;
use crate::selector::{SelectorError, SelectorGuard};
use crate::value::{ExtractedValue, Record, Scalar};

/// A value produced while running an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value<'a>>),
    Map(Vec<(String, Value<'a>)>),
    Node(ElementRef<'a>),
}

impl<'a> Value<'a> {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "record",
            Value::Node(_) => "node",
        }
    }

    /// Truthiness: null, false, zero, NaN and empty collections are false.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            Value::Node(_) => true,
        }
    }

    fn from_extracted(value: &ExtractedValue) -> Self {
        match value {
            ExtractedValue::Scalar(scalar) => match scalar {
                Scalar::Absent => Value::Null,
                Scalar::Text(s) => Value::Str(s.clone()),
                Scalar::Bool(b) => Value::Bool(*b),
                Scalar::Int(i) => Value::Int(*i),
                Scalar::Float(f) => Value::Float(*f),
            },
            ExtractedValue::List(items) => {
                Value::List(items.iter().map(Value::from_extracted).collect())
            }
            ExtractedValue::Record(record) => Value::Map(
                record
                    .iter()
                    .map(|(k, v)| (k.to_string(), Value::from_extracted(v)))
                    .collect(),
            ),
        }
    }

    /// Convert into a result value. Nodes have no result representation.
    fn into_extracted(self) -> Result<ExtractedValue, String> {
        let value = match self {
            Value::Null => ExtractedValue::absent(),
            Value::Bool(b) => Scalar::Bool(b).into(),
            Value::Int(i) => Scalar::Int(i).into(),
            Value::Float(f) => Scalar::Float(f).into(),
            Value::Str(s) => Scalar::Text(s).into(),
            Value::List(items) => ExtractedValue::List(
                items
                    .into_iter()
                    .map(Value::into_extracted)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Map(entries) => {
                let mut record = Record::new();
                for (key, value) in entries {
                    record.insert(key, value.into_extracted()?);
                }
                ExtractedValue::Record(record)
            }
            Value::Node(_) => {
                return Err(
                    "expression returned a node; use .text, .html or .attr(...) to read it"
                        .to_string(),
                );
            }
        };
        Ok(value)
    }
}

/// What an expression can see while it runs.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'s, 'a> {
    pub node: ElementRef<'a>,
    /// Position among the matches of a plural field; `None` for single fields.
    pub index: Option<usize>,
    /// Values of the enclosing record computed so far.
    pub record: &'s Record,
    pub guard: &'s SelectorGuard,
}

enum Fault {
    Eval(String),
    Selector(SelectorError),
}

type Eval<T> = Result<T, Fault>;

impl Expression {
    /// Run the expression against `scope`; `path` locates any error.
    pub fn run<'a>(
        &self,
        scope: &Scope<'_, 'a>,
        path: &FieldPath,
    ) -> Result<Value<'a>, RuntimeError> {
        eval(&self.root, scope).map_err(|fault| match fault {
            Fault::Eval(reason) => RuntimeError::Eval {
                reason,
                expression: self.source().to_string(),
                path: path.clone(),
            },
            Fault::Selector(err) => err.at(path.clone()),
        })
    }

    /// Run the expression and convert its result, enforcing `expected` when
    /// given.
    ///
    /// With an expected type, null is an error; without one, null becomes
    /// an absent value.
    pub fn extract(
        &self,
        scope: &Scope<'_, '_>,
        expected: Option<ValueType>,
        path: &FieldPath,
    ) -> Result<ExtractedValue, RuntimeError> {
        let value = self.run(scope, path)?;

        if let Some(expected) = expected {
            let matches = match (&value, expected) {
                (Value::Null, _) => {
                    return Err(RuntimeError::EvalNone {
                        expression: self.source().to_string(),
                        path: path.clone(),
                    });
                }
                (Value::Str(_), ValueType::String) => true,
                (Value::Int(_) | Value::Float(_), ValueType::Number) => true,
                (Value::Bool(_), ValueType::Boolean) => true,
                _ => false,
            };
            if !matches {
                return Err(RuntimeError::EvalType {
                    expected: expected.as_str().to_string(),
                    got: value.type_name().to_string(),
                    expression: self.source().to_string(),
                    path: path.clone(),
                });
            }
        }

        value.into_extracted().map_err(|reason| RuntimeError::Eval {
            reason,
            expression: self.source().to_string(),
            path: path.clone(),
        })
    }
}

fn eval<'a>(expr: &Expr, scope: &Scope<'_, 'a>) -> Eval<Value<'a>> {
    match expr {
        Expr::Literal(literal) => Ok(match literal {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::Str(s) => Value::Str(s.clone()),
        }),
        Expr::Var(var) => Ok(match var {
            Variable::Node => Value::Node(scope.node),
            Variable::Index => scope
                .index
                .map(|i| Value::Int(i as i64))
                .unwrap_or(Value::Null),
            Variable::Record => Value::Map(
                scope
                    .record
                    .iter()
                    .map(|(k, v)| (k.to_string(), Value::from_extracted(v)))
                    .collect(),
            ),
        }),
        Expr::Member(target, name) => member(eval(target, scope)?, name),
        Expr::Method(target, name, args) => {
            let target = eval(target, scope)?;
            let args = args
                .iter()
                .map(|arg| eval(arg, scope))
                .collect::<Eval<Vec<_>>>()?;
            method(target, name, args, scope)
        }
        Expr::Index(target, index) => subscript(eval(target, scope)?, eval(index, scope)?),
        Expr::Call(function, args) => {
            let args = args
                .iter()
                .map(|arg| eval(arg, scope))
                .collect::<Eval<Vec<_>>>()?;
            call(*function, args)
        }
        Expr::Neg(inner) => match eval(inner, scope)? {
            Value::Int(i) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| Fault::Eval("integer overflow".to_string())),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(type_error("-", "number", &other)),
        },
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, scope)?.to_bool())),
        Expr::And(left, right) => {
            let left = eval(left, scope)?;
            if left.to_bool() { eval(right, scope) } else { Ok(left) }
        }
        Expr::Or(left, right) => {
            let left = eval(left, scope)?;
            if left.to_bool() { Ok(left) } else { eval(right, scope) }
        }
        Expr::Conditional {
            cond,
            then,
            otherwise,
        } => {
            if eval(cond, scope)?.to_bool() {
                eval(then, scope)
            } else {
                eval(otherwise, scope)
            }
        }
        Expr::Binary(op, left, right) => binary(*op, eval(left, scope)?, eval(right, scope)?),
    }
}

fn type_error(operation: &str, expected: &str, actual: &Value<'_>) -> Fault {
    Fault::Eval(format!(
        "{operation} expects {expected}, got {}",
        actual.type_name()
    ))
}

fn member<'a>(target: Value<'a>, name: &str) -> Eval<Value<'a>> {
    match target {
        Value::Node(node) => match name {
            "text" => Ok(Value::Str(document::visible_text(node))),
            "html" => Ok(Value::Str(document::inner_html(node))),
            "outer_html" => Ok(Value::Str(document::outer_html(node))),
            "tag" => Ok(Value::Str(document::tag_name(node).to_string())),
            _ => Err(Fault::Eval(format!("node has no member '{name}'"))),
        },
        Value::Map(entries) => Ok(entries
            .into_iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
            .unwrap_or(Value::Null)),
        other => Err(Fault::Eval(format!(
            "{} has no member '{name}'",
            other.type_name()
        ))),
    }
}

fn expect_arity(method: &str, args: &[Value<'_>], min: usize, max: usize) -> Eval<()> {
    if args.len() < min || args.len() > max {
        return Err(Fault::Eval(format!(
            "{method}() takes {} argument(s), got {}",
            if min == max {
                min.to_string()
            } else {
                format!("{min} to {max}")
            },
            args.len()
        )));
    }
    Ok(())
}

fn str_arg<'v>(method: &str, value: &'v Value<'_>) -> Eval<&'v str> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(type_error(&format!("{method}()"), "a string", other)),
    }
}

fn method<'a>(
    target: Value<'a>,
    name: &str,
    args: Vec<Value<'a>>,
    scope: &Scope<'_, 'a>,
) -> Eval<Value<'a>> {
    match target {
        Value::Node(node) => match name {
            "attr" => {
                expect_arity(name, &args, 1, 1)?;
                let attr = str_arg(name, &args[0])?;
                Ok(document::attribute(node, attr)
                    .map(|v| Value::Str(v.to_string()))
                    .unwrap_or(Value::Null))
            }
            "select" | "select_one" => {
                expect_arity(name, &args, 1, 1)?;
                let css = str_arg(name, &args[0])?;
                let selector = scope.guard.compile(css).map_err(Fault::Selector)?;
                if name == "select" {
                    Ok(Value::List(
                        selector.select(node).into_iter().map(Value::Node).collect(),
                    ))
                } else {
                    Ok(selector
                        .select_first(node)
                        .map(Value::Node)
                        .unwrap_or(Value::Null))
                }
            }
            _ => Err(Fault::Eval(format!("node has no method '{name}'"))),
        },
        Value::Str(s) => match name {
            "trim" => {
                expect_arity(name, &args, 0, 0)?;
                Ok(Value::Str(s.trim().to_string()))
            }
            "lower" => {
                expect_arity(name, &args, 0, 0)?;
                Ok(Value::Str(s.to_lowercase()))
            }
            "upper" => {
                expect_arity(name, &args, 0, 0)?;
                Ok(Value::Str(s.to_uppercase()))
            }
            "split" => {
                expect_arity(name, &args, 0, 1)?;
                let parts: Vec<Value<'a>> = match args.first() {
                    None => s
                        .split_whitespace()
                        .map(|p| Value::Str(p.to_string()))
                        .collect(),
                    Some(sep) => {
                        let sep = str_arg(name, sep)?;
                        if sep.is_empty() {
                            return Err(Fault::Eval("split() separator is empty".to_string()));
                        }
                        s.split(sep).map(|p| Value::Str(p.to_string())).collect()
                    }
                };
                Ok(Value::List(parts))
            }
            "replace" => {
                expect_arity(name, &args, 2, 2)?;
                let from = str_arg(name, &args[0])?;
                let to = str_arg(name, &args[1])?;
                Ok(Value::Str(s.replace(from, to)))
            }
            "startswith" | "endswith" | "contains" => {
                expect_arity(name, &args, 1, 1)?;
                let needle = str_arg(name, &args[0])?;
                Ok(Value::Bool(match name {
                    "startswith" => s.starts_with(needle),
                    "endswith" => s.ends_with(needle),
                    _ => s.contains(needle),
                }))
            }
            _ => Err(Fault::Eval(format!("string has no method '{name}'"))),
        },
        other => Err(Fault::Eval(format!(
            "{} has no method '{name}'",
            other.type_name()
        ))),
    }
}

fn subscript<'a>(target: Value<'a>, index: Value<'a>) -> Eval<Value<'a>> {
    match (target, index) {
        (Value::List(mut items), Value::Int(i)) => {
            let at = resolve_index(i, items.len())?;
            Ok(items.swap_remove(at))
        }
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            let at = resolve_index(i, chars.len())?;
            Ok(Value::Str(chars[at].to_string()))
        }
        (Value::Map(entries), Value::Str(key)) => Ok(entries
            .into_iter()
            .find(|(k, _)| *k == key)
            .map(|(_, value)| value)
            .unwrap_or(Value::Null)),
        (target, index) => Err(Fault::Eval(format!(
            "cannot index {} with {}",
            target.type_name(),
            index.type_name()
        ))),
    }
}

/// Map a possibly negative index onto `0..len`.
fn resolve_index(i: i64, len: usize) -> Eval<usize> {
    let resolved = if i < 0 { len as i64 + i } else { i };
    if resolved < 0 || resolved >= len as i64 {
        return Err(Fault::Eval(format!(
            "index {i} out of range for length {len}"
        )));
    }
    Ok(resolved as usize)
}

/// Text of a string or node.
fn text_of(function: &str, value: &Value<'_>) -> Eval<String> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        Value::Node(node) => Ok(document::visible_text(*node)),
        other => Err(type_error(&format!("{function}()"), "a string or node", other)),
    }
}

fn display(value: &Value<'_>) -> Eval<String> {
    match value {
        Value::Null => Ok("null".to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Int(i) => Ok(i.to_string()),
        Value::Float(f) => Ok(format!("{f:?}")),
        Value::Str(s) => Ok(s.clone()),
        Value::Node(node) => Ok(document::visible_text(*node)),
        other => Err(Fault::Eval(format!(
            "cannot convert {} to string",
            other.type_name()
        ))),
    }
}

fn parse_number(s: &str) -> Option<Value<'static>> {
    let s = s.trim();
    s.parse::<i64>()
        .map(Value::Int)
        .ok()
        .or_else(|| {
            s.parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::Float)
        })
}

/// Floats must stay finite: JSON has no NaN or infinity.
fn finite<'a>(f: f64) -> Eval<Value<'a>> {
    if f.is_finite() {
        Ok(Value::Float(f))
    } else {
        Err(Fault::Eval("float result is not finite".to_string()))
    }
}

fn float_to_int(f: f64) -> Eval<i64> {
    if !f.is_finite() || f.abs() >= i64::MAX as f64 {
        return Err(Fault::Eval(format!("cannot convert {f} to int")));
    }
    Ok(f.trunc() as i64)
}

fn call<'a>(function: Function, mut args: Vec<Value<'a>>) -> Eval<Value<'a>> {
    let name = function.name();
    match function {
        Function::Len => match &args[0] {
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::List(items) => Ok(Value::Int(items.len() as i64)),
            Value::Map(entries) => Ok(Value::Int(entries.len() as i64)),
            other => Err(type_error("len()", "a string, list or record", other)),
        },
        Function::Int => match &args[0] {
            Value::Int(i) => Ok(Value::Int(*i)),
            Value::Float(f) => float_to_int(*f).map(Value::Int),
            Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
            value @ (Value::Str(_) | Value::Node(_)) => {
                let text = text_of(name, value)?;
                match parse_number(&text) {
                    Some(Value::Int(i)) => Ok(Value::Int(i)),
                    Some(Value::Float(f)) => float_to_int(f).map(Value::Int),
                    _ => Err(Fault::Eval(format!("cannot convert '{text}' to int"))),
                }
            }
            other => Err(type_error("int()", "a number or string", other)),
        },
        Function::Float => match &args[0] {
            Value::Int(i) => Ok(Value::Float(*i as f64)),
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
            value @ (Value::Str(_) | Value::Node(_)) => {
                let text = text_of(name, value)?;
                match parse_number(&text) {
                    Some(Value::Int(i)) => Ok(Value::Float(i as f64)),
                    Some(Value::Float(f)) => Ok(Value::Float(f)),
                    _ => Err(Fault::Eval(format!("cannot convert '{text}' to float"))),
                }
            }
            other => Err(type_error("float()", "a number or string", other)),
        },
        Function::Str => display(&args[0]).map(Value::Str),
        Function::Bool => Ok(Value::Bool(args[0].to_bool())),
        Function::Trim => Ok(Value::Str(text_of(name, &args[0])?.trim().to_string())),
        Function::Lower => Ok(Value::Str(text_of(name, &args[0])?.to_lowercase())),
        Function::Upper => Ok(Value::Str(text_of(name, &args[0])?.to_uppercase())),
        Function::Join => {
            let separator = match args.get(1) {
                Some(sep) => str_arg(name, sep)?.to_string(),
                None => String::new(),
            };
            let Value::List(items) = &args[0] else {
                return Err(type_error("join()", "a list", &args[0]));
            };
            let parts = items
                .iter()
                .filter(|item| !matches!(item, Value::Null))
                .map(display)
                .collect::<Eval<Vec<_>>>()?;
            Ok(Value::Str(parts.join(separator.as_str())))
        }
        Function::First | Function::Last => {
            let Value::List(items) = args.swap_remove(0) else {
                return Err(Fault::Eval(format!("{name}() expects a list")));
            };
            let item = if function == Function::First {
                items.into_iter().next()
            } else {
                items.into_iter().next_back()
            };
            Ok(item.unwrap_or(Value::Null))
        }
        Function::Coalesce => Ok(args
            .into_iter()
            .find(|value| !matches!(value, Value::Null))
            .unwrap_or(Value::Null)),
    }
}

fn as_number(value: &Value<'_>) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn equals(left: &Value<'_>, right: &Value<'_>) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| equals(x, y))
        }
        _ => left == right,
    }
}

/// Remainder with the sign of the divisor.
fn floor_rem(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    Some(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
}

fn binary<'a>(op: BinaryOp, left: Value<'a>, right: Value<'a>) -> Eval<Value<'a>> {
    let mismatch = |left: &Value<'_>, right: &Value<'_>| {
        Fault::Eval(format!(
            "unsupported operand types for {}: {} and {}",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))
    };
    let overflow = || Fault::Eval("integer overflow".to_string());

    match op {
        BinaryOp::Eq => return Ok(Value::Bool(equals(&left, &right))),
        BinaryOp::NotEq => return Ok(Value::Bool(!equals(&left, &right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (&left, &right) {
                (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => match (as_number(&left), as_number(&right)) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => return Err(mismatch(&left, &right)),
                },
            };
            let result = ordering.is_some_and(|o| match op {
                BinaryOp::Lt => o.is_lt(),
                BinaryOp::Le => o.is_le(),
                BinaryOp::Gt => o.is_gt(),
                _ => o.is_ge(),
            });
            return Ok(Value::Bool(result));
        }
        _ => {}
    }

    match (op, left, right) {
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
        (BinaryOp::Add, Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (BinaryOp::Add, Value::Int(a), Value::Int(b)) => {
            a.checked_add(b).map(Value::Int).ok_or_else(overflow)
        }
        (BinaryOp::Sub, Value::Int(a), Value::Int(b)) => {
            a.checked_sub(b).map(Value::Int).ok_or_else(overflow)
        }
        (BinaryOp::Mul, Value::Int(a), Value::Int(b)) => {
            a.checked_mul(b).map(Value::Int).ok_or_else(overflow)
        }
        (BinaryOp::Rem, Value::Int(a), Value::Int(b)) => {
            if b == 0 {
                return Err(Fault::Eval("division by zero".to_string()));
            }
            floor_rem(a, b).map(Value::Int).ok_or_else(overflow)
        }
        (op, left, right) => {
            let (Some(a), Some(b)) = (as_number(&left), as_number(&right)) else {
                return Err(mismatch(&left, &right));
            };
            match op {
                BinaryOp::Add => finite(a + b),
                BinaryOp::Sub => finite(a - b),
                BinaryOp::Mul => finite(a * b),
                BinaryOp::Div | BinaryOp::Rem if b == 0.0 => {
                    Err(Fault::Eval("division by zero".to_string()))
                }
                BinaryOp::Div => finite(a / b),
                BinaryOp::Rem => {
                    let r = a % b;
                    Ok(Value::Float(if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                        r + b
                    } else {
                        r
                    }))
                }
                _ => Err(mismatch(&left, &right)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use scraper::{Html, Selector};

    use super::*;
    use crate::config::ScraperConfig;

    const PAGE: &str = r#"
        <div class="product" data-sku="A-1">
          <h2> Widget </h2>
          <span class="price">$12.50</span>
          <ul><li>red</li><li>green</li><li>blue</li></ul>
        </div>"#;

    fn product(html: &Html) -> ElementRef<'_> {
        html.select(&Selector::parse(".product").unwrap())
            .next()
            .unwrap()
    }

    /// Replace nodes with their text so results can outlive the document.
    fn detach(value: Value<'_>) -> Value<'static> {
        match value {
            Value::Null => Value::Null,
            Value::Bool(b) => Value::Bool(b),
            Value::Int(i) => Value::Int(i),
            Value::Float(f) => Value::Float(f),
            Value::Str(s) => Value::Str(s),
            Value::Node(node) => Value::Str(document::visible_text(node)),
            Value::List(items) => Value::List(items.into_iter().map(detach).collect()),
            Value::Map(entries) => {
                Value::Map(entries.into_iter().map(|(k, v)| (k, detach(v))).collect())
            }
        }
    }

    fn run_with(
        source: &str,
        record: &Record,
        index: Option<usize>,
    ) -> Result<Value<'static>, RuntimeError> {
        let html = Html::parse_document(PAGE);
        let guard = SelectorGuard::default();
        let scope = Scope {
            node: product(&html),
            index,
            record,
            guard: &guard,
        };
        let expr = Expression::compile(source, &ScraperConfig::default()).unwrap();
        expr.run(&scope, &FieldPath::root()).map(detach)
    }

    fn run(source: &str) -> Result<Value<'static>, RuntimeError> {
        run_with(source, &Record::new(), None)
    }

    fn text(s: &str) -> Value<'static> {
        Value::Str(s.to_string())
    }

    #[test]
    fn test_node_members_and_methods() {
        assert_eq!(run("node.select_one('h2').text").unwrap(), text("Widget"));
        assert_eq!(run("node.attr('data-sku')").unwrap(), text("A-1"));
        assert_eq!(run("node.attr('missing')").unwrap(), Value::Null);
        assert_eq!(run("node.tag").unwrap(), text("div"));
        assert_eq!(
            run("node.select('li')").unwrap(),
            Value::List(vec![text("red"), text("green"), text("blue")])
        );
        assert_eq!(run("len(node.select('li'))").unwrap(), Value::Int(3));
    }

    #[test]
    fn test_price_parsing() {
        assert_eq!(
            run("float(node.select_one('.price').text.replace('$', ''))").unwrap(),
            Value::Float(12.5)
        );
        assert_eq!(run("int('  42 ')").unwrap(), Value::Int(42));
        assert_eq!(run("int(3.9)").unwrap(), Value::Int(3));
    }

    #[test]
    fn test_arithmetic_semantics() {
        assert_eq!(run("7 / 2").unwrap(), Value::Float(3.5));
        assert_eq!(run("-7 % 3").unwrap(), Value::Int(2));
        assert_eq!(run("7 % -3").unwrap(), Value::Int(-2));
        assert_eq!(run("1 + 2.5").unwrap(), Value::Float(3.5));
        assert_eq!(run("'a' + 'b'").unwrap(), text("ab"));
        assert_eq!(run("1 == 1.0").unwrap(), Value::Bool(true));
        assert_eq!(run("'b' > 'a'").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_runtime_faults() {
        for (source, fragment) in [
            ("1 / 0", "division by zero"),
            ("1 + 'a'", "unsupported operand types for +: integer and string"),
            ("node.nope", "node has no member 'nope'"),
            ("node.text.frobnicate()", "string has no method 'frobnicate'"),
            ("node.select('li')[5]", "out of range"),
            ("int('abc')", "cannot convert 'abc' to int"),
            ("9223372036854775807 + 1", "integer overflow"),
            ("float('nan')", "cannot convert 'nan' to float"),
            ("float('inf')", "cannot convert 'inf' to float"),
            ("int('NaN')", "cannot convert 'NaN' to int"),
            ("float('1.5e308') * 10", "not finite"),
            ("-float('1e308') - float('1e308')", "not finite"),
        ] {
            let err = run(source).unwrap_err();
            match err {
                RuntimeError::Eval { reason, expression, .. } => {
                    assert!(reason.contains(fragment), "{source}: {reason}");
                    assert_eq!(expression, source);
                }
                other => panic!("{source}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_runtime_selector_goes_through_guard() {
        let err = run("node.select('a[')").unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidCssSelector { .. }));

        let deep = vec!["a"; 40].join(" ");
        let err = run(&format!("node.select('{deep}')")).unwrap_err();
        assert!(matches!(err, RuntimeError::CssSelectorTooComplex { .. }));
    }

    #[test]
    fn test_python_style_boolean_operators() {
        assert_eq!(run("'' or 'fallback'").unwrap(), text("fallback"));
        assert_eq!(run("'x' and 0").unwrap(), Value::Int(0));
        assert_eq!(run("not node.select('table')").unwrap(), Value::Bool(true));
        assert_eq!(run("'yes' if len(node.select('li')) > 2 else 'no'").unwrap(), text("yes"));
        // Short-circuit: the right side would fail if evaluated.
        assert_eq!(run("false and 1 / 0").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_index_and_record_scope() {
        let record: Record = [("title", ExtractedValue::text("Widget"))]
            .into_iter()
            .collect();
        assert_eq!(run_with("index", &record, Some(2)).unwrap(), Value::Int(2));
        assert_eq!(run_with("index", &record, None).unwrap(), Value::Null);
        assert_eq!(run_with("record.title + '!'", &record, None).unwrap(), text("Widget!"));
        assert_eq!(run_with("record['missing']", &record, None).unwrap(), Value::Null);
    }

    #[test]
    fn test_string_helpers() {
        assert_eq!(run("trim('  a ')").unwrap(), text("a"));
        assert_eq!(run("upper(node.select_one('h2'))").unwrap(), text("WIDGET"));
        assert_eq!(run("'a,b'.split(',')").unwrap(), Value::List(vec![text("a"), text("b")]));
        assert_eq!(run("join(node.select('li'), '|')").unwrap(), text("red|green|blue"));
        assert_eq!(run("first(node.select('li')).text").unwrap(), text("red"));
        assert_eq!(run("last(node.select('table'))").unwrap(), Value::Null);
        assert_eq!(run("coalesce(node.attr('x'), 'dflt')").unwrap(), text("dflt"));
        assert_eq!(run("'Widget'.startswith('Wid')").unwrap(), Value::Bool(true));
    }

    fn extract(source: &str, expected: Option<ValueType>) -> Result<ExtractedValue, RuntimeError> {
        let html = Html::parse_document(PAGE);
        let guard = SelectorGuard::default();
        let record = Record::new();
        let scope = Scope {
            node: product(&html),
            index: None,
            record: &record,
            guard: &guard,
        };
        Expression::compile(source, &ScraperConfig::default())
            .unwrap()
            .extract(&scope, expected, &FieldPath::root())
    }

    #[test]
    fn test_extract_enforces_expected_type() {
        assert_eq!(
            extract("len(node.select('li'))", Some(ValueType::Number)).unwrap(),
            Scalar::Int(3).into()
        );
        assert!(matches!(
            extract("node.tag", Some(ValueType::Number)).unwrap_err(),
            RuntimeError::EvalType { ref expected, ref got, .. }
                if expected == "number" && got == "string"
        ));
        assert!(matches!(
            extract("node.attr('missing')", Some(ValueType::String)).unwrap_err(),
            RuntimeError::EvalNone { .. }
        ));
    }

    #[test]
    fn test_extract_without_type() {
        assert!(extract("node.attr('missing')", None).unwrap().is_absent());
        assert_eq!(
            extract("node.select('li')[0].text", None).unwrap(),
            ExtractedValue::text("red")
        );
        assert!(matches!(
            extract("node", None).unwrap_err(),
            RuntimeError::Eval { ref reason, .. } if reason.contains("returned a node")
        ));
    }
}
