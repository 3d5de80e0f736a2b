//! Compilation of the small expression language used by `eval` fields.
//!
//! Expressions are compiled once, when a scraper is built, so syntax errors
//! surface before any document is evaluated. Running a compiled expression is
//! the job of [`crate::sandbox`].
//!
//! ```text
//! conditional    := or ( "if" or "else" conditional )?
//! or             := and ( "or" and )*
//! and            := not ( "and" not )*
//! not            := "not" not | comparison
//! comparison     := additive ( ("==" | "!=" | "<" | "<=" | ">" | ">=") additive )?
//! additive       := multiplicative ( ("+" | "-") multiplicative )*
//! multiplicative := unary ( ("*" | "/" | "%") unary )*
//! unary          := "-" unary | postfix
//! postfix        := primary ( "." name ( "(" args ")" )? | "[" conditional "]" )*
//! primary        := literal | variable | function "(" args ")" | "(" conditional ")"
//! ```

use std::fmt;

use thiserror::Error;

use crate::config::ScraperConfig;
use crate::issue::{IssueKind, ValidationIssue};
use crate::path::FieldPath;

/// An expression that failed to compile.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("syntax error in `{expression}`: {reason}")]
pub struct SyntaxError {
    pub expression: String,
    pub reason: String,
}

impl SyntaxError {
    pub fn into_issue(self, path: FieldPath) -> ValidationIssue {
        ValidationIssue::new(
            path,
            IssueKind::EvalSyntax {
                expression: self.expression,
                reason: self.reason,
            },
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Names an expression can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Variable {
    Node,
    Index,
    Record,
}

impl Variable {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "node" => Some(Variable::Node),
            "index" => Some(Variable::Index),
            "record" => Some(Variable::Record),
            _ => None,
        }
    }
}

/// Built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Function {
    Len,
    Int,
    Float,
    Str,
    Bool,
    Trim,
    Lower,
    Upper,
    Join,
    First,
    Last,
    Coalesce,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        let function = match name {
            "len" => Function::Len,
            "int" => Function::Int,
            "float" => Function::Float,
            "str" => Function::Str,
            "bool" => Function::Bool,
            "trim" => Function::Trim,
            "lower" => Function::Lower,
            "upper" => Function::Upper,
            "join" => Function::Join,
            "first" => Function::First,
            "last" => Function::Last,
            "coalesce" => Function::Coalesce,
            _ => return None,
        };
        Some(function)
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Function::Len => "len",
            Function::Int => "int",
            Function::Float => "float",
            Function::Str => "str",
            Function::Bool => "bool",
            Function::Trim => "trim",
            Function::Lower => "lower",
            Function::Upper => "upper",
            Function::Join => "join",
            Function::First => "first",
            Function::Last => "last",
            Function::Coalesce => "coalesce",
        }
    }

    /// Accepted argument counts (min, max).
    fn arity(&self) -> (usize, usize) {
        match self {
            Function::Join => (1, 2),
            Function::Coalesce => (1, usize::MAX),
            _ => (1, 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub(crate) fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Literal),
    Var(Variable),
    Member(Box<Expr>, String),
    Method(Box<Expr>, String, Vec<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

/// A compiled, reusable expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    pub(crate) root: Expr,
}

impl Expression {
    /// Parse `source`, rejecting unknown names and trees nested deeper than
    /// the configured limit.
    pub fn compile(source: &str, config: &ScraperConfig) -> Result<Self, SyntaxError> {
        let fail = |reason: String| SyntaxError {
            expression: source.to_string(),
            reason,
        };

        let tokens = tokenize(source).map_err(fail)?;
        let mut parser = ExprParser {
            tokens,
            pos: 0,
            depth: 0,
            max_depth: config.max_expression_depth,
        };
        let root = parser.conditional().map_err(fail)?.expr;
        if let Some((token, offset)) = parser.peek_with_offset() {
            if *token != Token::Eof {
                return Err(fail(format!("unexpected {token} at offset {offset}")));
            }
        }

        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Op(&'static str),
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Int(i) => write!(f, "number {i}"),
            Token::Float(x) => write!(f, "number {x}"),
            Token::Str(s) => write!(f, "string {s:?}"),
            Token::Ident(name) => write!(f, "'{name}'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::LBracket => write!(f, "'['"),
            Token::RBracket => write!(f, "']'"),
            Token::Comma => write!(f, "','"),
            Token::Dot => write!(f, "'.'"),
            Token::Op(op) => write!(f, "'{op}'"),
            Token::Eof => write!(f, "end of expression"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, String> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].1.is_ascii_digit() {
                i += 1;
            }
            let is_float =
                i + 1 < chars.len() && chars[i].1 == '.' && chars[i + 1].1.is_ascii_digit();
            if is_float {
                i += 1;
                while i < chars.len() && chars[i].1.is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().map(|(_, c)| c).collect();
            let token = if is_float {
                Token::Float(
                    text.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .ok_or_else(|| format!("invalid number '{text}' at offset {offset}"))?,
                )
            } else {
                Token::Int(
                    text.parse()
                        .map_err(|_| format!("integer '{text}' at offset {offset} is too large"))?,
                )
            };
            tokens.push((token, offset));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                i += 1;
            }
            let name: String = chars[start..i].iter().map(|(_, c)| c).collect();
            tokens.push((Token::Ident(name), offset));
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            let mut value = String::new();
            i += 1;
            loop {
                let Some(&(_, ch)) = chars.get(i) else {
                    return Err(format!("unterminated string starting at offset {offset}"));
                };
                i += 1;
                match ch {
                    '\\' => {
                        let Some(&(_, escaped)) = chars.get(i) else {
                            return Err(format!("unterminated string starting at offset {offset}"));
                        };
                        i += 1;
                        value.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            other => other,
                        });
                    }
                    ch if ch == quote => break,
                    ch => value.push(ch),
                }
            }
            tokens.push((Token::Str(value), offset));
            continue;
        }

        let next = chars.get(i + 1).map(|(_, c)| *c);
        let (token, width) = match (c, next) {
            ('=', Some('=')) => (Token::Op("=="), 2),
            ('!', Some('=')) => (Token::Op("!="), 2),
            ('<', Some('=')) => (Token::Op("<="), 2),
            ('>', Some('=')) => (Token::Op(">="), 2),
            ('<', _) => (Token::Op("<"), 1),
            ('>', _) => (Token::Op(">"), 1),
            ('+', _) => (Token::Op("+"), 1),
            ('-', _) => (Token::Op("-"), 1),
            ('*', _) => (Token::Op("*"), 1),
            ('/', _) => (Token::Op("/"), 1),
            ('%', _) => (Token::Op("%"), 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            (',', _) => (Token::Comma, 1),
            ('.', _) => (Token::Dot, 1),
            _ => return Err(format!("unexpected character '{c}' at offset {offset}")),
        };
        tokens.push((token, offset));
        i += width;
    }

    tokens.push((Token::Eof, source.len()));
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct ExprParser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

/// A parsed subtree and its height.
struct Parsed {
    expr: Expr,
    height: usize,
}

impl Parsed {
    fn leaf(expr: Expr) -> Self {
        Self { expr, height: 1 }
    }
}

type ParseResult = Result<Parsed, String>;

/// Split parsed arguments into their expressions and the tallest height.
fn unzip(args: Vec<Parsed>) -> (Vec<Expr>, usize) {
    let height = args.iter().map(|arg| arg.height).max().unwrap_or(0);
    (args.into_iter().map(|arg| arg.expr).collect(), height)
}

impl ExprParser {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|(t, _)| t)
            .unwrap_or(&Token::Eof)
    }

    fn peek_with_offset(&self) -> Option<(&Token, usize)> {
        self.tokens.get(self.pos).map(|(t, o)| (t, *o))
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, o)| *o).unwrap_or(0)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Token::Ident(name) if name == keyword)
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(format!(
                "expected {expected}, found {} at offset {}",
                self.peek(),
                self.offset()
            ))
        }
    }

    fn too_deep(&self) -> String {
        format!("expression nested deeper than {} levels", self.max_depth)
    }

    fn enter(&mut self) -> Result<(), String> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(self.too_deep());
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Build a node one level above the tallest of `children`.
    ///
    /// Operator and postfix chains are parsed in loops, so the recursion
    /// counter alone does not bound how tall the tree gets.
    fn node(&self, expr: Expr, children: &[usize]) -> ParseResult {
        let height = 1 + children.iter().copied().max().unwrap_or(0);
        if height > self.max_depth {
            return Err(self.too_deep());
        }
        Ok(Parsed { expr, height })
    }

    fn conditional(&mut self) -> ParseResult {
        self.enter()?;
        let then = self.or()?;
        let parsed = if self.is_keyword("if") {
            self.advance();
            let cond = self.or()?;
            if !self.is_keyword("else") {
                return Err(format!(
                    "expected 'else', found {} at offset {}",
                    self.peek(),
                    self.offset()
                ));
            }
            self.advance();
            let otherwise = self.conditional()?;
            self.node(
                Expr::Conditional {
                    cond: Box::new(cond.expr),
                    then: Box::new(then.expr),
                    otherwise: Box::new(otherwise.expr),
                },
                &[cond.height, then.height, otherwise.height],
            )?
        } else {
            then
        };
        self.leave();
        Ok(parsed)
    }

    fn or(&mut self) -> ParseResult {
        let mut left = self.and()?;
        while self.is_keyword("or") {
            self.advance();
            let right = self.and()?;
            left = self.node(
                Expr::Or(Box::new(left.expr), Box::new(right.expr)),
                &[left.height, right.height],
            )?;
        }
        Ok(left)
    }

    fn and(&mut self) -> ParseResult {
        let mut left = self.not()?;
        while self.is_keyword("and") {
            self.advance();
            let right = self.not()?;
            left = self.node(
                Expr::And(Box::new(left.expr), Box::new(right.expr)),
                &[left.height, right.height],
            )?;
        }
        Ok(left)
    }

    fn not(&mut self) -> ParseResult {
        if self.is_keyword("not") {
            self.advance();
            self.enter()?;
            let inner = self.not()?;
            self.leave();
            return self.node(Expr::Not(Box::new(inner.expr)), &[inner.height]);
        }
        self.comparison()
    }

    fn comparison(&mut self) -> ParseResult {
        let left = self.additive()?;
        let op = match self.peek() {
            Token::Op("==") => BinaryOp::Eq,
            Token::Op("!=") => BinaryOp::NotEq,
            Token::Op("<") => BinaryOp::Lt,
            Token::Op("<=") => BinaryOp::Le,
            Token::Op(">") => BinaryOp::Gt,
            Token::Op(">=") => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.additive()?;
        if matches!(
            self.peek(),
            Token::Op("==" | "!=" | "<" | "<=" | ">" | ">=")
        ) {
            return Err(format!(
                "chained comparison at offset {}; combine comparisons with 'and'",
                self.offset()
            ));
        }
        self.node(
            Expr::Binary(op, Box::new(left.expr), Box::new(right.expr)),
            &[left.height, right.height],
        )
    }

    fn additive(&mut self) -> ParseResult {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Op("+") => BinaryOp::Add,
                Token::Op("-") => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.multiplicative()?;
            left = self.node(
                Expr::Binary(op, Box::new(left.expr), Box::new(right.expr)),
                &[left.height, right.height],
            )?;
        }
    }

    fn multiplicative(&mut self) -> ParseResult {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Op("*") => BinaryOp::Mul,
                Token::Op("/") => BinaryOp::Div,
                Token::Op("%") => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = self.node(
                Expr::Binary(op, Box::new(left.expr), Box::new(right.expr)),
                &[left.height, right.height],
            )?;
        }
    }

    fn unary(&mut self) -> ParseResult {
        if *self.peek() == Token::Op("-") {
            self.advance();
            self.enter()?;
            let inner = self.unary()?;
            self.leave();
            return self.node(Expr::Neg(Box::new(inner.expr)), &[inner.height]);
        }
        self.postfix()
    }

    fn postfix(&mut self) -> ParseResult {
        let mut parsed = self.primary()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let name = match self.advance() {
                        Token::Ident(name) => name,
                        other => {
                            return Err(format!(
                                "expected a member name after '.', found {other}"
                            ));
                        }
                    };
                    parsed = if *self.peek() == Token::LParen {
                        let (args, height) = unzip(self.arguments()?);
                        self.node(
                            Expr::Method(Box::new(parsed.expr), name, args),
                            &[parsed.height, height],
                        )?
                    } else {
                        self.node(Expr::Member(Box::new(parsed.expr), name), &[parsed.height])?
                    };
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.conditional()?;
                    self.expect(Token::RBracket)?;
                    parsed = self.node(
                        Expr::Index(Box::new(parsed.expr), Box::new(index.expr)),
                        &[parsed.height, index.height],
                    )?;
                }
                _ => return Ok(parsed),
            }
        }
    }

    fn arguments(&mut self) -> Result<Vec<Parsed>, String> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if *self.peek() == Token::RParen {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.conditional()?);
            match self.advance() {
                Token::Comma => continue,
                Token::RParen => return Ok(args),
                other => return Err(format!("expected ',' or ')', found {other}")),
            }
        }
    }

    fn primary(&mut self) -> ParseResult {
        let offset = self.offset();
        match self.advance() {
            Token::Int(i) => Ok(Parsed::leaf(Expr::Literal(Literal::Int(i)))),
            Token::Float(x) => Ok(Parsed::leaf(Expr::Literal(Literal::Float(x)))),
            Token::Str(s) => Ok(Parsed::leaf(Expr::Literal(Literal::Str(s)))),
            Token::LParen => {
                let inner = self.conditional()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => match name.as_str() {
                "true" | "True" => Ok(Parsed::leaf(Expr::Literal(Literal::Bool(true)))),
                "false" | "False" => Ok(Parsed::leaf(Expr::Literal(Literal::Bool(false)))),
                "null" | "None" => Ok(Parsed::leaf(Expr::Literal(Literal::Null))),
                _ if *self.peek() == Token::LParen => {
                    let function = Function::lookup(&name)
                        .ok_or_else(|| format!("unknown function '{name}' at offset {offset}"))?;
                    let args = self.arguments()?;
                    let (min, max) = function.arity();
                    if args.len() < min || args.len() > max {
                        return Err(format!(
                            "{}() takes {} argument(s), got {}",
                            function.name(),
                            if min == max {
                                min.to_string()
                            } else if max == usize::MAX {
                                format!("at least {min}")
                            } else {
                                format!("{min} to {max}")
                            },
                            args.len()
                        ));
                    }
                    let (args, height) = unzip(args);
                    self.node(Expr::Call(function, args), &[height])
                }
                _ => Variable::lookup(&name)
                    .map(|variable| Parsed::leaf(Expr::Var(variable)))
                    .ok_or_else(|| {
                        format!(
                            "unknown variable '{name}' at offset {offset} \
                             (available: node, index, record)"
                        )
                    }),
            },
            other => Err(format!("unexpected {other} at offset {offset}")),
        }
    }
}
