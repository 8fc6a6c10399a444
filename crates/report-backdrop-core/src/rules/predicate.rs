//! Page predicates for expression rules.
//!
//! A predicate is a small boolean expression evaluated once per page:
//!
//! ```text
//! page % 2 == 0
//! page in [2, 4, 8] or page == page_count
//! 1 < page < page_count and not page == 3
//! ```
//!
//! Variables are `page` (1-based) and `page_count` (alias `pages`).
//! Integers, `true`/`false`, lists, `+ - * / // %`, chainable comparisons,
//! `in`/`not in` and `and`/`or`/`not` (or `&& || !`) are supported.
//! Division is integer floor division and `%` takes the sign of the divisor.
//! Any value can be used as a condition: zero, `false` and `[]` are false.

use std::fmt;

use super::plan::PageContext;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Var {
    Page,
    PageCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Int(i64),
    Bool(bool),
    Var(Var),
    List(Vec<Expr>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Self::Int(i) => *i != 0,
            Self::Bool(b) => *b,
            Self::List(items) => !items.is_empty(),
        }
    }

    fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::List(_) => None,
        }
    }

    fn loosely_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loosely_equals(y))
            }
            (Self::List(_), _) | (_, Self::List(_)) => false,
            _ => self.as_int() == other.as_int(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::List(_) => write!(f, "list"),
        }
    }
}

// =============================================================================
// Lexer
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Int(i64),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
}

fn tokenize(source: &str) -> std::result::Result<Vec<(usize, Token)>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '_') {
                i += 1;
            }
            let text: String = chars[start..i].iter().filter(|c| **c != '_').collect();
            let value = text
                .parse::<i64>()
                .map_err(|_| format!("integer literal too large at {start}"))?;
            tokens.push((start, Token::Int(value)));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push((start, Token::Ident(chars[start..i].iter().collect())));
            continue;
        }

        let next = chars.get(i + 1).copied();
        let (token, width) = match (c, next) {
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            (',', _) => (Token::Comma, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', Some('/')) => (Token::SlashSlash, 2),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('=', Some('=')) => (Token::EqEq, 2),
            ('!', Some('=')) => (Token::NotEq, 2),
            ('!', _) => (Token::Bang, 1),
            ('<', Some('=')) => (Token::Le, 2),
            ('<', _) => (Token::Lt, 1),
            ('>', Some('=')) => (Token::Ge, 2),
            ('>', _) => (Token::Gt, 1),
            ('&', Some('&')) => (Token::AndAnd, 2),
            ('|', Some('|')) => (Token::OrOr, 2),
            _ => return Err(format!("unexpected character '{c}' at {start}")),
        };
        tokens.push((start, token));
        i += width;
    }

    Ok(tokens)
}

// =============================================================================
// Parser
// =============================================================================

/// Deepest expression tree the parser builds. Parsing, evaluation and drop
/// all recurse over the tree, so this also bounds their stack use.
const MAX_NESTING: usize = 100;

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn nest(&mut self) -> std::result::Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(format!("expression nested too deeply at {}", self.offset()));
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(usize::MAX, |(o, _)| *o)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(w)) if w == word)
    }

    fn expect(&mut self, expected: &Token, what: &str) -> std::result::Result<(), String> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, what: &str) -> String {
        match self.peek() {
            Some(token) => format!("expected {what}, found {token:?} at {}", self.offset()),
            None => format!("expected {what}, found end of expression"),
        }
    }

    fn parse_or(&mut self) -> std::result::Result<Expr, String> {
        let depth = self.depth;
        let mut left = self.parse_and()?;
        while self.is_keyword("or") || self.peek() == Some(&Token::OrOr) {
            self.nest()?;
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_and(&mut self) -> std::result::Result<Expr, String> {
        let depth = self.depth;
        let mut left = self.parse_not()?;
        while self.is_keyword("and") || self.peek() == Some(&Token::AndAnd) {
            self.nest()?;
            self.advance();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_not(&mut self) -> std::result::Result<Expr, String> {
        if self.is_keyword("not") || self.peek() == Some(&Token::Bang) {
            self.nest()?;
            self.advance();
            let inner = self.parse_not()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn comparison_op(&self) -> Option<(CmpOp, usize)> {
        match self.peek()? {
            Token::EqEq => Some((CmpOp::Eq, 1)),
            Token::NotEq => Some((CmpOp::Ne, 1)),
            Token::Lt => Some((CmpOp::Lt, 1)),
            Token::Le => Some((CmpOp::Le, 1)),
            Token::Gt => Some((CmpOp::Gt, 1)),
            Token::Ge => Some((CmpOp::Ge, 1)),
            Token::Ident(w) if w == "in" => Some((CmpOp::In, 1)),
            Token::Ident(w) if w == "not" => {
                matches!(self.peek_at(1), Some(Token::Ident(n)) if n == "in")
                    .then_some((CmpOp::NotIn, 2))
            }
            _ => None,
        }
    }

    fn parse_comparison(&mut self) -> std::result::Result<Expr, String> {
        let first = self.parse_sum()?;
        let mut rest = Vec::new();
        while let Some((op, width)) = self.comparison_op() {
            self.pos += width;
            rest.push((op, self.parse_sum()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), rest))
        }
    }

    fn parse_sum(&mut self) -> std::result::Result<Expr, String> {
        let depth = self.depth;
        let mut left = self.parse_product()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => {
                    self.depth = depth;
                    return Ok(left);
                }
            };
            self.nest()?;
            self.advance();
            let right = self.parse_product()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_product(&mut self) -> std::result::Result<Expr, String> {
        let depth = self.depth;
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ArithOp::Mul,
                Some(Token::Slash | Token::SlashSlash) => ArithOp::Div,
                Some(Token::Percent) => ArithOp::Mod,
                _ => {
                    self.depth = depth;
                    return Ok(left);
                }
            };
            self.nest()?;
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> std::result::Result<Expr, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.nest()?;
                self.advance();
                let inner = self.parse_unary()?;
                self.depth -= 1;
                Ok(Expr::Neg(Box::new(inner)))
            }
            Some(Token::Plus) => {
                self.nest()?;
                self.advance();
                let inner = self.parse_unary()?;
                self.depth -= 1;
                Ok(inner)
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_sequence(&mut self, close: &Token) -> std::result::Result<(Vec<Expr>, bool), String> {
        self.nest()?;
        let mut items = Vec::new();
        let mut trailing_comma = false;
        while self.peek() != Some(close) {
            items.push(self.parse_or()?);
            if self.peek() == Some(&Token::Comma) {
                self.advance();
                trailing_comma = true;
            } else {
                trailing_comma = false;
                break;
            }
        }
        self.expect(close, "closing bracket")?;
        self.depth -= 1;
        Ok((items, trailing_comma))
    }

    fn parse_primary(&mut self) -> std::result::Result<Expr, String> {
        let offset = self.offset();
        match self.advance() {
            Some(Token::Int(i)) => Ok(Expr::Int(i)),
            Some(Token::Ident(word)) => match word.as_str() {
                "true" | "True" => Ok(Expr::Bool(true)),
                "false" | "False" => Ok(Expr::Bool(false)),
                "page" => Ok(Expr::Var(Var::Page)),
                "page_count" | "pages" => Ok(Expr::Var(Var::PageCount)),
                other => Err(format!("unknown name '{other}' at {offset}")),
            },
            Some(Token::LParen) => {
                let (mut items, trailing_comma) = self.parse_sequence(&Token::RParen)?;
                if items.len() == 1 && !trailing_comma {
                    Ok(items.remove(0))
                } else if items.is_empty() {
                    Err(format!("empty parentheses at {offset}"))
                } else {
                    Ok(Expr::List(items))
                }
            }
            Some(Token::LBracket) => {
                let (items, _) = self.parse_sequence(&Token::RBracket)?;
                Ok(Expr::List(items))
            }
            Some(token) => Err(format!("unexpected {token:?} at {offset}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

// =============================================================================
// Evaluation
// =============================================================================

fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        r.checked_add(b)
    } else {
        Some(r)
    }
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let r = floor_mod(a, b)?;
    a.checked_sub(r)?.checked_div(b)
}

fn arith(op: ArithOp, a: i64, b: i64) -> std::result::Result<i64, String> {
    let result = match op {
        ArithOp::Add => a.checked_add(b),
        ArithOp::Sub => a.checked_sub(b),
        ArithOp::Mul => a.checked_mul(b),
        ArithOp::Div | ArithOp::Mod if b == 0 => return Err("division by zero".to_string()),
        ArithOp::Div => floor_div(a, b),
        ArithOp::Mod => floor_mod(a, b),
    };
    result.ok_or_else(|| "integer overflow".to_string())
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> std::result::Result<bool, String> {
    match op {
        CmpOp::Eq => Ok(left.loosely_equals(right)),
        CmpOp::Ne => Ok(!left.loosely_equals(right)),
        CmpOp::In | CmpOp::NotIn => {
            let Value::List(items) = right else {
                return Err(format!("'in' needs a list on the right, found {right}"));
            };
            let found = items.iter().any(|item| item.loosely_equals(left));
            Ok(if op == CmpOp::In { found } else { !found })
        }
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let (Some(a), Some(b)) = (left.as_int(), right.as_int()) else {
                return Err("cannot order lists".to_string());
            };
            Ok(match op {
                CmpOp::Lt => a < b,
                CmpOp::Le => a <= b,
                CmpOp::Gt => a > b,
                _ => a >= b,
            })
        }
    }
}

fn eval(expr: &Expr, ctx: &PageContext) -> std::result::Result<Value, String> {
    match expr {
        Expr::Int(i) => Ok(Value::Int(*i)),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Var(Var::Page) => Ok(Value::Int(i64::from(ctx.page))),
        Expr::Var(Var::PageCount) => Ok(Value::Int(i64::from(ctx.page_count))),
        Expr::List(items) => items
            .iter()
            .map(|item| eval(item, ctx))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Value::List),
        Expr::Neg(inner) => {
            let value = eval(inner, ctx)?;
            let i = value
                .as_int()
                .ok_or_else(|| "cannot negate a list".to_string())?;
            i.checked_neg()
                .map(Value::Int)
                .ok_or_else(|| "integer overflow".to_string())
        }
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, ctx)?.truthy())),
        Expr::Arith(op, left, right) => {
            let l = eval(left, ctx)?;
            let r = eval(right, ctx)?;
            let (Some(a), Some(b)) = (l.as_int(), r.as_int()) else {
                return Err("arithmetic on a list".to_string());
            };
            arith(*op, a, b).map(Value::Int)
        }
        Expr::And(left, right) => {
            if !eval(left, ctx)?.truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval(right, ctx)?.truthy()))
        }
        Expr::Or(left, right) => {
            if eval(left, ctx)?.truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval(right, ctx)?.truthy()))
        }
        Expr::Compare(first, rest) => {
            let mut left = eval(first, ctx)?;
            for (op, operand) in rest {
                let right = eval(operand, ctx)?;
                if !compare(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
    }
}

/// A compiled page predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    source: String,
    expr: Expr,
}

impl Predicate {
    /// Parse a predicate, rejecting unknown names and malformed syntax.
    pub fn parse(source: &str) -> Result<Self> {
        let fail = |reason: String| Error::RuleExpression {
            expr: source.to_string(),
            reason,
        };

        let tokens = tokenize(source).map_err(fail)?;
        if tokens.is_empty() {
            return Err(fail("empty expression".to_string()));
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.parse_or().map_err(fail)?;
        if parser.peek().is_some() {
            return Err(fail(parser.unexpected("end of expression")));
        }

        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// Evaluate against a page; errors (division by zero, type errors) propagate.
    pub fn eval(&self, ctx: &PageContext) -> Result<bool> {
        eval(&self.expr, ctx)
            .map(|value| value.truthy())
            .map_err(|reason| Error::RuleExpression {
                expr: self.source.clone(),
                reason: format!("{reason} (page {} of {})", ctx.page, ctx.page_count),
            })
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}
