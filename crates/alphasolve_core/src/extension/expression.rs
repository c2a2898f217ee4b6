//! Arithmetic expression evaluation for the built-in executor.
//!
//! Grammar (lowest to highest precedence):
//! `sum := product (('+' | '-') product)*`,
//! `product := unary (('*' | '/') unary)*`,
//! `unary := '-' unary | power`,
//! `power := atom ('^' unary)?`,
//! `atom := number | ident | ident '(' sum ')' | '(' sum ')'`.
//!
//! Nesting through `unary` is capped at [`MAX_NESTING_DEPTH`].

use crate::model::context::{Context, VariableType};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Deepest accepted chain of signs, exponents and parentheses.
pub const MAX_NESTING_DEPTH: usize = 256;

/// Evaluation failures. `UnknownVariable` is expected for symbolic input.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionError {
    Empty,
    UnexpectedChar(char),
    UnexpectedEnd,
    UnexpectedToken(String),
    UnknownVariable(String),
    UnknownFunction(String),
    NotFinite,
    TooDeep,
}

impl Display for ExpressionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "expression is empty"),
            Self::UnexpectedChar(c) => write!(f, "unexpected character `{c}`"),
            Self::UnexpectedEnd => write!(f, "unexpected end of expression"),
            Self::UnexpectedToken(token) => write!(f, "unexpected token `{token}`"),
            Self::UnknownVariable(name) => write!(f, "no numerical value for `{name}`"),
            Self::UnknownFunction(name) => write!(f, "unknown function `{name}`"),
            Self::NotFinite => write!(f, "result is not a finite number"),
            Self::TooDeep => write!(
                f,
                "expression nests deeper than {MAX_NESTING_DEPTH} levels"
            ),
        }
    }
}

impl Error for ExpressionError {}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char),
    Open,
    Close,
}

/// Evaluates `source` using numerical variables from `context`.
pub fn evaluate(source: &str, context: &Context) -> Result<f64, ExpressionError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(ExpressionError::Empty);
    }
    let mut parser = Parser {
        tokens,
        position: 0,
        depth: 0,
        context,
    };
    let value = parser.sum()?;
    if let Some(token) = parser.peek() {
        return Err(ExpressionError::UnexpectedToken(format!("{token:?}")));
    }
    if !value.is_finite() {
        return Err(ExpressionError::NotFinite);
    }
    Ok(value)
}

/// Formats a value the way solutions are displayed: integers without `.0`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let literal: String = chars[start..i].iter().collect();
            let value = literal
                .parse::<f64>()
                .map_err(|_| ExpressionError::UnexpectedToken(literal.clone()))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            let token = match c {
                '+' | '-' | '*' | '/' | '^' => Token::Op(c),
                '(' => Token::Open,
                ')' => Token::Close,
                other => return Err(ExpressionError::UnexpectedChar(other)),
            };
            tokens.push(token);
            i += 1;
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
    context: &'a Context,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn eat_op(&mut self, ops: &[char]) -> Option<char> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.position += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn sum(&mut self) -> Result<f64, ExpressionError> {
        let mut value = self.product()?;
        while let Some(op) = self.eat_op(&['+', '-']) {
            let rhs = self.product()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn product(&mut self) -> Result<f64, ExpressionError> {
        let mut value = self.unary()?;
        while let Some(op) = self.eat_op(&['*', '/']) {
            let rhs = self.unary()?;
            value = if op == '*' { value * rhs } else { value / rhs };
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64, ExpressionError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ExpressionError::TooDeep);
        }
        self.depth += 1;
        let value = if self.eat_op(&['-']).is_some() {
            self.unary().map(|value| -value)
        } else {
            self.power()
        };
        self.depth -= 1;
        value
    }

    fn power(&mut self) -> Result<f64, ExpressionError> {
        let base = self.atom()?;
        if self.eat_op(&['^']).is_some() {
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64, ExpressionError> {
        match self.next() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::Open) => {
                let value = self.sum()?;
                self.expect_close()?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::Open) {
                    self.position += 1;
                    let argument = self.sum()?;
                    self.expect_close()?;
                    return apply_function(&name, argument);
                }
                self.lookup(&name)
            }
            Some(token) => Err(ExpressionError::UnexpectedToken(format!("{token:?}"))),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }

    fn expect_close(&mut self) -> Result<(), ExpressionError> {
        match self.next() {
            Some(Token::Close) => Ok(()),
            Some(token) => Err(ExpressionError::UnexpectedToken(format!("{token:?}"))),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }

    fn lookup(&self, name: &str) -> Result<f64, ExpressionError> {
        let from_context = self
            .context
            .get(name)
            .filter(|variable| variable.kind == VariableType::Numerical)
            .and_then(|variable| variable.first_value())
            .and_then(|value| value.trim().parse::<f64>().ok());
        match (from_context, name) {
            (Some(value), _) => Ok(value),
            (None, "pi") => Ok(std::f64::consts::PI),
            (None, "E") => Ok(std::f64::consts::E),
            (None, _) => Err(ExpressionError::UnknownVariable(name.to_string())),
        }
    }
}

fn apply_function(name: &str, argument: f64) -> Result<f64, ExpressionError> {
    let value = match name {
        "sqrt" => argument.sqrt(),
        "sin" => argument.sin(),
        "cos" => argument.cos(),
        "tan" => argument.tan(),
        "ln" => argument.ln(),
        "log" => argument.log10(),
        "exp" => argument.exp(),
        other => return Err(ExpressionError::UnknownFunction(other.to_string())),
    };
    Ok(value)
}
