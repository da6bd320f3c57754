//! Derived-measure expressions over false-call, board, and part counts.
//!
//! This is the one place the engine accepts end-user-authored logic, so the
//! grammar is fixed and validated before anything is evaluated: three
//! identifiers (`falseCalls`, `totalBoards`, `totalParts`), the four
//! arithmetic operators, parentheses, and decimal literals. Anything else is
//! rejected at parse time. Expressions compile once to an AST and evaluate
//! per record; there is no generic evaluation of user text.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::Record;
use crate::stats::safe_ratio;

/// Record fields the three identifiers resolve against. Defaults match the
/// headers MOAT/PPM uploads carry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldBindings {
    pub false_calls: String,
    pub total_boards: String,
    pub total_parts: String,
}

impl Default for FieldBindings {
    fn default() -> Self {
        FieldBindings {
            false_calls: "FalseCall Parts".to_string(),
            total_boards: "Total Boards".to_string(),
            total_parts: "Total Parts".to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ExprError {
    #[error("unexpected character '{0}' in expression")]
    UnexpectedChar(char),
    #[error("unknown identifier '{0}' (expected falseCalls, totalBoards, or totalParts)")]
    UnknownIdentifier(String),
    #[error("malformed number literal '{0}'")]
    BadNumber(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token at position {0}")]
    UnexpectedToken(usize),
    #[error("unbalanced parentheses")]
    UnbalancedParens,
    #[error("empty expression")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Ident {
    FalseCalls,
    TotalBoards,
    TotalParts,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Ident(Ident),
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
enum Ast {
    Ident(Ident),
    Number(f64),
    Neg(Box<Ast>),
    Add(Box<Ast>, Box<Ast>),
    Sub(Box<Ast>, Box<Ast>),
    Mul(Box<Ast>, Box<Ast>),
    Div(Box<Ast>, Box<Ast>),
}

/// A validated, compiled derived-measure expression.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureExpr {
    source: String,
    ast: Ast,
}

impl MeasureExpr {
    /// Validate and compile `source`. Rejects any token outside the grammar.
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(ExprError::Empty);
        }
        let mut parser = Parser { tokens: &tokens, pos: 0 };
        let ast = parser.expression()?;
        if parser.pos != tokens.len() {
            return Err(ExprError::UnexpectedToken(parser.pos));
        }
        Ok(MeasureExpr {
            source: source.to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against one record. Returns None when any referenced field is
    /// absent or non-numeric; the record is then treated as having no value
    /// for this measure rather than contributing a zero.
    pub fn evaluate(&self, record: &Record, bindings: &FieldBindings) -> Option<f64> {
        let value = eval_ast(&self.ast, record, bindings)?;
        value.is_finite().then_some(value)
    }
}

impl fmt::Display for MeasureExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn eval_ast(ast: &Ast, record: &Record, bindings: &FieldBindings) -> Option<f64> {
    match ast {
        Ast::Number(n) => Some(*n),
        Ast::Ident(ident) => {
            let field = match ident {
                Ident::FalseCalls => &bindings.false_calls,
                Ident::TotalBoards => &bindings.total_boards,
                Ident::TotalParts => &bindings.total_parts,
            };
            record.number(field)
        }
        Ast::Neg(inner) => Some(-eval_ast(inner, record, bindings)?),
        Ast::Add(a, b) => Some(eval_ast(a, record, bindings)? + eval_ast(b, record, bindings)?),
        Ast::Sub(a, b) => Some(eval_ast(a, record, bindings)? - eval_ast(b, record, bindings)?),
        Ast::Mul(a, b) => Some(eval_ast(a, record, bindings)? * eval_ast(b, record, bindings)?),
        Ast::Div(a, b) => Some(safe_ratio(
            eval_ast(a, record, bindings)?,
            eval_ast(b, record, bindings)?,
        )),
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value: f64 = literal
                    .parse()
                    .map_err(|_| ExprError::BadNumber(literal.clone()))?;
                tokens.push(Token::Number(value));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let ident = match word.as_str() {
                    "falseCalls" => Ident::FalseCalls,
                    "totalBoards" => Ident::TotalBoards,
                    "totalParts" => Ident::TotalParts,
                    _ => return Err(ExprError::UnknownIdentifier(word)),
                };
                tokens.push(Token::Ident(ident));
            }
            other => return Err(ExprError::UnexpectedChar(other)),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    fn expression(&mut self) -> Result<Ast, ExprError> {
        let mut node = self.term()?;
        while let Some(token) = self.peek() {
            match token {
                Token::Plus => {
                    self.pos += 1;
                    node = Ast::Add(Box::new(node), Box::new(self.term()?));
                }
                Token::Minus => {
                    self.pos += 1;
                    node = Ast::Sub(Box::new(node), Box::new(self.term()?));
                }
                _ => break,
            }
        }
        Ok(node)
    }

    fn term(&mut self) -> Result<Ast, ExprError> {
        let mut node = self.factor()?;
        while let Some(token) = self.peek() {
            match token {
                Token::Star => {
                    self.pos += 1;
                    node = Ast::Mul(Box::new(node), Box::new(self.factor()?));
                }
                Token::Slash => {
                    self.pos += 1;
                    node = Ast::Div(Box::new(node), Box::new(self.factor()?));
                }
                _ => break,
            }
        }
        Ok(node)
    }

    fn factor(&mut self) -> Result<Ast, ExprError> {
        match self.advance().ok_or(ExprError::UnexpectedEnd)? {
            Token::Number(n) => Ok(Ast::Number(n)),
            Token::Ident(ident) => Ok(Ast::Ident(ident)),
            Token::Minus => Ok(Ast::Neg(Box::new(self.factor()?))),
            Token::LParen => {
                let inner = self.expression()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(ExprError::UnbalancedParens),
                }
            }
            _ => Err(ExprError::UnexpectedToken(self.pos - 1)),
        }
    }
}
