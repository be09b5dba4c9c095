//! Recursive-descent parser producing a compiled expression
//!
//! Precedence, loosest first: `or`, `and`, `not`, comparison. Comparison
//! operators do not chain (`a < b < c` is a parse error). Regex patterns are
//! compiled here so evaluation never pays the compile cost.

use regex::Regex;

use crate::eval;
use crate::lexer::{tokenize, Spanned, Token};
use crate::{ExpressionError, Result};
use sluice_event::Event;

/// Comparison operators over two operands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub(crate) fn name(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Parsed expression tree
#[derive(Debug)]
pub(crate) enum Node {
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Not(Box<Node>),
    Compare(CompareOp, Box<Node>, Box<Node>),
    RegexMatch {
        operand: Box<Node>,
        pattern: Regex,
        negated: bool,
    },
    In {
        operand: Box<Node>,
        list: Vec<Node>,
        negated: bool,
    },
    Field(String),
    LitInt(i64),
    LitFloat(f64),
    LitStr(String),
    LitBool(bool),
}

/// A compiled boolean predicate
///
/// Parse once, evaluate many times; evaluation is read-only over the event.
#[derive(Debug)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    /// Compile a statement
    pub fn parse(statement: &str) -> Result<Self> {
        let tokens = tokenize(statement)?;
        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.parse_or()?;
        if let Some(extra) = parser.peek() {
            return Err(ExpressionError::parse(
                extra.offset,
                "trailing input after expression",
            ));
        }
        Ok(Self {
            source: statement.to_string(),
            root,
        })
    }

    /// Evaluate against an event, producing a boolean
    pub fn evaluate(&self, event: &Event) -> Result<bool> {
        eval::evaluate_boolean(&self.root, event)
    }

    /// The original statement text
    pub fn source(&self) -> &str {
        &self.source
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Spanned> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek().map(|s| &s.token) == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn offset(&self) -> usize {
        self.peek().map(|s| s.offset).unwrap_or(usize::MAX)
    }

    fn parse_or(&mut self) -> Result<Node> {
        let mut node = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            node = Node::Or(Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn parse_and(&mut self) -> Result<Node> {
        let mut node = self.parse_not()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_not()?;
            node = Node::And(Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn parse_not(&mut self) -> Result<Node> {
        // `not in` belongs to the comparison below, so only treat `not` as a
        // prefix when it is not immediately followed by `in`
        if self.peek().map(|s| &s.token) == Some(&Token::Not)
            && self.tokens.get(self.pos + 1).map(|s| &s.token) != Some(&Token::In)
        {
            self.pos += 1;
            let inner = self.parse_not()?;
            return Ok(Node::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Node> {
        let lhs = self.parse_operand()?;

        let op = match self.peek().map(|s| s.token.clone()) {
            Some(Token::Eq) => Some(CompareOp::Eq),
            Some(Token::Ne) => Some(CompareOp::Ne),
            Some(Token::Lt) => Some(CompareOp::Lt),
            Some(Token::Le) => Some(CompareOp::Le),
            Some(Token::Gt) => Some(CompareOp::Gt),
            Some(Token::Ge) => Some(CompareOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let rhs = self.parse_operand()?;
            return Ok(Node::Compare(op, Box::new(lhs), Box::new(rhs)));
        }

        if self.peek().map(|s| &s.token) == Some(&Token::RegexMatch)
            || self.peek().map(|s| &s.token) == Some(&Token::RegexNotMatch)
        {
            let negated = self.next().map(|s| s.token) == Some(Token::RegexNotMatch);
            let offset = self.offset();
            let pattern = match self.next().map(|s| s.token) {
                Some(Token::Str(p)) => p,
                _ => {
                    return Err(ExpressionError::parse(
                        offset,
                        "regex operator requires a string pattern",
                    ))
                }
            };
            let compiled = Regex::new(&pattern).map_err(|e| ExpressionError::InvalidRegex {
                pattern,
                message: e.to_string(),
            })?;
            return Ok(Node::RegexMatch {
                operand: Box::new(lhs),
                pattern: compiled,
                negated,
            });
        }

        let negated = if self.peek().map(|s| &s.token) == Some(&Token::Not) {
            // `not in`
            self.pos += 1;
            if !self.eat(&Token::In) {
                return Err(ExpressionError::parse(self.offset(), "expected `in`"));
            }
            Some(true)
        } else if self.eat(&Token::In) {
            Some(false)
        } else {
            None
        };
        if let Some(negated) = negated {
            let list = self.parse_list()?;
            return Ok(Node::In {
                operand: Box::new(lhs),
                list,
                negated,
            });
        }

        Ok(lhs)
    }

    fn parse_list(&mut self) -> Result<Vec<Node>> {
        if !self.eat(&Token::LBracket) {
            return Err(ExpressionError::parse(self.offset(), "expected `[`"));
        }
        let mut items = Vec::new();
        if self.eat(&Token::RBracket) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_operand()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            if self.eat(&Token::RBracket) {
                break;
            }
            return Err(ExpressionError::parse(self.offset(), "expected `,` or `]`"));
        }
        Ok(items)
    }

    fn parse_operand(&mut self) -> Result<Node> {
        let offset = self.offset();
        match self.next().map(|s| s.token) {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                if !self.eat(&Token::RParen) {
                    return Err(ExpressionError::parse(self.offset(), "expected `)`"));
                }
                Ok(inner)
            }
            Some(Token::Field(path)) => Ok(Node::Field(path)),
            Some(Token::Int(i)) => Ok(Node::LitInt(i)),
            Some(Token::Float(f)) => Ok(Node::LitFloat(f)),
            Some(Token::Str(s)) => Ok(Node::LitStr(s)),
            Some(Token::True) => Ok(Node::LitBool(true)),
            Some(Token::False) => Ok(Node::LitBool(false)),
            Some(other) => Err(ExpressionError::parse(
                offset,
                format!("unexpected token {other:?}"),
            )),
            None => Err(ExpressionError::parse(offset, "unexpected end of input")),
        }
    }
}

#[cfg(test)]
#[path = "parser_test.rs"]
mod tests;
