//! Pratt parser producing the field path AST.

use serde_json::Value;

use super::lexer::{Token, TokenKind, tokenize};
use crate::error::PathError;

/// Comparison operators usable in filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Comparator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Ast {
    /// `@`, the node being evaluated.
    Current,
    Field(String),
    Subexpression(Box<Ast>, Box<Ast>),
    Index(i64),
    /// Evaluate the right side against each element of the left side's array.
    Projection(Box<Ast>, Box<Ast>),
    /// Evaluate the right side against each value of the left side's object.
    ValueProjection(Box<Ast>, Box<Ast>),
    Flatten(Box<Ast>),
    FilterProjection {
        lhs: Box<Ast>,
        rhs: Box<Ast>,
        condition: Box<Ast>,
    },
    Compare(Comparator, Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
    And(Box<Ast>, Box<Ast>),
    Not(Box<Ast>),
    Pipe(Box<Ast>, Box<Ast>),
    Literal(Value),
    MultiList(Vec<Ast>),
    MultiHash(Vec<(String, Ast)>),
    Function(String, Vec<Ast>),
}

/// Tokens binding below this value end a projection's right-hand side.
const PROJECTION_STOP: u8 = 10;

fn binding_power(kind: &TokenKind) -> u8 {
    match kind {
        TokenKind::Pipe => 1,
        TokenKind::Or => 2,
        TokenKind::And => 3,
        TokenKind::Eq
        | TokenKind::Ne
        | TokenKind::Lt
        | TokenKind::Lte
        | TokenKind::Gt
        | TokenKind::Gte => 5,
        TokenKind::Flatten => 9,
        TokenKind::Star => 20,
        TokenKind::Filter => 21,
        TokenKind::Dot => 40,
        TokenKind::Not => 45,
        TokenKind::LBrace => 50,
        TokenKind::LBracket => 55,
        TokenKind::LParen => 60,
        _ => 0,
    }
}

/// Number of arguments accepted by each supported function.
fn arity(name: &str) -> Option<std::ops::RangeInclusive<usize>> {
    match name {
        "contains" | "join" | "starts_with" => Some(2..=2),
        "length" | "keys" | "values" | "to_string" => Some(1..=1),
        "not_null" => Some(1..=usize::MAX),
        _ => None,
    }
}

pub(crate) fn parse(expression: &str) -> Result<Ast, PathError> {
    let mut parser = Parser {
        expression,
        tokens: tokenize(expression)?,
        pos: 0,
    };
    let ast = parser.expression(0)?;
    match parser.peek() {
        TokenKind::Eof => Ok(ast),
        other => Err(parser.error(&format!("unexpected token {other:?}"))),
    }
}

struct Parser<'a> {
    expression: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &TokenKind {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + n).min(last)].kind
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn expect(&mut self, expected: TokenKind) -> Result<(), PathError> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("expected {expected:?}, found {:?}", self.peek())))
        }
    }

    fn error(&self, message: &str) -> PathError {
        let last = self.tokens.len() - 1;
        PathError::Syntax {
            expression: self.expression.to_string(),
            offset: self.tokens[self.pos.min(last)].offset,
            message: message.to_string(),
        }
    }

    fn expression(&mut self, rbp: u8) -> Result<Ast, PathError> {
        let token = self.advance();
        let mut left = self.nud(token)?;
        while rbp < binding_power(self.peek()) {
            let token = self.advance();
            left = self.led(token, left)?;
        }
        Ok(left)
    }

    fn nud(&mut self, token: TokenKind) -> Result<Ast, PathError> {
        match token {
            TokenKind::Identifier(name) => Ok(Ast::Field(name)),
            TokenKind::QuotedIdentifier(name) => {
                if *self.peek() == TokenKind::LParen {
                    return Err(self.error("quoted identifiers cannot be used as function names"));
                }
                Ok(Ast::Field(name))
            }
            TokenKind::Literal(value) => Ok(Ast::Literal(value)),
            TokenKind::At => Ok(Ast::Current),
            TokenKind::Star => {
                let rhs = self.projection_rhs(binding_power(&TokenKind::Star))?;
                Ok(Ast::ValueProjection(Box::new(Ast::Current), Box::new(rhs)))
            }
            TokenKind::Flatten => {
                let lhs = Ast::Flatten(Box::new(Ast::Current));
                let rhs = self.projection_rhs(binding_power(&TokenKind::Flatten))?;
                Ok(Ast::Projection(Box::new(lhs), Box::new(rhs)))
            }
            TokenKind::Filter => self.filter(Ast::Current),
            TokenKind::LBrace => self.multi_hash(),
            TokenKind::LParen => {
                let inner = self.expression(0)?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Not => {
                let inner = self.expression(binding_power(&TokenKind::Not))?;
                Ok(Ast::Not(Box::new(inner)))
            }
            TokenKind::LBracket => match (self.peek().clone(), self.peek_at(1).clone()) {
                (TokenKind::Number(index), TokenKind::RBracket) => {
                    self.advance();
                    self.advance();
                    Ok(Ast::Index(index))
                }
                (TokenKind::Star, TokenKind::RBracket) => {
                    self.advance();
                    self.advance();
                    let rhs = self.projection_rhs(binding_power(&TokenKind::Star))?;
                    Ok(Ast::Projection(Box::new(Ast::Current), Box::new(rhs)))
                }
                (TokenKind::Colon, _) | (TokenKind::Number(_), TokenKind::Colon) => {
                    Err(self.error("slices are not supported"))
                }
                _ => self.multi_list(),
            },
            other => Err(self.error(&format!("unexpected token {other:?}"))),
        }
    }

    fn led(&mut self, token: TokenKind, left: Ast) -> Result<Ast, PathError> {
        match token {
            TokenKind::Dot => {
                if *self.peek() == TokenKind::Star {
                    self.advance();
                    let rhs = self.projection_rhs(binding_power(&TokenKind::Dot))?;
                    Ok(Ast::ValueProjection(Box::new(left), Box::new(rhs)))
                } else {
                    let rhs = self.dot_rhs(binding_power(&TokenKind::Dot))?;
                    Ok(Ast::Subexpression(Box::new(left), Box::new(rhs)))
                }
            }
            TokenKind::Pipe => {
                let rhs = self.expression(binding_power(&TokenKind::Pipe))?;
                Ok(Ast::Pipe(Box::new(left), Box::new(rhs)))
            }
            TokenKind::Or => {
                let rhs = self.expression(binding_power(&TokenKind::Or))?;
                Ok(Ast::Or(Box::new(left), Box::new(rhs)))
            }
            TokenKind::And => {
                let rhs = self.expression(binding_power(&TokenKind::And))?;
                Ok(Ast::And(Box::new(left), Box::new(rhs)))
            }
            TokenKind::Eq => self.comparison(Comparator::Eq, left),
            TokenKind::Ne => self.comparison(Comparator::Ne, left),
            TokenKind::Lt => self.comparison(Comparator::Lt, left),
            TokenKind::Lte => self.comparison(Comparator::Lte, left),
            TokenKind::Gt => self.comparison(Comparator::Gt, left),
            TokenKind::Gte => self.comparison(Comparator::Gte, left),
            TokenKind::Flatten => {
                let lhs = Ast::Flatten(Box::new(left));
                let rhs = self.projection_rhs(binding_power(&TokenKind::Flatten))?;
                Ok(Ast::Projection(Box::new(lhs), Box::new(rhs)))
            }
            TokenKind::Filter => self.filter(left),
            TokenKind::LBracket => match self.peek().clone() {
                TokenKind::Number(index) => {
                    self.advance();
                    self.expect(TokenKind::RBracket)?;
                    Ok(Ast::Subexpression(Box::new(left), Box::new(Ast::Index(index))))
                }
                TokenKind::Star => {
                    self.advance();
                    self.expect(TokenKind::RBracket)?;
                    let rhs = self.projection_rhs(binding_power(&TokenKind::Star))?;
                    Ok(Ast::Projection(Box::new(left), Box::new(rhs)))
                }
                TokenKind::Colon => Err(self.error("slices are not supported")),
                other => Err(self.error(&format!("unexpected token {other:?} after '['"))),
            },
            TokenKind::LParen => self.function(left),
            other => Err(self.error(&format!("unexpected token {other:?}"))),
        }
    }

    fn comparison(&mut self, comparator: Comparator, left: Ast) -> Result<Ast, PathError> {
        let rhs = self.expression(binding_power(&TokenKind::Eq))?;
        Ok(Ast::Compare(comparator, Box::new(left), Box::new(rhs)))
    }

    fn filter(&mut self, left: Ast) -> Result<Ast, PathError> {
        let condition = self.expression(0)?;
        self.expect(TokenKind::RBracket)?;
        let rhs = self.projection_rhs(binding_power(&TokenKind::Filter))?;
        Ok(Ast::FilterProjection {
            lhs: Box::new(left),
            rhs: Box::new(rhs),
            condition: Box::new(condition),
        })
    }

    fn function(&mut self, left: Ast) -> Result<Ast, PathError> {
        let Ast::Field(name) = left else {
            return Err(self.error("only identifiers can be called as functions"));
        };

        let mut args = Vec::new();
        while *self.peek() != TokenKind::RParen {
            args.push(self.expression(0)?);
            if *self.peek() == TokenKind::Comma {
                self.advance();
            }
        }
        self.expect(TokenKind::RParen)?;

        let Some(expected) = arity(&name) else {
            return Err(PathError::UnknownFunction {
                expression: self.expression.to_string(),
                name,
            });
        };
        if !expected.contains(&args.len()) {
            return Err(PathError::Arity {
                expression: self.expression.to_string(),
                name,
                given: args.len(),
            });
        }
        Ok(Ast::Function(name, args))
    }

    fn projection_rhs(&mut self, rbp: u8) -> Result<Ast, PathError> {
        match self.peek() {
            kind if binding_power(kind) < PROJECTION_STOP => Ok(Ast::Current),
            TokenKind::LBracket | TokenKind::Filter => self.expression(rbp),
            TokenKind::Dot => {
                self.advance();
                self.dot_rhs(rbp)
            }
            other => Err(self.error(&format!("unexpected token {other:?} after projection"))),
        }
    }

    fn dot_rhs(&mut self, rbp: u8) -> Result<Ast, PathError> {
        match self.peek() {
            TokenKind::Identifier(_) | TokenKind::QuotedIdentifier(_) | TokenKind::Star => {
                self.expression(rbp)
            }
            TokenKind::LBracket => {
                self.advance();
                self.multi_list()
            }
            TokenKind::LBrace => {
                self.advance();
                self.multi_hash()
            }
            other => Err(self.error(&format!("unexpected token {other:?} after '.'"))),
        }
    }

    /// Parse `expr, expr, ...]` after an opening bracket.
    fn multi_list(&mut self) -> Result<Ast, PathError> {
        let mut items = Vec::new();
        loop {
            items.push(self.expression(0)?);
            match self.advance() {
                TokenKind::Comma => continue,
                TokenKind::RBracket => break,
                other => return Err(self.error(&format!("expected ',' or ']', found {other:?}"))),
            }
        }
        Ok(Ast::MultiList(items))
    }

    /// Parse `key: expr, ...}` after an opening brace.
    fn multi_hash(&mut self) -> Result<Ast, PathError> {
        let mut pairs = Vec::new();
        loop {
            let key = match self.advance() {
                TokenKind::Identifier(key) | TokenKind::QuotedIdentifier(key) => key,
                other => return Err(self.error(&format!("expected a key, found {other:?}"))),
            };
            self.expect(TokenKind::Colon)?;
            pairs.push((key, self.expression(0)?));
            match self.advance() {
                TokenKind::Comma => continue,
                TokenKind::RBrace => break,
                other => return Err(self.error(&format!("expected ',' or '}}', found {other:?}"))),
            }
        }
        Ok(Ast::MultiHash(pairs))
    }
}
