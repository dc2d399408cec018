//! Tokenizer for field path expressions.

use serde_json::Value;

use crate::error::PathError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Identifier(String),
    QuotedIdentifier(String),
    Number(i64),
    Literal(Value),
    Dot,
    Star,
    Flatten,
    Filter,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Colon,
    At,
    Pipe,
    Or,
    And,
    Not,
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

pub(crate) fn tokenize(expression: &str) -> Result<Vec<Token>, PathError> {
    Lexer {
        expression,
        chars: expression.char_indices().collect(),
        pos: 0,
    }
    .run()
}

struct Lexer<'a> {
    expression: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl Lexer<'_> {
    fn run(mut self) -> Result<Vec<Token>, PathError> {
        let mut tokens = Vec::new();

        while let Some((offset, c)) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
                continue;
            }

            let kind = match c {
                '.' => self.single(TokenKind::Dot),
                '*' => self.single(TokenKind::Star),
                ']' => self.single(TokenKind::RBracket),
                '{' => self.single(TokenKind::LBrace),
                '}' => self.single(TokenKind::RBrace),
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                ',' => self.single(TokenKind::Comma),
                ':' => self.single(TokenKind::Colon),
                '@' => self.single(TokenKind::At),
                '[' => {
                    self.pos += 1;
                    match self.peek_char() {
                        Some('?') => self.single(TokenKind::Filter),
                        Some(']') => self.single(TokenKind::Flatten),
                        _ => TokenKind::LBracket,
                    }
                }
                '|' => self.either('|', TokenKind::Or, TokenKind::Pipe),
                '&' => {
                    self.pos += 1;
                    if self.peek_char() == Some('&') {
                        self.single(TokenKind::And)
                    } else {
                        return Err(self.error(offset, "expression references ('&') are not supported"));
                    }
                }
                '!' => self.either('=', TokenKind::Ne, TokenKind::Not),
                '<' => self.either('=', TokenKind::Lte, TokenKind::Lt),
                '>' => self.either('=', TokenKind::Gte, TokenKind::Gt),
                '=' => {
                    self.pos += 1;
                    if self.peek_char() == Some('=') {
                        self.single(TokenKind::Eq)
                    } else {
                        return Err(self.error(offset, "expected '==', found '='"));
                    }
                }
                '"' => TokenKind::QuotedIdentifier(self.quoted_identifier(offset)?),
                '\'' => TokenKind::Literal(Value::String(self.raw_string(offset)?)),
                '`' => TokenKind::Literal(self.json_literal(offset)?),
                '-' | '0'..='9' => TokenKind::Number(self.number(offset)?),
                c if c.is_ascii_alphabetic() || c == '_' => TokenKind::Identifier(self.identifier()),
                other => return Err(self.error(offset, &format!("unexpected character '{other}'"))),
            };

            tokens.push(Token { kind, offset });
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            offset: self.expression.len(),
        });
        Ok(tokens)
    }

    fn peek(&self) -> Option<(usize, char)> {
        self.chars.get(self.pos).copied()
    }

    fn peek_char(&self) -> Option<char> {
        self.peek().map(|(_, c)| c)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    /// Consume the current character, plus `next` when it follows.
    fn either(&mut self, next: char, double: TokenKind, single: TokenKind) -> TokenKind {
        self.pos += 1;
        if self.peek_char() == Some(next) {
            self.pos += 1;
            double
        } else {
            single
        }
    }

    fn identifier(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() || c == '_' {
                out.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        out
    }

    fn number(&mut self, offset: usize) -> Result<i64, PathError> {
        let mut digits = String::new();
        if self.peek_char() == Some('-') {
            digits.push('-');
            self.pos += 1;
        }
        while let Some(c) = self.peek_char().filter(char::is_ascii_digit) {
            digits.push(c);
            self.pos += 1;
        }
        digits
            .parse()
            .map_err(|_| self.error(offset, &format!("invalid number '{digits}'")))
    }

    /// Collect everything up to the unescaped `delimiter`, keeping escapes verbatim.
    fn delimited(&mut self, offset: usize, delimiter: char) -> Result<String, PathError> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek_char() {
                None => {
                    return Err(self.error(offset, &format!("unterminated {delimiter} delimited token")));
                }
                Some('\\') => {
                    out.push('\\');
                    self.pos += 1;
                    if let Some(c) = self.peek_char() {
                        out.push(c);
                        self.pos += 1;
                    }
                }
                Some(c) if c == delimiter => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn quoted_identifier(&mut self, offset: usize) -> Result<String, PathError> {
        let body = self.delimited(offset, '"')?;
        serde_json::from_str(&format!("\"{body}\""))
            .map_err(|e| self.error(offset, &format!("invalid quoted identifier: {e}")))
    }

    fn raw_string(&mut self, offset: usize) -> Result<String, PathError> {
        let body = self.delimited(offset, '\'')?;
        Ok(body.replace("\\'", "'"))
    }

    /// A JSON literal. Bodies that are not valid JSON are read as bare
    /// strings, matching older JMESPath implementations (`` `us-east-1` ``).
    fn json_literal(&mut self, offset: usize) -> Result<Value, PathError> {
        let body = self.delimited(offset, '`')?.replace("\\`", "`");
        let body = body.trim();
        Ok(serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string())))
    }

    fn error(&self, offset: usize, message: &str) -> PathError {
        PathError::Syntax {
            expression: self.expression.to_string(),
            offset,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(expression: &str) -> Vec<TokenKind> {
        tokenize(expression)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a[?b != `1`] || c[] | [0]"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Filter,
                TokenKind::Identifier("b".into()),
                TokenKind::Ne,
                TokenKind::Literal(Value::from(1)),
                TokenKind::RBracket,
                TokenKind::Or,
                TokenKind::Identifier("c".into()),
                TokenKind::Flatten,
                TokenKind::Pipe,
                TokenKind::LBracket,
                TokenKind::Number(0),
                TokenKind::RBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_strings_and_identifiers() {
        assert_eq!(
            kinds(r#""Name" 'it\'s' `"us-east-1"`"#),
            vec![
                TokenKind::QuotedIdentifier("Name".into()),
                TokenKind::Literal(Value::from("it's")),
                TokenKind::Literal(Value::from("us-east-1")),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_offsets() {
        let tokens = tokenize("ab.cd").unwrap();
        assert_eq!(tokens[1].offset, 2);
        assert_eq!(tokens[2].offset, 3);
    }

    #[test]
    fn test_unterminated_literal() {
        let err = tokenize("`[1, 2").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_legacy_bare_literal() {
        assert_eq!(
            kinds("`us-east-1`"),
            vec![TokenKind::Literal(Value::from("us-east-1")), TokenKind::Eof]
        );
    }

    #[test]
    fn test_single_equals_rejected() {
        let err = tokenize("a = b").unwrap_err();
        match err {
            PathError::Syntax { offset, .. } => assert_eq!(offset, 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
