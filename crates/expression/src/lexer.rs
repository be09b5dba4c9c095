//! Expression tokenizer

use crate::{ExpressionError, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    And,
    Or,
    Not,
    In,
    True,
    False,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    RegexMatch,
    RegexNotMatch,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Int(i64),
    Float(f64),
    Str(String),
    /// Slash-rooted field reference, stored as dotted event key
    Field(String),
}

/// A token plus its byte offset in the source, for error reporting
#[derive(Debug, Clone)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        let start = i;
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
            }
            '(' => {
                tokens.push(Spanned { token: Token::LParen, offset: start });
                i += 1;
            }
            ')' => {
                tokens.push(Spanned { token: Token::RParen, offset: start });
                i += 1;
            }
            '[' => {
                tokens.push(Spanned { token: Token::LBracket, offset: start });
                i += 1;
            }
            ']' => {
                tokens.push(Spanned { token: Token::RBracket, offset: start });
                i += 1;
            }
            ',' => {
                tokens.push(Spanned { token: Token::Comma, offset: start });
                i += 1;
            }
            '=' => {
                i += 1;
                match bytes.get(i).map(|b| *b as char) {
                    Some('=') => {
                        tokens.push(Spanned { token: Token::Eq, offset: start });
                        i += 1;
                    }
                    Some('~') => {
                        tokens.push(Spanned { token: Token::RegexMatch, offset: start });
                        i += 1;
                    }
                    _ => return Err(ExpressionError::parse(start, "expected == or =~")),
                }
            }
            '!' => {
                i += 1;
                match bytes.get(i).map(|b| *b as char) {
                    Some('=') => {
                        tokens.push(Spanned { token: Token::Ne, offset: start });
                        i += 1;
                    }
                    Some('~') => {
                        tokens.push(Spanned { token: Token::RegexNotMatch, offset: start });
                        i += 1;
                    }
                    _ => return Err(ExpressionError::parse(start, "expected != or !~")),
                }
            }
            '<' => {
                i += 1;
                if bytes.get(i) == Some(&b'=') {
                    tokens.push(Spanned { token: Token::Le, offset: start });
                    i += 1;
                } else {
                    tokens.push(Spanned { token: Token::Lt, offset: start });
                }
            }
            '>' => {
                i += 1;
                if bytes.get(i) == Some(&b'=') {
                    tokens.push(Spanned { token: Token::Ge, offset: start });
                    i += 1;
                } else {
                    tokens.push(Spanned { token: Token::Gt, offset: start });
                }
            }
            '"' => {
                i += 1;
                // collect raw bytes so multi-byte UTF-8 passes through intact
                let mut raw = Vec::new();
                loop {
                    match bytes.get(i) {
                        Some(b'"') => {
                            i += 1;
                            break;
                        }
                        Some(b'\\') => {
                            i += 1;
                            match bytes.get(i) {
                                Some(b'"') => raw.push(b'"'),
                                Some(b'\\') => raw.push(b'\\'),
                                Some(other) => {
                                    raw.push(b'\\');
                                    raw.push(*other);
                                }
                                None => {
                                    return Err(ExpressionError::parse(
                                        start,
                                        "unterminated string literal",
                                    ))
                                }
                            }
                            i += 1;
                        }
                        Some(other) => {
                            raw.push(*other);
                            i += 1;
                        }
                        None => {
                            return Err(ExpressionError::parse(start, "unterminated string literal"))
                        }
                    }
                }
                let s = String::from_utf8(raw)
                    .map_err(|_| ExpressionError::parse(start, "invalid UTF-8 in string"))?;
                tokens.push(Spanned { token: Token::Str(s), offset: start });
            }
            '/' => {
                i += 1;
                let seg_start = i;
                while i < bytes.len()
                    && ((bytes[i] as char).is_ascii_alphanumeric()
                        || matches!(bytes[i], b'_' | b'-' | b'@' | b'/'))
                {
                    i += 1;
                }
                if i == seg_start {
                    return Err(ExpressionError::parse(start, "empty field reference"));
                }
                let path = &input[seg_start..i];
                if path.split('/').any(str::is_empty) {
                    return Err(ExpressionError::parse(start, "empty field path segment"));
                }
                tokens.push(Spanned {
                    token: Token::Field(path.replace('/', ".")),
                    offset: start,
                });
            }
            c if c.is_ascii_digit() || c == '-' => {
                i += 1;
                let mut is_float = false;
                while i < bytes.len()
                    && ((bytes[i] as char).is_ascii_digit() || bytes[i] == b'.')
                {
                    if bytes[i] == b'.' {
                        is_float = true;
                    }
                    i += 1;
                }
                let text = &input[start..i];
                let token = if is_float {
                    Token::Float(text.parse().map_err(|_| {
                        ExpressionError::parse(start, format!("invalid number \"{text}\""))
                    })?)
                } else {
                    Token::Int(text.parse().map_err(|_| {
                        ExpressionError::parse(start, format!("invalid number \"{text}\""))
                    })?)
                };
                tokens.push(Spanned { token, offset: start });
            }
            c if c.is_ascii_alphabetic() => {
                while i < bytes.len() && (bytes[i] as char).is_ascii_alphanumeric() {
                    i += 1;
                }
                let word = &input[start..i];
                let token = match word {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "true" => Token::True,
                    "false" => Token::False,
                    other => {
                        return Err(ExpressionError::parse(
                            start,
                            format!("unexpected word \"{other}\""),
                        ))
                    }
                };
                tokens.push(Spanned { token, offset: start });
            }
            other => {
                return Err(ExpressionError::parse(
                    start,
                    format!("unexpected character '{other}'"),
                ))
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_comparison() {
        let tokens = tokenize("/resp/status >= 500").unwrap();
        assert_eq!(tokens[0].token, Token::Field("resp.status".into()));
        assert_eq!(tokens[1].token, Token::Ge);
        assert_eq!(tokens[2].token, Token::Int(500));
    }

    #[test]
    fn tokenizes_strings_with_escapes() {
        let tokens = tokenize(r#""a\"b""#).unwrap();
        assert_eq!(tokens[0].token, Token::Str("a\"b".into()));
    }

    #[test]
    fn rejects_bare_words_and_bad_chars() {
        assert!(tokenize("status == 1").is_err());
        assert!(tokenize("/a == #").is_err());
        assert!(tokenize("/a = 1").is_err());
    }

    #[test]
    fn negative_numbers_lex() {
        let tokens = tokenize("-3.5").unwrap();
        assert_eq!(tokens[0].token, Token::Float(-3.5));
    }
}
