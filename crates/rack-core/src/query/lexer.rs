//! Query tokenizer.
//!
//! Hand-rolled over the raw bytes so every token carries its byte offset
//! for parse diagnostics.

use crate::error::{RackError, Result};
use crate::query::op::Op;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    Literal(Value),
    Op(Op),
    Colon,
    Semicolon,
    Comma,
    LParen,
    RParen,
    Eof,
}

impl Tok {
    /// Human-readable form for "found ..." diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Tok::Ident(name) => format!("identifier '{}'", name),
            Tok::Literal(v) => format!("literal {}", v),
            Tok::Op(op) => format!("operator '{}'", op),
            Tok::Colon => "':'".to_string(),
            Tok::Semicolon => "';'".to_string(),
            Tok::Comma => "','".to_string(),
            Tok::LParen => "'('".to_string(),
            Tok::RParen => "')'".to_string(),
            Tok::Eof => "end of query".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub offset: usize,
}

pub fn lex(input: &str) -> Result<Vec<Token>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        if !bytes[pos].is_ascii() {
            // Non-ASCII text is only valid inside quoted strings.
            return Err(RackError::QueryParse {
                offset: pos,
                expected: "ASCII query text".to_string(),
                found: "a non-ASCII byte".to_string(),
            });
        }
        let c = bytes[pos] as char;

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        // Operators first: '-' starts both '->' and a negative number.
        if let Some((op, len)) = Op::match_at(&input[pos..]) {
            tokens.push(Token {
                tok: Tok::Op(op),
                offset: pos,
            });
            pos += len;
            continue;
        }

        let tok = match c {
            ':' => Some(Tok::Colon),
            ';' => Some(Tok::Semicolon),
            ',' => Some(Tok::Comma),
            '(' => Some(Tok::LParen),
            ')' => Some(Tok::RParen),
            _ => None,
        };
        if let Some(tok) = tok {
            tokens.push(Token { tok, offset: pos });
            pos += 1;
            continue;
        }

        if c == '"' || c == '\'' {
            let (s, len) = lex_string(input, pos, c)?;
            tokens.push(Token {
                tok: Tok::Literal(Value::Str(s)),
                offset: pos,
            });
            pos += len;
            continue;
        }

        if c.is_ascii_digit() || (c == '-' && next_is_digit(bytes, pos)) {
            let (value, len) = lex_number(input, pos)?;
            tokens.push(Token {
                tok: Tok::Literal(value),
                offset: pos,
            });
            pos += len;
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let (tok, len) = lex_ident(input, pos);
            tokens.push(Token { tok, offset: pos });
            pos += len;
            continue;
        }

        return Err(RackError::QueryParse {
            offset: pos,
            expected: "operator, literal, or identifier".to_string(),
            found: format!("'{}'", c),
        });
    }

    tokens.push(Token {
        tok: Tok::Eof,
        offset: bytes.len(),
    });
    Ok(tokens)
}

fn next_is_digit(bytes: &[u8], pos: usize) -> bool {
    bytes
        .get(pos + 1)
        .map(|b| (*b as char).is_ascii_digit())
        .unwrap_or(false)
}

/// Quoted string. No escape sequences; the closing quote must match the
/// opening one.
fn lex_string(input: &str, start: usize, quote: char) -> Result<(String, usize)> {
    let body = &input[start + 1..];
    match body.find(quote) {
        Some(end) => Ok((body[..end].to_string(), end + 2)),
        None => Err(RackError::QueryParse {
            offset: start,
            expected: format!("closing {}", quote),
            found: "end of query".to_string(),
        }),
    }
}

fn lex_number(input: &str, start: usize) -> Result<(Value, usize)> {
    let bytes = input.as_bytes();
    let mut end = start + 1; // sign or first digit already accepted
    while end < bytes.len() && (bytes[end] as char).is_ascii_digit() {
        end += 1;
    }
    let mut is_float = false;
    if end < bytes.len() && bytes[end] == b'.' && next_is_digit(bytes, end) {
        is_float = true;
        end += 1;
        while end < bytes.len() && (bytes[end] as char).is_ascii_digit() {
            end += 1;
        }
    }
    let text = &input[start..end];
    let value = if is_float {
        text.parse::<f64>().map(Value::Float).map_err(|_| ())
    } else {
        text.parse::<i64>().map(Value::Int).map_err(|_| ())
    }
    .map_err(|_| RackError::QueryParse {
        offset: start,
        expected: "a number".to_string(),
        found: format!("'{}'", text),
    })?;
    Ok((value, end - start))
}

fn lex_ident(input: &str, start: usize) -> (Tok, usize) {
    let bytes = input.as_bytes();
    let mut end = start;
    while end < bytes.len() {
        let c = bytes[end] as char;
        if c.is_ascii_alphanumeric() || c == '_' {
            end += 1;
        } else {
            break;
        }
    }
    let text = &input[start..end];
    let tok = match text {
        "True" => Tok::Literal(Value::Bool(true)),
        "False" => Tok::Literal(Value::Bool(false)),
        _ => Tok::Ident(text.to_string()),
    };
    (tok, end - start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::op::Cmp;

    fn kinds(input: &str) -> Vec<Tok> {
        lex(input).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn lexes_a_full_query() {
        let toks = kinds("book: 3 <= rating <= 5 ; author -> \"A.B. Cee\", \"B.C. Dea\"");
        assert_eq!(toks[0], Tok::Ident("book".into()));
        assert_eq!(toks[1], Tok::Colon);
        assert_eq!(toks[2], Tok::Literal(Value::Int(3)));
        assert!(matches!(toks[3], Tok::Op(op) if op.cmp == Cmp::Le));
        assert_eq!(toks[4], Tok::Ident("rating".into()));
        assert!(toks.contains(&Tok::Semicolon));
        assert!(toks.contains(&Tok::Literal(Value::Str("A.B. Cee".into()))));
    }

    #[test]
    fn arrow_vs_negative_number() {
        let toks = kinds("x -> -5");
        assert!(matches!(toks[1], Tok::Op(op) if op.cmp == Cmp::In));
        assert_eq!(toks[2], Tok::Literal(Value::Int(-5)));
    }

    #[test]
    fn dotted_and_negated_operators() {
        let toks = kinds("title !<%. \"the\"");
        match toks[1] {
            Tok::Op(op) => {
                assert_eq!(op.cmp, Cmp::StartsWith);
                assert!(op.negated);
                assert!(op.fold_case);
            }
            ref other => panic!("expected operator, got {:?}", other),
        }
    }

    #[test]
    fn booleans_are_literals_not_idents() {
        let toks = kinds("flag == True");
        assert_eq!(toks[2], Tok::Literal(Value::Bool(true)));
    }

    #[test]
    fn offsets_point_at_token_starts() {
        let tokens = lex("book: rating > 4").unwrap();
        assert_eq!(tokens[0].offset, 0);
        assert_eq!(tokens[1].offset, 4);
        assert_eq!(tokens[2].offset, 6);
    }

    #[test]
    fn unterminated_string_reports_offset() {
        match lex("book: title == \"oops") {
            Err(RackError::QueryParse { offset, .. }) => assert_eq!(offset, 15),
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}
