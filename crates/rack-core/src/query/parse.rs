//! Query AST and parser.
//!
//! Grammar:
//!
//! ```text
//! query      := target ':' condition (';' condition)*
//! target     := IDENT
//! condition  := operand (op operand)+
//! operand    := FIELD_REF | literal
//! literal    := INT | FLOAT | BOOL | STRING | LIST
//! LIST       := literal (',' literal)*          // parens optional
//! ```
//!
//! Quoted strings are string literals; bare identifiers are field
//! references. The parser runs once per query string; the evaluator runs
//! the resulting AST against every candidate record.

use crate::error::{RackError, Result};
use crate::query::lexer::{lex, Tok, Token};
use crate::query::op::Op;
use crate::value::Value;

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Bare identifier, resolved against the record under test.
    Field(String),
    Literal(Value),
}

/// A chain `a OP1 b OP2 c ...`, evaluated as `(a OP1 b) AND (b OP2 c)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub first: Operand,
    pub rest: Vec<(Op, Operand)>,
}

/// A parsed query: target type (or tag name) plus AND-joined conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub target: String,
    pub conditions: Vec<Condition>,
}

impl Query {
    pub fn parse(input: &str) -> Result<Query> {
        let tokens = lex(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        parser.query()
    }

    /// Split `input` at the first `:` into `(target, rest)`. The caller
    /// decides whether the target names a registered type or stored tag;
    /// this is only the syntactic half of query classification.
    pub fn split_target(input: &str) -> Option<(&str, &str)> {
        let (target, rest) = input.split_once(':')?;
        let target = target.trim();
        if target.is_empty() {
            return None;
        }
        Some((target, rest))
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn err(&self, expected: &str) -> RackError {
        let token = self.peek();
        RackError::QueryParse {
            offset: token.offset,
            expected: expected.to_string(),
            found: token.tok.describe(),
        }
    }

    fn query(&mut self) -> Result<Query> {
        let target = match self.bump().tok {
            Tok::Ident(name) => name,
            _ => return Err(self.err("a type or tag identifier")),
        };
        match self.bump().tok {
            Tok::Colon => {}
            _ => return Err(self.err("':' after the query target")),
        }

        let mut conditions = vec![self.condition()?];
        loop {
            match &self.peek().tok {
                Tok::Semicolon => {
                    self.bump();
                    conditions.push(self.condition()?);
                }
                Tok::Eof => break,
                _ => return Err(self.err("';' or end of query")),
            }
        }

        Ok(Query { target, conditions })
    }

    fn condition(&mut self) -> Result<Condition> {
        let first = self.operand()?;
        let mut rest = Vec::new();
        while let Tok::Op(op) = self.peek().tok {
            self.bump();
            rest.push((op, self.operand()?));
        }
        if rest.is_empty() {
            return Err(self.err("an operator"));
        }
        Ok(Condition { first, rest })
    }

    fn operand(&mut self) -> Result<Operand> {
        match &self.peek().tok {
            Tok::Ident(_) => match self.bump().tok {
                Tok::Ident(name) => Ok(Operand::Field(name)),
                _ => unreachable!(),
            },
            Tok::Literal(_) => Ok(Operand::Literal(self.literal_list()?)),
            Tok::LParen => {
                self.bump();
                let value = self.literal_list()?;
                match self.bump().tok {
                    Tok::RParen => Ok(Operand::Literal(value)),
                    _ => Err(self.err("')'")),
                }
            }
            _ => Err(self.err("a field name or literal")),
        }
    }

    /// One literal, or a comma-joined list of literals.
    fn literal_list(&mut self) -> Result<Value> {
        let mut items = vec![self.literal()?];
        while self.peek().tok == Tok::Comma {
            self.bump();
            items.push(self.literal()?);
        }
        if items.len() == 1 {
            Ok(items.pop().expect("single literal"))
        } else {
            Ok(Value::List(items))
        }
    }

    fn literal(&mut self) -> Result<Value> {
        match &self.peek().tok {
            Tok::Literal(_) => match self.bump().tok {
                Tok::Literal(value) => Ok(value),
                _ => unreachable!(),
            },
            _ => Err(self.err("a literal")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::op::Cmp;

    #[test]
    fn parses_chained_range() {
        let q = Query::parse("book: 3 <= rating <= 5").unwrap();
        assert_eq!(q.target, "book");
        assert_eq!(q.conditions.len(), 1);
        let cond = &q.conditions[0];
        assert_eq!(cond.first, Operand::Literal(Value::Int(3)));
        assert_eq!(cond.rest.len(), 2);
        assert_eq!(cond.rest[0].1, Operand::Field("rating".into()));
        assert_eq!(cond.rest[1].1, Operand::Literal(Value::Int(5)));
    }

    #[test]
    fn parses_multiple_conditions_and_lists() {
        let q =
            Query::parse("book: 3 <= rating <= 5 ; author -> \"A.B. Cee\", \"B.C. Dea\"").unwrap();
        assert_eq!(q.conditions.len(), 2);
        let cond = &q.conditions[1];
        assert_eq!(cond.first, Operand::Field("author".into()));
        assert_eq!(cond.rest[0].0.cmp, Cmp::In);
        assert_eq!(
            cond.rest[0].1,
            Operand::Literal(Value::List(vec![
                Value::from("A.B. Cee"),
                Value::from("B.C. Dea"),
            ]))
        );
    }

    #[test]
    fn parenthesized_lists_are_accepted() {
        let q = Query::parse("book: author -> (\"A\", \"B\")").unwrap();
        assert_eq!(
            q.conditions[0].rest[0].1,
            Operand::Literal(Value::List(vec![Value::from("A"), Value::from("B")]))
        );
    }

    #[test]
    fn condition_requires_an_operator() {
        match Query::parse("book: rating") {
            Err(RackError::QueryParse { expected, .. }) => {
                assert!(expected.contains("operator"));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn missing_target_is_rejected() {
        assert!(Query::parse(": rating > 1").is_err());
        assert!(Query::parse("rating > 1").is_err());
    }

    #[test]
    fn error_carries_byte_offset() {
        match Query::parse("book: rating >") {
            Err(RackError::QueryParse { offset, .. }) => assert_eq!(offset, 14),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn split_target_is_syntactic_only() {
        assert_eq!(
            Query::split_target("book: rating > 1"),
            Some(("book", " rating > 1"))
        );
        assert_eq!(Query::split_target("book_0"), None);
        assert_eq!(Query::split_target(": x"), None);
    }
}
