//! Comparison operators.
//!
//! Negation (`!` prefix) and case folding (`.` suffix) are flags on the
//! operator, not separate AST nodes. Tokens are lexed longest-match.

use std::fmt;

/// Base comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    /// `==` — structural equality.
    Eq,
    /// `->` — left is a member of right (list) or a substring of right.
    In,
    /// `<%` — string starts-with.
    StartsWith,
    /// `%>` — string ends-with.
    EndsWith,
    /// `=>` — identity compare. Parseable, of no practical utility.
    Identity,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A full operator token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Op {
    pub cmp: Cmp,
    pub negated: bool,
    pub fold_case: bool,
}

impl Op {
    const fn new(cmp: Cmp, negated: bool, fold_case: bool) -> Self {
        Self {
            cmp,
            negated,
            fold_case,
        }
    }
}

/// Token table ordered for longest-match lexing.
const TABLE: &[(&str, Op)] = &[
    ("!->.", Op::new(Cmp::In, true, true)),
    ("!<%.", Op::new(Cmp::StartsWith, true, true)),
    ("!%>.", Op::new(Cmp::EndsWith, true, true)),
    ("!=.", Op::new(Cmp::Eq, true, true)),
    ("->.", Op::new(Cmp::In, false, true)),
    ("<%.", Op::new(Cmp::StartsWith, false, true)),
    ("%>.", Op::new(Cmp::EndsWith, false, true)),
    ("==.", Op::new(Cmp::Eq, false, true)),
    ("!->", Op::new(Cmp::In, true, false)),
    ("!<%", Op::new(Cmp::StartsWith, true, false)),
    ("!%>", Op::new(Cmp::EndsWith, true, false)),
    ("!=", Op::new(Cmp::Eq, true, false)),
    ("->", Op::new(Cmp::In, false, false)),
    ("<%", Op::new(Cmp::StartsWith, false, false)),
    ("%>", Op::new(Cmp::EndsWith, false, false)),
    ("==", Op::new(Cmp::Eq, false, false)),
    ("=>", Op::new(Cmp::Identity, false, false)),
    ("<=", Op::new(Cmp::Le, false, false)),
    (">=", Op::new(Cmp::Ge, false, false)),
    ("<", Op::new(Cmp::Lt, false, false)),
    (">", Op::new(Cmp::Gt, false, false)),
];

impl Op {
    /// Longest operator token at the start of `input`, with its length.
    pub fn match_at(input: &str) -> Option<(Op, usize)> {
        TABLE
            .iter()
            .find(|(tok, _)| input.starts_with(tok))
            .map(|(tok, op)| (*op, tok.len()))
    }

    pub fn token(&self) -> &'static str {
        TABLE
            .iter()
            .find(|(_, op)| op == self)
            .map(|(tok, _)| *tok)
            .unwrap_or("?")
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_match_wins() {
        let (op, len) = Op::match_at("==. 3").unwrap();
        assert_eq!(len, 3);
        assert_eq!(op, Op::new(Cmp::Eq, false, true));

        let (op, len) = Op::match_at("==3").unwrap();
        assert_eq!(len, 2);
        assert_eq!(op, Op::new(Cmp::Eq, false, false));

        let (op, len) = Op::match_at("!->.x").unwrap();
        assert_eq!(len, 4);
        assert!(op.negated && op.fold_case);
    }

    #[test]
    fn every_token_round_trips() {
        for (tok, op) in TABLE {
            assert_eq!(op.token(), *tok);
            assert_eq!(Op::match_at(tok), Some((*op, tok.len())));
        }
    }

    #[test]
    fn no_match_on_plain_text() {
        assert!(Op::match_at("title").is_none());
        assert!(Op::match_at("-5").is_none());
    }
}
