//! Query evaluation against a single entry.
//!
//! Field operands resolve to the record's raw field values, before any
//! foreign-key view resolution. Chains short-circuit left-to-right and
//! each operand is resolved exactly once per evaluated record.

use std::cmp::Ordering;

use crate::entry::{Entry, Id};
use crate::error::{RackError, Result};
use crate::query::op::{Cmp, Op};
use crate::query::parse::{Condition, Operand, Query};
use crate::value::Value;

/// Evaluate a parsed query's conditions against one entry. The target is
/// not checked here; candidate selection happens in the store scan.
pub fn matches(query: &Query, entry: &Entry) -> Result<bool> {
    for condition in &query.conditions {
        if !eval_condition(condition, entry)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn eval_condition(condition: &Condition, entry: &Entry) -> Result<bool> {
    let mut prev = resolve(&condition.first, entry)?;
    for (op, operand) in &condition.rest {
        let next = resolve(operand, entry)?;
        if !apply(*op, &prev, &next)? {
            return Ok(false);
        }
        prev = next;
    }
    Ok(true)
}

fn resolve(operand: &Operand, entry: &Entry) -> Result<Value> {
    match operand {
        Operand::Literal(value) => Ok(value.clone()),
        Operand::Field(name) => match name.as_str() {
            "id" => match entry.id() {
                Id::Num(n) => Ok(Value::Int(*n as i64)),
                Id::Name(s) => Ok(Value::Str(s.clone())),
                Id::Auto => Err(RackError::QueryType(
                    "entry id has not been assigned yet".to_string(),
                )),
            },
            "type" => Ok(Value::Str(entry.type_name().to_string())),
            _ => {
                let value = entry.field(name).ok_or_else(|| {
                    RackError::QueryType(format!(
                        "'{}' names no field on type '{}'",
                        name,
                        entry.type_name()
                    ))
                })?;
                Value::from_json(value)
            }
        },
    }
}

fn apply(op: Op, left: &Value, right: &Value) -> Result<bool> {
    let outcome = match op.cmp {
        Cmp::Eq => {
            if op.fold_case {
                fold(left) == fold(right)
            } else {
                left.loose_eq(right)
            }
        }
        Cmp::In => membership(left, right, op.fold_case)?,
        Cmp::StartsWith => affix(left, right, op.fold_case)?.0,
        Cmp::EndsWith => affix(left, right, op.fold_case)?.1,
        Cmp::Identity => left.identity_eq(right),
        Cmp::Lt => ordered(op, left, right)? == Ordering::Less,
        Cmp::Le => ordered(op, left, right)? != Ordering::Greater,
        Cmp::Gt => ordered(op, left, right)? == Ordering::Greater,
        Cmp::Ge => ordered(op, left, right)? != Ordering::Less,
    };
    Ok(outcome ^ op.negated)
}

/// Case-insensitive operators stringify both sides, then lowercase.
fn fold(value: &Value) -> String {
    value.render().to_lowercase()
}

/// `a -> b`: membership in a list, substring for strings.
fn membership(left: &Value, right: &Value, fold_case: bool) -> Result<bool> {
    match right {
        Value::List(items) => {
            if fold_case {
                let needle = fold(left);
                Ok(items.iter().any(|item| fold(item) == needle))
            } else {
                Ok(items.iter().any(|item| item.loose_eq(left)))
            }
        }
        Value::Str(haystack) => {
            if fold_case {
                Ok(haystack.to_lowercase().contains(&fold(left)))
            } else {
                let needle = left.as_str().ok_or_else(|| {
                    RackError::QueryType(format!(
                        "'->' needs a string left-hand side to search in a string, got {}",
                        left
                    ))
                })?;
                Ok(haystack.contains(needle))
            }
        }
        other => Err(RackError::QueryType(format!(
            "right-hand side of '->' must be a list or string, got {}",
            other
        ))),
    }
}

/// `(starts_with, ends_with)` in one pass so both operators share the
/// operand checks.
fn affix(left: &Value, right: &Value, fold_case: bool) -> Result<(bool, bool)> {
    if fold_case {
        let a = fold(left);
        let b = fold(right);
        return Ok((a.starts_with(&b), a.ends_with(&b)));
    }
    match (left.as_str(), right.as_str()) {
        (Some(a), Some(b)) => Ok((a.starts_with(b), a.ends_with(b))),
        _ => Err(RackError::QueryType(format!(
            "'<%' and '%>' compare strings, got {} and {}",
            left, right
        ))),
    }
}

fn ordered(op: Op, left: &Value, right: &Value) -> Result<Ordering> {
    left.compare(right).ok_or_else(|| {
        RackError::QueryType(format!(
            "'{}' cannot order {} against {}",
            op, left, right
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(id: u64, title: &str, author: &str, rating: i64) -> Entry {
        Entry::new("book", id)
            .with("title", title)
            .with("author", author)
            .with("rating", rating)
    }

    fn check(query: &str, entry: &Entry) -> bool {
        matches(&Query::parse(query).unwrap(), entry).unwrap()
    }

    #[test]
    fn range_chain() {
        let e = book(1, "The B", "A.B. Cee", 4);
        assert!(check("book: 3 <= rating <= 5", &e));
        assert!(!check("book: 3 <= rating <= 3", &e));
    }

    #[test]
    fn membership_against_list() {
        let e = book(4, "E Up!", "B.C. Dea", 4);
        assert!(check("book: author -> \"A.B. Cee\", \"B.C. Dea\"", &e));
        assert!(!check("book: author -> \"X\", \"Y\"", &e));
        assert!(check("book: author !-> \"X\", \"Y\"", &e));
    }

    #[test]
    fn case_insensitive_starts_with() {
        let e = book(0, "The A", "A.B. Cee", 1);
        assert!(check("book: title <%. \"the\"", &e));
        assert!(!check("book: title <% \"the\"", &e));
        assert!(check("book: title <% \"The\"", &e));
        assert!(check("book: title %>. \"a\"", &e));
    }

    #[test]
    fn case_insensitive_equality() {
        let e = book(0, "The A", "A.B. Cee", 1);
        assert!(check("book: author ==. \"a.b. cee\"", &e));
        assert!(check("book: author !=. \"b.c. dea\"", &e));
    }

    #[test]
    fn conditions_and_join() {
        let e = book(1, "The B", "A.B. Cee", 4);
        assert!(check("book: rating >= 3 ; title <%. \"the\"", &e));
        assert!(!check("book: rating >= 3 ; title <%. \"an\"", &e));
    }

    #[test]
    fn envelope_fields_resolve() {
        let e = book(2, "C", "X", 0);
        assert!(check("book: id == 2", &e));
        assert!(check("book: type == \"book\"", &e));
    }

    #[test]
    fn substring_membership() {
        let e = book(0, "The A", "A.B. Cee", 1);
        assert!(check("book: \"B. C\" -> author", &e));
        assert!(check("book: \"b. c\" ->. author", &e));
        assert!(!check("book: \"zzz\" -> author", &e));
    }

    #[test]
    fn unknown_field_is_a_type_error() {
        let e = book(0, "A", "X", 1);
        let q = Query::parse("book: pages > 10").unwrap();
        assert!(matches!(matches(&q, &e), Err(RackError::QueryType(_))));
    }

    #[test]
    fn incompatible_ordering_is_a_type_error() {
        let e = book(0, "A", "X", 1);
        let q = Query::parse("book: title > 3").unwrap();
        assert!(matches!(matches(&q, &e), Err(RackError::QueryType(_))));
    }

    #[test]
    fn identity_operator_is_strict() {
        let e = book(0, "A", "X", 1);
        assert!(check("book: rating => 1", &e));
        assert!(!check("book: rating => 1.0", &e));
    }

    #[test]
    fn chain_resolves_each_operand_once() {
        // The shared middle operand is memoized: a field miss in the
        // skipped tail is never touched once the chain short-circuits.
        let e = book(0, "A", "X", 1);
        let q = Query::parse("book: 5 <= rating <= missing").unwrap();
        assert_eq!(matches(&q, &e).unwrap(), false);
    }
}
