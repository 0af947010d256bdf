//! Programmatic query construction.
//!
//! `Query::statement` is the sanctioned way to build query strings from
//! runtime values: placeholders are substituted with literal-encoded
//! values, so the output is always lexically valid.

use crate::error::{RackError, Result};
use crate::query::parse::Query;
use crate::value::Value;

impl Query {
    /// Fill `{}` / `{name}` placeholders in `template` with
    /// literal-encoded values and prepend the target, producing a valid
    /// query string.
    ///
    /// Strings are quoted, lists joined by `", "`, booleans rendered as
    /// `True` / `False`.
    ///
    /// ```
    /// use rack_core::query::Query;
    /// use rack_core::value::Value;
    ///
    /// let q = Query::statement(
    ///     "book",
    ///     "{} <= rating ; author == {author}",
    ///     &[Value::from(3)],
    ///     &[("author", Value::from("A.B. Cee"))],
    /// ).unwrap();
    /// assert_eq!(q, "book: 3 <= rating ; author == \"A.B. Cee\"");
    /// ```
    pub fn statement(
        target: &str,
        template: &str,
        positional: &[Value],
        named: &[(&str, Value)],
    ) -> Result<String> {
        let mut out = String::with_capacity(template.len() + 16);
        let mut next_positional = 0;
        let mut rest = template;
        let mut offset = 0;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| RackError::QueryParse {
                offset: offset + open,
                expected: "'}' closing the placeholder".to_string(),
                found: "end of template".to_string(),
            })?;
            let name = &after[..close];

            let value = if name.is_empty() {
                let value = positional.get(next_positional);
                next_positional += 1;
                value
            } else {
                named.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
            };
            let value = value.ok_or_else(|| RackError::QueryParse {
                offset: offset + open,
                expected: format!("a value for placeholder '{{{}}}'", name),
                found: "no matching argument".to_string(),
            })?;

            out.push_str(&value.to_string());
            offset += open + 1 + close + 1;
            rest = &after[close + 1..];
        }
        out.push_str(rest);

        Ok(format!("{}: {}", target, out.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_and_named() {
        let q = Query::statement(
            "book",
            "{} <= rating <= {} ; author == {who}",
            &[Value::from(3), Value::from(5)],
            &[("who", Value::from("A.B. Cee"))],
        )
        .unwrap();
        assert_eq!(q, "book: 3 <= rating <= 5 ; author == \"A.B. Cee\"");
        assert!(Query::parse(&q).is_ok());
    }

    #[test]
    fn lists_join_without_brackets() {
        let q = Query::statement(
            "book",
            "author -> {}",
            &[Value::List(vec![Value::from("A"), Value::from("B")])],
            &[],
        )
        .unwrap();
        assert_eq!(q, "book: author -> \"A\", \"B\"");
        assert!(Query::parse(&q).is_ok());
    }

    #[test]
    fn booleans_render_as_keywords() {
        let q = Query::statement("book", "read == {}", &[Value::from(true)], &[]).unwrap();
        assert_eq!(q, "book: read == True");
    }

    #[test]
    fn missing_argument_is_an_error() {
        assert!(Query::statement("book", "rating == {}", &[], &[]).is_err());
        assert!(Query::statement("book", "rating == {nope", &[], &[]).is_err());
    }
}
