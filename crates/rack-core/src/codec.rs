//! Entry codec: the bridge between [`Entry`] instances and the JSON
//! object stored in the key/value file.
//!
//! The encoded form is the envelope `{id, type}` plus every declared
//! field. Foreign-key fields are stored verbatim (keys or query string);
//! projected views are never serialized.

use std::collections::BTreeMap;

use crate::entry::{Entry, Id};
use crate::error::{RackError, Result};
use crate::schema::{FieldSpec, SchemaRegistry};

/// Encode an entry to its stored JSON object.
///
/// Every declared field must be present (or carry a default) and match
/// its declared kind; undeclared fields are rejected. The entry's id
/// must be concrete.
pub fn encode(entry: &Entry, registry: &SchemaRegistry) -> Result<serde_json::Map<String, serde_json::Value>> {
    let schema = registry.schema_for(entry.type_name())?;

    let mut map = serde_json::Map::new();
    map.insert("id".to_string(), entry.id().to_json()?);
    map.insert(
        "type".to_string(),
        serde_json::Value::from(entry.type_name()),
    );

    for spec in schema.fields() {
        let value = match entry.field(&spec.name) {
            Some(v) => v.clone(),
            None => spec.default.clone().ok_or_else(|| {
                RackError::Field(format!(
                    "missing required field '{}' on type '{}'",
                    spec.name,
                    entry.type_name()
                ))
            })?,
        };
        check_field(spec, &value, entry.type_name())?;
        map.insert(spec.name.clone(), value);
    }

    for name in entry.raw_fields().keys() {
        if schema.field(name).is_none() {
            return Err(RackError::Field(format!(
                "unknown field '{}' on type '{}'",
                name,
                entry.type_name()
            )));
        }
    }

    Ok(map)
}

/// Encode straight to the stored byte form.
pub fn to_bytes(entry: &Entry, registry: &SchemaRegistry) -> Result<Vec<u8>> {
    let map = encode(entry, registry)?;
    serde_json::to_vec(&map).map_err(|e| RackError::Serialization(e.to_string()))
}

/// Decode a stored JSON object back into an entry.
///
/// Looks up the schema by the `type` discriminator, fills missing
/// optional fields with their defaults, and rejects extra fields.
pub fn decode(
    map: &serde_json::Map<String, serde_json::Value>,
    registry: &SchemaRegistry,
) -> Result<Entry> {
    let type_name = map
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RackError::Field("entry has an empty or missing 'type' field".to_string()))?
        .to_string();
    let schema = registry.schema_for(&type_name)?;

    let id = Id::from_json(
        map.get("id")
            .ok_or_else(|| RackError::Field("entry has no 'id' field".to_string()))?,
    )?;

    let mut fields = BTreeMap::new();
    for spec in schema.fields() {
        let value = match map.get(&spec.name) {
            Some(v) => v.clone(),
            None => spec.default.clone().ok_or_else(|| {
                RackError::Field(format!(
                    "missing required field '{}' on type '{}'",
                    spec.name, type_name
                ))
            })?,
        };
        check_field(spec, &value, &type_name)?;
        fields.insert(spec.name.clone(), value);
    }

    for name in map.keys() {
        if name != "id" && name != "type" && schema.field(name).is_none() {
            return Err(RackError::Field(format!(
                "unknown field '{}' on type '{}'",
                name, type_name
            )));
        }
    }

    Ok(Entry::from_parts(type_name, id, fields))
}

/// Decode from the stored byte form.
pub fn from_bytes(bytes: &[u8], registry: &SchemaRegistry) -> Result<Entry> {
    let map: serde_json::Map<String, serde_json::Value> =
        serde_json::from_slice(bytes).map_err(|e| RackError::Serialization(e.to_string()))?;
    decode(&map, registry)
}

/// Pretty-printed JSON rendering of an entry, a side capability of the
/// codec independent of the stored form.
pub fn pretty(entry: &Entry, registry: &SchemaRegistry) -> Result<String> {
    let map = encode(entry, registry)?;
    serde_json::to_string_pretty(&map).map_err(|e| RackError::Serialization(e.to_string()))
}

fn check_field(spec: &FieldSpec, value: &serde_json::Value, type_name: &str) -> Result<()> {
    if spec.is_foreign() {
        // Stored form of a foreign field: key string, list of key
        // strings, query string, or null when unset.
        let ok = match value {
            serde_json::Value::Null => true,
            serde_json::Value::String(_) => true,
            serde_json::Value::Array(items) => items.iter().all(|i| i.is_string()),
            _ => false,
        };
        return if ok {
            Ok(())
        } else {
            Err(RackError::Field(format!(
                "foreign-key field '{}' on type '{}' must hold a key, a key list, or a query",
                spec.name, type_name
            )))
        };
    }
    // Null is fine for optional fields; it reads as "explicitly unset".
    if value.is_null() && spec.default.is_some() {
        return Ok(());
    }
    if !spec.kind.accepts(value) {
        return Err(RackError::Field(format!(
            "field '{}' on type '{}' rejects value {}",
            spec.name, type_name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldSpec};

    fn registry() -> SchemaRegistry {
        let mut reg = SchemaRegistry::new();
        reg.register(
            "book",
            vec![
                FieldSpec::required("title", FieldKind::Str),
                FieldSpec::required("author", FieldKind::Str),
                FieldSpec::optional("rating", FieldKind::Int, serde_json::json!(0)),
            ],
        )
        .unwrap();
        reg.register(
            "author",
            vec![
                FieldSpec::required("name", FieldKind::Str),
                FieldSpec::foreign("fk_books").unwrap(),
            ],
        )
        .unwrap();
        reg
    }

    #[test]
    fn round_trip_preserves_entry() {
        let reg = registry();
        let entry = Entry::new("book", 0u64)
            .with("title", "The A")
            .with("author", "A.B. Cee")
            .with("rating", 1);
        let decoded = decode(&encode(&entry, &reg).unwrap(), &reg).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let reg = registry();
        let entry = Entry::new("book", 1u64)
            .with("title", "B")
            .with("author", "X");
        let map = encode(&entry, &reg).unwrap();
        assert_eq!(map.get("rating"), Some(&serde_json::json!(0)));
    }

    #[test]
    fn envelope_is_present_and_views_are_not() {
        let reg = registry();
        let entry = Entry::new("author", 0u64)
            .with("name", "A.B. Cee")
            .with("fk_books", serde_json::json!(["book_0", "book_1"]));
        let map = encode(&entry, &reg).unwrap();
        assert_eq!(map.get("id"), Some(&serde_json::json!(0)));
        assert_eq!(map.get("type"), Some(&serde_json::json!("author")));
        assert!(map.contains_key("fk_books"));
        assert!(!map.contains_key("books"));
    }

    #[test]
    fn unknown_type_and_extra_fields_rejected() {
        let reg = registry();
        let ghost = Entry::new("ghost", 0u64);
        assert!(matches!(encode(&ghost, &reg), Err(RackError::Schema(_))));

        let extra = Entry::new("book", 0u64)
            .with("title", "A")
            .with("author", "X")
            .with("pages", 100);
        assert!(matches!(encode(&extra, &reg), Err(RackError::Field(_))));

        let mut map = serde_json::Map::new();
        map.insert("id".into(), serde_json::json!(0));
        map.insert("type".into(), serde_json::json!("book"));
        map.insert("title".into(), serde_json::json!("A"));
        map.insert("author".into(), serde_json::json!("X"));
        map.insert("pages".into(), serde_json::json!(9));
        assert!(matches!(decode(&map, &reg), Err(RackError::Field(_))));
    }

    #[test]
    fn kind_mismatch_rejected() {
        let reg = registry();
        let entry = Entry::new("book", 0u64)
            .with("title", 12)
            .with("author", "X");
        assert!(matches!(encode(&entry, &reg), Err(RackError::Field(_))));
    }

    #[test]
    fn missing_required_field_rejected() {
        let reg = registry();
        let entry = Entry::new("book", 0u64).with("title", "A");
        assert!(matches!(encode(&entry, &reg), Err(RackError::Field(_))));
    }

    #[test]
    fn fields_iterate_in_declaration_order() {
        let reg = registry();
        let entry = decode(
            &encode(
                &Entry::new("book", 0u64)
                    .with("title", "A")
                    .with("author", "X"),
                &reg,
            )
            .unwrap(),
            &reg,
        )
        .unwrap();
        let schema = reg.schema_for("book").unwrap();
        let names: Vec<&str> = entry.fields_of(schema).map(|(name, _)| name).collect();
        assert_eq!(names, vec!["title", "author", "rating"]);
    }

    #[test]
    fn pretty_rendering_is_valid_json() {
        let reg = registry();
        let entry = Entry::new("book", 0u64)
            .with("title", "A")
            .with("author", "X");
        let rendered = pretty(&entry, &reg).unwrap();
        assert!(rendered.contains('\n'));
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["type"], serde_json::json!("book"));
    }

    #[test]
    fn tag_ids_decode_as_names() {
        let reg = registry();
        let mut map = serde_json::Map::new();
        map.insert("id".into(), serde_json::json!("hot"));
        map.insert("type".into(), serde_json::json!("tag"));
        map.insert("data".into(), serde_json::json!([1, 2, 3]));
        let tag = decode(&map, &reg).unwrap();
        assert_eq!(tag.id(), &Id::Name("hot".into()));
        assert_eq!(tag.canonical_key().unwrap(), "tag_hot");
    }
}
