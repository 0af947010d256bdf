//! Record type registration.
//!
//! Every entry type stored in the database is described by a [`Schema`]:
//! an ordered field descriptor table built once at registration time. The
//! registry is per-store and injected at construction; there are no
//! process-wide singletons.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{RackError, Result};

/// Field names beginning with this prefix declare foreign-key fields.
pub const FK_PREFIX: &str = "fk_";

/// The built-in tag type name.
pub const TAG_TYPE: &str = "tag";

/// Semantic kind of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Str,
    Int,
    Float,
    Bool,
    List,
    Map,
    Null,
    /// Any JSON value. Used by the tag `data` field.
    Any,
}

impl FieldKind {
    /// Check a JSON value against this kind. `Null` is additionally
    /// accepted for fields that carry a default (the codec handles that).
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value as J;
        match self {
            FieldKind::Str => value.is_string(),
            FieldKind::Int => value.is_i64() || value.is_u64(),
            // JSON has one number type; an integer literal is a valid float.
            FieldKind::Float => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::List => value.is_array(),
            FieldKind::Map => value.is_object(),
            FieldKind::Null => matches!(value, J::Null),
            FieldKind::Any => true,
        }
    }
}

/// A single field descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    /// Filled in for missing fields at decode time. `None` means required.
    pub default: Option<serde_json::Value>,
    /// `Some(view)` for `fk_<view>` fields.
    pub view: Option<String>,
}

impl FieldSpec {
    /// A required field with no default.
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            view: None,
        }
    }

    /// An optional field, filled with `default` when absent.
    pub fn optional(
        name: impl Into<String>,
        kind: FieldKind,
        default: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            default: Some(default),
            view: None,
        }
    }

    /// A foreign-key field. The name must carry the `fk_` prefix; the
    /// suffix becomes the projected view name. The stored value is a key
    /// string, a list of key strings, or a query string; the field is
    /// always optional (defaults to null).
    pub fn foreign(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let view = name
            .strip_prefix(FK_PREFIX)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                RackError::Field(format!(
                    "foreign-key field '{}' must be named '{}<view>'",
                    name, FK_PREFIX
                ))
            })?
            .to_string();
        Ok(Self {
            name,
            kind: FieldKind::Any,
            default: Some(serde_json::Value::Null),
            view: Some(view),
        })
    }

    pub fn is_foreign(&self) -> bool {
        self.view.is_some()
    }
}

/// A registered record type: name plus ordered field descriptors.
#[derive(Debug, Clone)]
pub struct Schema {
    type_name: String,
    fields: Vec<FieldSpec>,
    /// Registration index; drives the canonical sort order. The tag
    /// schema reports `usize::MAX` so tags always sort last.
    index: usize,
}

impl Schema {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Foreign-key fields in declaration order.
    pub fn foreign_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.is_foreign())
    }

    /// The `fk_` field owning a projected view name, if any.
    pub fn view_owner(&self, view: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.view.as_deref() == Some(view))
    }

    fn validate(&self) -> Result<()> {
        let mut seen: HashMap<&str, ()> = HashMap::new();
        for field in &self.fields {
            if field.name == "id" || field.name == "type" {
                return Err(RackError::Field(format!(
                    "'{}' collides with the entry envelope",
                    field.name
                )));
            }
            if seen.insert(field.name.as_str(), ()).is_some() {
                return Err(RackError::Field(format!(
                    "duplicate field '{}' on type '{}'",
                    field.name, self.type_name
                )));
            }
            if !field.is_foreign() && field.name.starts_with(FK_PREFIX) {
                return Err(RackError::Field(format!(
                    "field '{}' uses the reserved '{}' prefix but was not declared foreign",
                    field.name, FK_PREFIX
                )));
            }
        }
        // A foreign-key field fk_X forbids a sibling field literally named X.
        for field in self.fields.iter().filter(|f| f.is_foreign()) {
            let view = field.view.as_deref().unwrap_or_default();
            if self.fields.iter().any(|f| f.name == view) {
                return Err(RackError::Field(format!(
                    "view '{}' of '{}' collides with a declared field on type '{}'",
                    view, field.name, self.type_name
                )));
            }
        }
        Ok(())
    }
}

/// Per-store registry of entry schemas.
///
/// Registration order is stable and defines the sort order used by the
/// store's `sort()`. The built-in `tag` schema is always present and
/// always sorts last.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: Vec<Schema>,
    by_name: HashMap<String, usize>,
    tag: Schema,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        let tag = Schema {
            type_name: TAG_TYPE.to_string(),
            fields: vec![
                FieldSpec::optional("data", FieldKind::Any, serde_json::Value::Null),
                FieldSpec::foreign("fk_data").expect("static fk name"),
            ],
            index: usize::MAX,
        };
        Self {
            schemas: Vec::new(),
            by_name: HashMap::new(),
            tag,
        }
    }

    /// Register a record type. Rejects duplicate names and malformed
    /// field lists.
    pub fn register(&mut self, type_name: impl Into<String>, fields: Vec<FieldSpec>) -> Result<()> {
        let type_name = type_name.into();
        if type_name.is_empty()
            || !type_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(RackError::Schema(format!(
                "'{}' is not a valid type name",
                type_name
            )));
        }
        if type_name == TAG_TYPE || self.by_name.contains_key(&type_name) {
            return Err(RackError::Schema(format!(
                "type '{}' is already registered",
                type_name
            )));
        }
        let schema = Schema {
            type_name: type_name.clone(),
            fields,
            index: self.schemas.len(),
        };
        schema.validate()?;
        self.by_name.insert(type_name, self.schemas.len());
        self.schemas.push(schema);
        Ok(())
    }

    pub fn get(&self, type_name: &str) -> Option<&Schema> {
        if type_name == TAG_TYPE {
            return Some(&self.tag);
        }
        self.by_name.get(type_name).map(|&i| &self.schemas[i])
    }

    /// Schema lookup that rejects unknown types.
    pub fn schema_for(&self, type_name: &str) -> Result<&Schema> {
        self.get(type_name).ok_or_else(|| {
            RackError::Schema(format!("'{}' is not a registered type", type_name))
        })
    }

    pub fn contains(&self, type_name: &str) -> bool {
        type_name == TAG_TYPE || self.by_name.contains_key(type_name)
    }

    /// All registered type names in registration order, tag last.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.schemas
            .iter()
            .map(|s| s.type_name.as_str())
            .chain(std::iter::once(TAG_TYPE))
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
