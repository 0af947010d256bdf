//! Entries and their identity model.
//!
//! An [`Entry`] is a dynamic record instance of a registered type. Its
//! canonical key is `"{type}_{id}"`; tags use a user-chosen name in place
//! of the numeric id. The UNIQUE sentinel is modelled as [`Id::Auto`].

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{RackError, Result};
use crate::schema::{Schema, TAG_TYPE};

/// Separator between type and id in a canonical key.
pub const KEY_SEP: char = '_';

/// Entry identity.
///
/// `Auto` is the UNIQUE sentinel: it compares equal only to itself and
/// requests id assignment at insert time. `Name` is used by tags, which
/// are addressed by a human-chosen identifier instead of a number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Id {
    /// Assign `max(existing id for the type) + 1` at insert time.
    Auto,
    Num(u64),
    Name(String),
}

impl Id {
    pub fn is_auto(&self) -> bool {
        matches!(self, Id::Auto)
    }

    /// JSON form for the encoded envelope. `Auto` has none.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        match self {
            Id::Num(n) => Ok(serde_json::Value::from(*n)),
            Id::Name(s) => Ok(serde_json::Value::from(s.as_str())),
            Id::Auto => Err(RackError::Field(
                "entry id has not been assigned yet".to_string(),
            )),
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Result<Id> {
        match json {
            serde_json::Value::Number(n) => n.as_u64().map(Id::Num).ok_or_else(|| {
                RackError::Field(format!("id {} is not a non-negative integer", n))
            }),
            serde_json::Value::String(s) => Ok(Id::Name(s.clone())),
            other => Err(RackError::Field(format!("invalid id value: {}", other))),
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Num(n) => write!(f, "{}", n),
            Id::Name(s) => write!(f, "{}", s),
            Id::Auto => write!(f, "?"),
        }
    }
}

impl From<u64> for Id {
    fn from(n: u64) -> Self {
        Id::Num(n)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::Name(s.to_string())
    }
}

/// Format a canonical key from its parts.
pub fn canonical_key(type_name: &str, id: &Id) -> Result<String> {
    if id.is_auto() {
        return Err(RackError::Field(format!(
            "cannot derive a canonical key for '{}' before id assignment",
            type_name
        )));
    }
    Ok(format!("{}{}{}", type_name, KEY_SEP, id))
}

/// A materialized foreign-key view, or a tag's projected data.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// A single referenced entry (lone-key foreign fields).
    One(Box<Entry>),
    /// A list of entries (key lists, embedded queries).
    Many(Vec<Entry>),
    /// A plain JSON value (tag `data` without a foreign part).
    Value(serde_json::Value),
}

impl Resolved {
    /// Entries carried by this view, in order. Empty for plain values.
    pub fn entries(&self) -> &[Entry] {
        match self {
            Resolved::One(e) => std::slice::from_ref(e.as_ref()),
            Resolved::Many(v) => v,
            Resolved::Value(_) => &[],
        }
    }
}

/// A record instance.
///
/// Field values are raw JSON; validation against the schema happens at
/// encode/decode time. Resolved foreign-key views are attached by the
/// store on read, cached per-load, and excluded from equality.
#[derive(Debug, Clone)]
pub struct Entry {
    type_name: String,
    id: Id,
    fields: BTreeMap<String, serde_json::Value>,
    views: BTreeMap<String, Resolved>,
}

impl Entry {
    pub fn new(type_name: impl Into<String>, id: impl Into<Id>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
            fields: BTreeMap::new(),
            views: BTreeMap::new(),
        }
    }

    /// A new entry with the UNIQUE sentinel id.
    pub fn auto(type_name: impl Into<String>) -> Self {
        Self::new(type_name, Id::Auto)
    }

    /// A tag carrying a plain data payload.
    pub fn tag(data: impl Into<serde_json::Value>) -> Self {
        Self::auto(TAG_TYPE).with("data", data)
    }

    /// A tag whose data is produced by re-running a query on every read.
    pub fn tag_query(query: impl Into<String>) -> Self {
        Self::auto(TAG_TYPE).with("fk_data", query.into())
    }

    /// Builder-style field assignment.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is_tag(&self) -> bool {
        self.type_name == TAG_TYPE
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    /// The canonical key `"{type}_{id}"`. Fails while the id is still
    /// the UNIQUE sentinel.
    pub fn canonical_key(&self) -> Result<String> {
        canonical_key(&self.type_name, &self.id)
    }

    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Raw field map, as provided by the caller or decoded from storage.
    pub fn raw_fields(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.fields
    }

    /// Ordered `(name, value)` pairs in schema declaration order, the
    /// uniform field iterator over a record. Missing optional fields are
    /// skipped; the envelope is not included.
    pub fn fields_of<'a>(
        &'a self,
        schema: &'a Schema,
    ) -> impl Iterator<Item = (&'a str, &'a serde_json::Value)> {
        schema
            .fields()
            .iter()
            .filter_map(move |spec| self.field(&spec.name).map(|v| (spec.name.as_str(), v)))
    }

    /// The materialized view for a foreign-key field, if resolved.
    pub fn view(&self, name: &str) -> Option<&Resolved> {
        self.views.get(name)
    }

    /// Attach a materialized view. Called by the store's resolver; views
    /// are never written back.
    pub fn attach_view(&mut self, name: impl Into<String>, view: Resolved) {
        self.views.insert(name.into(), view);
    }

    pub fn has_views(&self) -> bool {
        !self.views.is_empty()
    }

    pub(crate) fn from_parts(
        type_name: String,
        id: Id,
        fields: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            type_name,
            id,
            fields,
            views: BTreeMap::new(),
        }
    }
}

/// Equality ignores resolved views: two loads of the same stored record
/// are equal whether or not their foreign keys have been materialized.
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && self.id == other.id && self.fields == other.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_keys() {
        let e = Entry::new("book", 3u64);
        assert_eq!(e.canonical_key().unwrap(), "book_3");

        let t = Entry::tag(serde_json::json!([1, 2])).with_id("hot");
        assert_eq!(t.canonical_key().unwrap(), "tag_hot");

        assert!(Entry::auto("book").canonical_key().is_err());
    }

    impl Entry {
        fn with_id(mut self, id: impl Into<Id>) -> Self {
            self.id = id.into();
            self
        }
    }

    #[test]
    fn equality_ignores_views() {
        let a = Entry::new("book", 0u64).with("title", "A");
        let mut b = a.clone();
        b.attach_view("books", Resolved::Many(vec![]));
        assert_eq!(a, b);
    }

    #[test]
    fn unique_sentinel() {
        assert!(Id::Auto.is_auto());
        assert_eq!(Id::Auto, Id::Auto);
        assert_ne!(Id::Auto, Id::Num(0));
        assert!(Id::Auto.to_json().is_err());
    }
}
