use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of a record. Never changes across migrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generate a fresh random identifier.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Declared type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    Id,
}

impl FieldType {
    /// Lowercase name used in manifests and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::Id => "id",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bool" => Ok(Self::Bool),
            "int" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            "text" => Ok(Self::Text),
            "bytes" => Ok(Self::Bytes),
            "id" => Ok(Self::Id),
            other => Err(format!(
                "unknown field type `{other}` (supported: bool, int, float, text, bytes, id)"
            )),
        }
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Id(RecordId),
}

impl Value {
    /// The field type this value inhabits, or `None` for [`Value::Null`].
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(FieldType::Bool),
            Self::Int(_) => Some(FieldType::Int),
            Self::Float(_) => Some(FieldType::Float),
            Self::Text(_) => Some(FieldType::Text),
            Self::Bytes(_) => Some(FieldType::Bytes),
            Self::Id(_) => Some(FieldType::Id),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<RecordId> for Value {
    fn from(id: RecordId) -> Self {
        Self::Id(id)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// One persisted record: a typed bag of fields keyed by a stable identity.
///
/// The identity is held in [`Record::id`] and never appears in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Name of the record type this record belongs to.
    pub record_type: String,
    /// Stable identity.
    pub id: RecordId,
    /// Field values by name.
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    /// Create an empty record of `record_type`.
    pub fn new(record_type: impl Into<String>, id: RecordId) -> Self {
        Self {
            record_type: record_type.into(),
            id,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field assignment.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Remove a field, returning its value.
    pub fn take(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    pub fn get_int(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_int)
    }

    pub fn get_text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_text)
    }
}

/// Record selection used by `fetch`. Evaluated by scanning; there is no
/// query planning.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Match a single identity.
    Id(RecordId),
    /// Match records whose field equals the value.
    FieldEq(String, Value),
    /// Match records satisfying every inner filter.
    All(Vec<Filter>),
}

impl Filter {
    pub fn field_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::FieldEq(field.into(), value.into())
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Id(id) => record.id == *id,
            Self::FieldEq(field, value) => record.get(field) == Some(value),
            Self::All(filters) => filters.iter().all(|f| f.matches(record)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_builder_and_accessors() {
        let id = RecordId::new_v4();
        let mut rec = Record::new("Setting", id)
            .with("enabled", true)
            .with("name", "main")
            .with("count", 3i64);

        assert_eq!(rec.get_bool("enabled"), Some(true));
        assert_eq!(rec.get_text("name"), Some("main"));
        assert_eq!(rec.get_int("count"), Some(3));
        assert_eq!(rec.get_bool("missing"), None);

        assert_eq!(rec.take("name"), Some(Value::from("main")));
        assert!(rec.get("name").is_none());
    }

    #[test]
    fn option_into_value() {
        assert_eq!(Value::from(None::<bool>), Value::Null);
        assert_eq!(Value::from(Some(2i64)), Value::Int(2));
    }

    #[test]
    fn filters_match() {
        let id = RecordId::new_v4();
        let rec = Record::new("Todo", id).with("done", false);

        assert!(Filter::Id(id).matches(&rec));
        assert!(!Filter::Id(RecordId::new_v4()).matches(&rec));
        assert!(Filter::field_eq("done", false).matches(&rec));
        assert!(!Filter::field_eq("done", true).matches(&rec));
        assert!(Filter::All(vec![Filter::Id(id), Filter::field_eq("done", false)]).matches(&rec));
        assert!(Filter::All(vec![]).matches(&rec));
    }

    #[test]
    fn record_id_parse_roundtrip() {
        let id = RecordId::new_v4();
        assert_eq!(id.to_string().parse::<RecordId>().unwrap(), id);
        assert!("not-a-uuid".parse::<RecordId>().is_err());
    }

    #[test]
    fn field_type_names() {
        for ty in [
            FieldType::Bool,
            FieldType::Int,
            FieldType::Float,
            FieldType::Text,
            FieldType::Bytes,
            FieldType::Id,
        ] {
            assert_eq!(ty.name().parse::<FieldType>(), Ok(ty));
        }
        assert!("Option<u8>".parse::<FieldType>().is_err());
    }
}
