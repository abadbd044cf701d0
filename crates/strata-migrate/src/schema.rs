//! Schema descriptors: the declared shape of every record type at one version.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::record::{FieldType, Record, Value};
use crate::version::SchemaVersion;

/// Identity field name used when a record type does not declare one.
pub const DEFAULT_IDENTITY_FIELD: &str = "id";

/// One field of a record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Declared value type.
    pub field_type: FieldType,
    /// Whether `Null` is an accepted value.
    pub optional: bool,
    /// Value given to this field when a migration introduces it.
    pub default: Option<Value>,
}

impl FieldDef {
    /// A required field with no default.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            optional: false,
            default: None,
        }
    }

    /// Mark the field optional (accepts `Null`).
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Declare the default used when a migration introduces the field.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    fn accepts(&self, value: &Value) -> bool {
        match value.field_type() {
            None => self.optional,
            Some(ty) => ty == self.field_type,
        }
    }

    /// Value a freshly introduced field starts with.
    fn initial_value(&self) -> Value {
        self.default.clone().unwrap_or(Value::Null)
    }
}

/// A named record shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordType {
    /// Record type name. Stages map same-named types across versions.
    pub name: String,
    /// Name of the unique identity field (carried as `Record::id`).
    pub identity: String,
    /// Ordered field declarations, excluding the identity.
    pub fields: Vec<FieldDef>,
}

impl RecordType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity: DEFAULT_IDENTITY_FIELD.to_string(),
            fields: Vec::new(),
        }
    }

    /// Override the identity field name.
    pub fn identity(mut self, name: impl Into<String>) -> Self {
        self.identity = name.into();
        self
    }

    /// Append a field declaration.
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Look up a field declaration by name.
    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check that `record` has exactly this shape.
    pub fn check(&self, record: &Record) -> Result<(), ConformanceError> {
        for def in &self.fields {
            match record.fields.get(&def.name) {
                None if def.optional => {}
                None => {
                    return Err(ConformanceError::MissingField {
                        record_type: self.name.clone(),
                        field: def.name.clone(),
                    })
                }
                Some(value) if def.accepts(value) => {}
                Some(Value::Null) => {
                    return Err(ConformanceError::NullInRequired {
                        record_type: self.name.clone(),
                        field: def.name.clone(),
                    })
                }
                Some(value) => {
                    return Err(ConformanceError::TypeMismatch {
                        record_type: self.name.clone(),
                        field: def.name.clone(),
                        expected: def.field_type,
                        found: value.field_type(),
                    })
                }
            }
        }

        if let Some(extra) = record
            .fields
            .keys()
            .find(|name| self.field_def(name).is_none())
        {
            return Err(ConformanceError::UnexpectedField {
                record_type: self.name.clone(),
                field: extra.clone(),
            });
        }

        Ok(())
    }

    fn validate(&self) -> Result<(), SchemaError> {
        if self.name.is_empty() {
            return Err(SchemaError::EmptyName);
        }
        let mut seen = BTreeSet::new();
        for def in &self.fields {
            if def.name == self.identity {
                return Err(SchemaError::IdentityRedeclared {
                    record_type: self.name.clone(),
                    field: def.name.clone(),
                });
            }
            if !seen.insert(def.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    record_type: self.name.clone(),
                    field: def.name.clone(),
                });
            }
            if let Some(default) = &def.default {
                if !def.accepts(default) {
                    return Err(SchemaError::InvalidDefault {
                        record_type: self.name.clone(),
                        field: def.name.clone(),
                        expected: def.field_type,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Immutable description of one schema version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaDescriptor {
    version: SchemaVersion,
    record_types: Vec<RecordType>,
}

impl SchemaDescriptor {
    /// Build a descriptor, rejecting duplicate type or field names and
    /// defaults that do not match their field type.
    pub fn new(version: SchemaVersion, record_types: Vec<RecordType>) -> Result<Self, SchemaError> {
        let mut names = BTreeSet::new();
        for rt in &record_types {
            rt.validate()?;
            if !names.insert(rt.name.as_str()) {
                return Err(SchemaError::DuplicateRecordType {
                    version,
                    record_type: rt.name.clone(),
                });
            }
        }
        Ok(Self {
            version,
            record_types,
        })
    }

    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    pub fn record_types(&self) -> &[RecordType] {
        &self.record_types
    }

    pub fn record_type(&self, name: &str) -> Option<&RecordType> {
        self.record_types.iter().find(|rt| rt.name == name)
    }

    /// Check a record against the declared shape of its type.
    pub fn check(&self, record: &Record) -> Result<(), ConformanceError> {
        self.record_type(&record.record_type)
            .ok_or_else(|| ConformanceError::UnknownRecordType {
                version: self.version,
                record_type: record.record_type.clone(),
            })?
            .check(record)
    }
}

/// Rewrite `record` from the `from` shape into the `to` shape.
///
/// Fields present in both shapes with the same name and type are kept.
/// Fields missing from `to` are dropped. Fields new in `to` take their
/// declared default, or `Null` when none is declared. Renames are never
/// inferred here; stages declare them explicitly.
pub fn reshape(mut record: Record, from: &RecordType, to: &RecordType) -> Record {
    let mut fields = std::collections::BTreeMap::new();
    for def in &to.fields {
        let carried = from
            .field_def(&def.name)
            .filter(|old| old.field_type == def.field_type)
            .and_then(|_| record.fields.remove(&def.name));
        fields.insert(def.name.clone(), carried.unwrap_or_else(|| def.initial_value()));
    }
    record.fields = fields;
    record
}

/// Invalid schema declaration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("record type name must not be empty")]
    EmptyName,
    #[error("record type `{record_type}` declared twice in schema {version}")]
    DuplicateRecordType {
        version: SchemaVersion,
        record_type: String,
    },
    #[error("field `{field}` declared twice in record type `{record_type}`")]
    DuplicateField { record_type: String, field: String },
    #[error("identity field `{field}` of `{record_type}` must not be declared as a regular field")]
    IdentityRedeclared { record_type: String, field: String },
    #[error("default for `{record_type}.{field}` is not a valid {expected}")]
    InvalidDefault {
        record_type: String,
        field: String,
        expected: FieldType,
    },
    #[error("schema version {0} registered twice")]
    DuplicateVersion(SchemaVersion),
    #[error("a schema registry needs at least one schema")]
    EmptyRegistry,
}

/// A record does not match the declared shape.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConformanceError {
    #[error("record type `{record_type}` is not part of schema {version}")]
    UnknownRecordType {
        version: SchemaVersion,
        record_type: String,
    },
    #[error("`{record_type}` record is missing required field `{field}`")]
    MissingField { record_type: String, field: String },
    #[error("`{record_type}` record has undeclared field `{field}`")]
    UnexpectedField { record_type: String, field: String },
    #[error("required field `{record_type}.{field}` is null")]
    NullInRequired { record_type: String, field: String },
    #[error("field `{record_type}.{field}` expected {expected}, found {}", .found.map_or("null", FieldType::name))]
    TypeMismatch {
        record_type: String,
        field: String,
        expected: FieldType,
        found: Option<FieldType>,
    },
}
