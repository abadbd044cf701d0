use crate::error::MigrationError;
use crate::schema::{SchemaDescriptor, SchemaError};
use crate::version::SchemaVersion;

/// The set of known schema versions, in declaration order.
///
/// Declaration order is migration path order; it need not match numeric
/// version order. A registry is built once and never mutated, so it can be
/// shared (e.g. behind an `Arc`) and several independent registries can live
/// side by side in one process.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: Vec<SchemaDescriptor>,
}

impl SchemaRegistry {
    /// Build a registry. Versions must be pairwise distinct and at least one
    /// schema must be given.
    pub fn new(schemas: Vec<SchemaDescriptor>) -> Result<Self, SchemaError> {
        if schemas.is_empty() {
            return Err(SchemaError::EmptyRegistry);
        }
        for (i, schema) in schemas.iter().enumerate() {
            if schemas[..i].iter().any(|s| s.version() == schema.version()) {
                return Err(SchemaError::DuplicateVersion(schema.version()));
            }
        }
        Ok(Self { schemas })
    }

    /// Look up the descriptor for `version`.
    pub fn describe(&self, version: SchemaVersion) -> Result<&SchemaDescriptor, MigrationError> {
        self.schemas
            .iter()
            .find(|s| s.version() == version)
            .ok_or(MigrationError::UnknownVersion(version))
    }

    /// All versions in registration order.
    pub fn all_versions(&self) -> Vec<SchemaVersion> {
        self.schemas.iter().map(SchemaDescriptor::version).collect()
    }

    pub fn contains(&self, version: SchemaVersion) -> bool {
        self.schemas.iter().any(|s| s.version() == version)
    }

    /// The first registered schema.
    pub fn oldest(&self) -> &SchemaDescriptor {
        // Non-empty by construction.
        &self.schemas[0]
    }

    /// The last registered schema.
    pub fn latest(&self) -> &SchemaDescriptor {
        &self.schemas[self.schemas.len() - 1]
    }

    /// Descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &SchemaDescriptor> {
        self.schemas.iter()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
