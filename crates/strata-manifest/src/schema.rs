use serde::Deserialize;

/// Top-level structure of a `strata.toml` manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestFile {
    /// Schema versions, in registry (migration path) order.
    #[serde(rename = "schema", default)]
    pub schemas: Vec<SchemaDecl>,
    /// Named migration plans.
    #[serde(rename = "plan", default)]
    pub plans: Vec<PlanDecl>,
}

/// One schema version and the record types it declares.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaDecl {
    /// Version string, e.g. `"1"` or `"2.1.0"`.
    pub version: String,
    #[serde(rename = "record", default)]
    pub records: Vec<RecordDecl>,
}

/// A record type within a schema version.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordDecl {
    /// Record type name in PascalCase (e.g., `"Setting"`).
    pub name: String,
    /// Identity field name. Defaults to `"id"`.
    pub identity: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
}

/// A single field of a record type.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    /// One of `bool`, `int`, `float`, `text`, `bytes`, `id`.
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub optional: bool,
    /// Value given to the field when a migration introduces it.
    pub default: Option<toml::Value>,
}

/// Path direction of a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionDecl {
    #[default]
    Upgrade,
    Downgrade,
}

/// A named migration plan.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanDecl {
    pub name: String,
    /// Versions covered by the plan, in registry order.
    pub schemas: Vec<String>,
    #[serde(default)]
    pub direction: DirectionDecl,
    /// Stages in path order.
    #[serde(rename = "stage", default)]
    pub stages: Vec<StageDecl>,
}

/// One declarative stage.
#[derive(Debug, Clone, Deserialize)]
pub struct StageDecl {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub renames: Vec<RenameDecl>,
    /// Constant assignments applied to every record in the did phase.
    #[serde(default)]
    pub set: Vec<SetDecl>,
}

/// `from` in the source shape of `record` becomes `to` in the target shape.
#[derive(Debug, Clone, Deserialize)]
pub struct RenameDecl {
    pub record: String,
    pub from: String,
    pub to: String,
}

/// Assign `value` to `field` on every `record`.
#[derive(Debug, Clone, Deserialize)]
pub struct SetDecl {
    pub record: String,
    pub field: String,
    pub value: toml::Value,
}
