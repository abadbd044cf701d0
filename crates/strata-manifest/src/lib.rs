//! # strata-manifest
//!
//! Declarative schema registries and migration plans for strata.
//!
//! A `strata.toml` manifest lists every schema version with its record
//! types, and any number of named plans made of declarative stages. Loading
//! a manifest validates it (collecting every problem with its location),
//! then builds a [`SchemaRegistry`] and one [`MigrationPlan`] per plan.
//!
//! Declarative stages support two operations:
//!
//! - `renames`: carry a field's value to a new name across the stage.
//! - `set`: assign a constant to a field on every record of a type.
//!
//! Anything else needs a custom stage written in Rust.
//!
//! # Example
//!
//! ```rust
//! use strata_manifest::Manifest;
//! use strata_migrate::SchemaVersion;
//!
//! let manifest: Manifest = r#"
//! [[schema]]
//! version = "1"
//!
//! [[schema.record]]
//! name = "Setting"
//! fields = [{ name = "notificationEnabled", type = "bool" }]
//!
//! [[schema]]
//! version = "2"
//!
//! [[schema.record]]
//! name = "Setting"
//! fields = [
//!     { name = "pushNotificationEnabled", type = "bool" },
//!     { name = "syncCalendarEnabled", type = "bool", default = false },
//! ]
//!
//! [[plan]]
//! name = "upgrade"
//! schemas = ["1", "2"]
//!
//! [[plan.stage]]
//! from = "1"
//! to = "2"
//! renames = [{ record = "Setting", from = "notificationEnabled", to = "pushNotificationEnabled" }]
//! "#
//! .parse()
//! .unwrap();
//!
//! assert_eq!(manifest.registry().latest().version(), SchemaVersion::major(2));
//! assert_eq!(manifest.plan("upgrade").unwrap().stages().len(), 1);
//! ```

mod convert;
mod schema;
mod validator;

pub use schema::{
    DirectionDecl, FieldDecl, ManifestFile, PlanDecl, RecordDecl, RenameDecl, SchemaDecl, SetDecl,
    StageDecl,
};
pub use validator::{validate_manifest, ValidationError};

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use strata_migrate::{
    Direction, FieldDef, FieldType, MigrationError, MigrationPlan, MigrationStage, RecordType,
    SchemaDescriptor, SchemaError, SchemaRegistry, SchemaVersion,
};

/// Default manifest file name.
pub const DEFAULT_MANIFEST: &str = "strata.toml";

/// Error loading or building a manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Failed to read the manifest file.
    #[error("could not read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the TOML.
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Manifest validation failed.
    #[error("{}", ValidationReport(.0))]
    Validation(Vec<ValidationError>),

    /// A validated schema was still rejected by the registry.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A validated plan was still rejected by the engine.
    #[error(transparent)]
    Plan(#[from] MigrationError),

    /// No plan with this name is declared.
    #[error("no plan named `{0}` in manifest")]
    UnknownPlan(String),
}

struct ValidationReport<'a>(&'a [ValidationError]);

impl fmt::Display for ValidationReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "manifest validation failed:")?;
        for e in self.0 {
            writeln!(f, "  - {e}")?;
        }
        Ok(())
    }
}

/// A loaded manifest: the registry and its named plans.
#[derive(Debug)]
pub struct Manifest {
    registry: Arc<SchemaRegistry>,
    plans: BTreeMap<String, MigrationPlan>,
}

impl Manifest {
    /// Read, validate and build the manifest at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest = content.parse::<Self>()?;
        tracing::debug!(
            path = %path.display(),
            schemas = manifest.registry.len(),
            plans = manifest.plans.len(),
            "manifest loaded"
        );
        Ok(manifest)
    }

    /// Validate and build an already parsed manifest file.
    pub fn from_file(file: &ManifestFile) -> Result<Self, ManifestError> {
        validate_manifest(file).map_err(ManifestError::Validation)?;

        let schemas = file
            .schemas
            .iter()
            .map(build_schema)
            .collect::<Result<Vec<_>, _>>()?;
        let registry = Arc::new(SchemaRegistry::new(schemas)?);

        let mut plans = BTreeMap::new();
        for decl in &file.plans {
            let plan = build_plan(decl, &registry)?;
            plan.validate_against(&registry)?;
            plans.insert(decl.name.clone(), plan);
        }

        Ok(Self { registry, plans })
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// The registry as a shareable handle, for building an engine.
    pub fn shared_registry(&self) -> Arc<SchemaRegistry> {
        Arc::clone(&self.registry)
    }

    /// Look up a plan by name.
    pub fn plan(&self, name: &str) -> Result<&MigrationPlan, ManifestError> {
        self.plans
            .get(name)
            .ok_or_else(|| ManifestError::UnknownPlan(name.to_string()))
    }

    /// Declared plan names, sorted.
    pub fn plan_names(&self) -> impl Iterator<Item = &str> {
        self.plans.keys().map(String::as_str)
    }
}

impl FromStr for Manifest {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let file: ManifestFile = toml::from_str(s)?;
        Self::from_file(&file)
    }
}

// Builders run on validated input; any parse failure left is reported as a
// validation error.

fn invalid(message: String) -> ManifestError {
    ManifestError::Validation(vec![ValidationError {
        plan: None,
        schema: None,
        record: None,
        field: None,
        message,
    }])
}

fn parse_version(raw: &str) -> Result<SchemaVersion, ManifestError> {
    raw.parse::<SchemaVersion>().map_err(|e| invalid(e.to_string()))
}

fn parse_type(raw: &str) -> Result<FieldType, ManifestError> {
    raw.parse::<FieldType>().map_err(invalid)
}

fn build_schema(decl: &SchemaDecl) -> Result<SchemaDescriptor, ManifestError> {
    let version = parse_version(&decl.version)?;
    let mut record_types = Vec::with_capacity(decl.records.len());
    for record in &decl.records {
        let mut record_type = RecordType::new(record.name.clone());
        if let Some(identity) = &record.identity {
            record_type = record_type.identity(identity.clone());
        }
        for field in &record.fields {
            let field_type = parse_type(&field.field_type)?;
            let mut def = FieldDef::new(field.name.clone(), field_type);
            if field.optional {
                def = def.optional();
            }
            if let Some(default) = &field.default {
                def = def.default_value(convert::to_value(default, field_type).map_err(invalid)?);
            }
            record_type = record_type.field(def);
        }
        record_types.push(record_type);
    }
    Ok(SchemaDescriptor::new(version, record_types)?)
}

fn build_plan(decl: &PlanDecl, registry: &SchemaRegistry) -> Result<MigrationPlan, ManifestError> {
    let schemas = decl
        .schemas
        .iter()
        .map(|raw| parse_version(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let mut stages = Vec::with_capacity(decl.stages.len());
    for stage in &decl.stages {
        let from = parse_version(&stage.from)?;
        let to = parse_version(&stage.to)?;
        let target = registry.describe(to)?;

        let mut builder = MigrationStage::custom(from, to);
        for rename in &stage.renames {
            builder = builder.rename_field(rename.record.clone(), rename.from.clone(), rename.to.clone());
        }
        for set in &stage.set {
            let field_type = target
                .record_type(&set.record)
                .and_then(|rt| rt.field_def(&set.field))
                .map(|def| def.field_type)
                .ok_or_else(|| invalid(format!("`{}.{}` is not declared in schema {to}", set.record, set.field)))?;
            let value = convert::to_value(&set.value, field_type).map_err(invalid)?;
            builder = builder.assign_field(set.record.clone(), set.field.clone(), value);
        }
        stages.push(builder.build());
    }

    let direction = match decl.direction {
        DirectionDecl::Upgrade => Direction::Upgrade,
        DirectionDecl::Downgrade => Direction::Downgrade,
    };
    Ok(MigrationPlan::new(decl.name.clone(), direction, schemas, stages)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
[[schema]]
version = "1"

[[schema.record]]
name = "Todo"
fields = [{ name = "title", type = "text" }]

[[schema.record]]
name = "Setting"
identity = "key"
fields = [{ name = "notificationEnabled", type = "bool" }]

[[schema]]
version = "2"

[[schema.record]]
name = "Todo"
fields = [{ name = "title", type = "text" }]

[[schema.record]]
name = "Setting"
identity = "key"
fields = [
    { name = "pushNotificationEnabled", type = "bool" },
    { name = "syncCalendarEnabled", type = "bool", default = false },
    { name = "note", type = "text", optional = true },
]

[[plan]]
name = "upgrade"
schemas = ["1", "2"]

[[plan.stage]]
from = "1"
to = "2"
renames = [{ record = "Setting", from = "notificationEnabled", to = "pushNotificationEnabled" }]
set = [{ record = "Setting", field = "syncCalendarEnabled", value = true }]

[[plan]]
name = "downgrade"
schemas = ["1", "2"]
direction = "downgrade"

[[plan.stage]]
from = "2"
to = "1"
renames = [{ record = "Setting", from = "pushNotificationEnabled", to = "notificationEnabled" }]
"#;

    #[test]
    fn builds_registry_and_plans() {
        let manifest: Manifest = MANIFEST.parse().unwrap();

        let registry = manifest.registry();
        assert_eq!(
            registry.all_versions(),
            vec![SchemaVersion::major(1), SchemaVersion::major(2)]
        );
        let setting = registry
            .describe(SchemaVersion::major(2))
            .unwrap()
            .record_type("Setting")
            .unwrap();
        assert_eq!(setting.identity, "key");
        assert!(setting.field_def("note").unwrap().optional);

        assert_eq!(manifest.plan_names().collect::<Vec<_>>(), vec!["downgrade", "upgrade"]);

        let upgrade = manifest.plan("upgrade").unwrap();
        assert_eq!(upgrade.direction(), Direction::Upgrade);
        let stage = &upgrade.stages()[0];
        assert_eq!(stage.renames()[0].from, "notificationEnabled");
        assert_eq!(stage.assignments()[0].field, "syncCalendarEnabled");

        let downgrade = manifest.plan("downgrade").unwrap();
        assert_eq!(downgrade.direction(), Direction::Downgrade);
        assert_eq!(downgrade.stages()[0].from_version(), SchemaVersion::major(2));
    }

    #[test]
    fn unknown_plan_is_an_error() {
        let manifest: Manifest = MANIFEST.parse().unwrap();
        assert!(matches!(
            manifest.plan("sideways"),
            Err(ManifestError::UnknownPlan(name)) if name == "sideways"
        ));
    }

    #[test]
    fn validation_errors_surface_together() {
        let err = "[[schema]]\nversion = \"x\"\n[[plan]]\nname = \"p\"\nschemas = []\n"
            .parse::<Manifest>()
            .unwrap_err();
        match &err {
            ManifestError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
        let text = err.to_string();
        assert!(text.starts_with("manifest validation failed:"));
        assert!(text.contains("  - [schema=x]"));
        assert!(text.contains("  - [plan=p]"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            "[[schema]\n".parse::<Manifest>(),
            Err(ManifestError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Manifest::load("definitely/not/here/strata.toml").unwrap_err();
        assert!(matches!(err, ManifestError::Io { .. }));
    }
}
