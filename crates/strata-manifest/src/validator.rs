use std::collections::{BTreeMap, HashSet};
use std::fmt;

use strata_migrate::{FieldType, SchemaVersion, DEFAULT_IDENTITY_FIELD};

use crate::convert::to_value;
use crate::schema::{DirectionDecl, FieldDecl, ManifestFile, PlanDecl, SchemaDecl, StageDecl};

/// A single validation error with context about where it occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub plan: Option<String>,
    pub schema: Option<String>,
    pub record: Option<String>,
    pub field: Option<String>,
    pub message: String,
}

impl ValidationError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            plan: None,
            schema: None,
            record: None,
            field: None,
            message: message.into(),
        }
    }

    fn in_plan(mut self, plan: &str) -> Self {
        self.plan = Some(plan.to_string());
        self
    }

    fn in_schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.to_string());
        self
    }

    fn in_record(mut self, record: &str) -> Self {
        self.record = Some(record.to_string());
        self
    }

    fn in_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ctx = Vec::new();
        if let Some(p) = &self.plan {
            ctx.push(format!("plan={p}"));
        }
        if let Some(s) = &self.schema {
            ctx.push(format!("schema={s}"));
        }
        if let Some(r) = &self.record {
            ctx.push(format!("record={r}"));
        }
        if let Some(field) = &self.field {
            ctx.push(format!("field={field}"));
        }
        if ctx.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "[{}] {}", ctx.join(", "), self.message)
        }
    }
}

/// Validate a parsed manifest. Returns `Ok(())` if valid, or every problem
/// found.
pub fn validate_manifest(manifest: &ManifestFile) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if manifest.schemas.is_empty() {
        errors.push(ValidationError::new("manifest must declare at least one schema"));
    }

    let mut declared: BTreeMap<SchemaVersion, &SchemaDecl> = BTreeMap::new();
    for schema in &manifest.schemas {
        match schema.version.parse::<SchemaVersion>() {
            Ok(version) => {
                if declared.insert(version, schema).is_some() {
                    errors.push(
                        ValidationError::new("duplicate schema version").in_schema(&schema.version),
                    );
                }
            }
            Err(e) => errors.push(ValidationError::new(e.to_string()).in_schema(&schema.version)),
        }
        validate_schema(schema, &mut errors);
    }

    let mut plan_names = HashSet::new();
    for plan in &manifest.plans {
        if !plan_names.insert(plan.name.as_str()) {
            errors.push(ValidationError::new("duplicate plan name").in_plan(&plan.name));
        }
        validate_plan(plan, &declared, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_schema(schema: &SchemaDecl, errors: &mut Vec<ValidationError>) {
    let at = |message: String| ValidationError::new(message).in_schema(&schema.version);

    let mut record_names = HashSet::new();
    for record in &schema.records {
        if !record
            .name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_uppercase())
        {
            errors.push(
                at("record name must be PascalCase (start with uppercase)".into())
                    .in_record(&record.name),
            );
        }
        if !record_names.insert(record.name.as_str()) {
            errors.push(at("duplicate record name".into()).in_record(&record.name));
        }

        let identity = record.identity.as_deref().unwrap_or(DEFAULT_IDENTITY_FIELD);
        if identity.is_empty() {
            errors.push(at("identity field name must not be empty".into()).in_record(&record.name));
        }

        let mut field_names = HashSet::new();
        for field in &record.fields {
            let at_field = |message: String| at(message).in_record(&record.name).in_field(&field.name);

            if field.name.is_empty() {
                errors.push(at_field("field name must not be empty".into()));
            }
            if !field_names.insert(field.name.as_str()) {
                errors.push(at_field("duplicate field name".into()));
            }
            if field.name == identity {
                errors.push(at_field(format!(
                    "`{identity}` is the identity field and must not be declared as a regular field"
                )));
            }

            match field.field_type.parse::<FieldType>() {
                Ok(field_type) => {
                    if let Some(default) = &field.default {
                        if let Err(e) = to_value(default, field_type) {
                            errors.push(at_field(format!("invalid default: {e}")));
                        }
                    }
                }
                Err(e) => errors.push(at_field(e)),
            }
        }
    }
}

fn validate_plan(
    plan: &PlanDecl,
    declared: &BTreeMap<SchemaVersion, &SchemaDecl>,
    errors: &mut Vec<ValidationError>,
) {
    let at = |message: String| ValidationError::new(message).in_plan(&plan.name);

    if plan.name.is_empty() {
        errors.push(at("plan name must not be empty".into()));
    }
    if plan.schemas.is_empty() {
        errors.push(at("plan must list at least one schema".into()));
        return;
    }

    let mut versions = Vec::new();
    for raw in &plan.schemas {
        match raw.parse::<SchemaVersion>() {
            Ok(version) if !declared.contains_key(&version) => {
                errors.push(at(format!("schema {version} is not declared")).in_schema(raw));
            }
            Ok(version) if versions.contains(&version) => {
                errors.push(at("schema listed twice".into()).in_schema(raw));
            }
            Ok(version) => versions.push(version),
            Err(e) => errors.push(at(e.to_string()).in_schema(raw)),
        }
    }
    if versions.len() != plan.schemas.len() {
        // Stage pairing is meaningless without a clean schema list.
        return;
    }

    let expected_stages = versions.len() - 1;
    if plan.stages.len() != expected_stages {
        errors.push(at(format!(
            "{} schemas need {expected_stages} stages, found {}",
            versions.len(),
            plan.stages.len()
        )));
    }

    let last = versions.len() - 1;
    for (i, stage) in plan.stages.iter().enumerate().take(expected_stages) {
        let (from, to) = match plan.direction {
            DirectionDecl::Upgrade => (versions[i], versions[i + 1]),
            DirectionDecl::Downgrade => (versions[last - i], versions[last - i - 1]),
        };
        let at_stage = |message: String| at(format!("stage {i}: {message}"));

        let (Ok(stage_from), Ok(stage_to)) = (
            stage.from.parse::<SchemaVersion>(),
            stage.to.parse::<SchemaVersion>(),
        ) else {
            errors.push(at_stage(format!(
                "invalid versions `{}` -> `{}`",
                stage.from, stage.to
            )));
            continue;
        };
        if (stage_from, stage_to) != (from, to) {
            errors.push(at_stage(format!(
                "expected {from} -> {to}, found {stage_from} -> {stage_to}"
            )));
            continue;
        }

        // Both versions were checked against `declared` above.
        if let (Some(source), Some(target)) = (declared.get(&from), declared.get(&to)) {
            validate_stage(stage, source, target, &at_stage, errors);
        }
    }
}

fn validate_stage(
    stage: &StageDecl,
    source: &SchemaDecl,
    target: &SchemaDecl,
    at_stage: &dyn Fn(String) -> ValidationError,
    errors: &mut Vec<ValidationError>,
) {
    for rename in &stage.renames {
        if find_field(source, &rename.record, &rename.from).is_none() {
            errors.push(
                at_stage(format!(
                    "rename source `{}` is not declared in schema {}",
                    rename.from, source.version
                ))
                .in_record(&rename.record)
                .in_field(&rename.from),
            );
        }
        if find_field(target, &rename.record, &rename.to).is_none() {
            errors.push(
                at_stage(format!(
                    "rename target `{}` is not declared in schema {}",
                    rename.to, target.version
                ))
                .in_record(&rename.record)
                .in_field(&rename.to),
            );
        }
    }

    for set in &stage.set {
        let at_set = |message: String| at_stage(message).in_record(&set.record).in_field(&set.field);
        match find_field(target, &set.record, &set.field) {
            None => errors.push(at_set(format!(
                "assigned field is not declared in schema {}",
                target.version
            ))),
            Some(field) => {
                if let Ok(field_type) = field.field_type.parse::<FieldType>() {
                    if let Err(e) = to_value(&set.value, field_type) {
                        errors.push(at_set(format!("invalid value: {e}")));
                    }
                }
            }
        }
    }
}

fn find_field<'s>(schema: &'s SchemaDecl, record: &str, field: &str) -> Option<&'s FieldDecl> {
    schema
        .records
        .iter()
        .find(|r| r.name == record)?
        .fields
        .iter()
        .find(|f| f.name == field)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> ManifestFile {
        toml::from_str(toml).unwrap()
    }

    const SCHEMAS: &str = r#"
[[schema]]
version = "1"

[[schema.record]]
name = "Setting"
fields = [{ name = "notificationEnabled", type = "bool" }]

[[schema]]
version = "2"

[[schema.record]]
name = "Setting"
fields = [
    { name = "pushNotificationEnabled", type = "bool" },
    { name = "syncCalendarEnabled", type = "bool", default = false },
]
"#;

    #[test]
    fn valid_manifest_passes() {
        let manifest = parse(&format!(
            r#"{SCHEMAS}
[[plan]]
name = "upgrade"
schemas = ["1", "2"]

[[plan.stage]]
from = "1"
to = "2"
renames = [{{ record = "Setting", from = "notificationEnabled", to = "pushNotificationEnabled" }}]
set = [{{ record = "Setting", field = "syncCalendarEnabled", value = true }}]
"#
        ));
        assert!(validate_manifest(&manifest).is_ok());
    }

    #[test]
    fn empty_manifest_fails() {
        let errs = validate_manifest(&parse("")).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("at least one schema"));
    }

    #[test]
    fn schema_problems_are_all_collected() {
        let manifest = parse(
            r#"
[[schema]]
version = "1"

[[schema.record]]
name = "setting"
fields = [
    { name = "a", type = "bool" },
    { name = "a", type = "bool" },
    { name = "b", type = "decimal" },
    { name = "c", type = "int", default = "zero" },
    { name = "id", type = "text" },
]

[[schema]]
version = "1.0.0"

[[schema]]
version = "one"
"#,
        );
        let errs = validate_manifest(&manifest).unwrap_err();
        let messages: Vec<String> = errs.iter().map(ToString::to_string).collect();
        assert!(messages.iter().any(|m| m.contains("PascalCase")));
        assert!(messages.iter().any(|m| m.contains("field=a] duplicate field name")));
        assert!(messages.iter().any(|m| m.contains("unknown field type `decimal`")));
        assert!(messages.iter().any(|m| m.contains("invalid default: expected int, found string")));
        assert!(messages.iter().any(|m| m.contains("identity field")));
        assert!(messages.iter().any(|m| m.contains("[schema=1.0.0] duplicate schema version")));
        assert!(messages.iter().any(|m| m.contains("invalid schema version `one`")));
    }

    #[test]
    fn plan_must_reference_declared_schemas() {
        let manifest = parse(&format!(
            r#"{SCHEMAS}
[[plan]]
name = "up"
schemas = ["1", "3"]

[[plan.stage]]
from = "1"
to = "3"
"#
        ));
        let errs = validate_manifest(&manifest).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].plan.as_deref(), Some("up"));
        assert_eq!(errs[0].schema.as_deref(), Some("3"));
    }

    #[test]
    fn stage_count_and_order_are_checked() {
        let manifest = parse(&format!(
            r#"{SCHEMAS}
[[plan]]
name = "down"
schemas = ["1", "2"]
direction = "downgrade"

[[plan.stage]]
from = "1"
to = "2"

[[plan]]
name = "short"
schemas = ["1", "2"]
"#
        ));
        let errs = validate_manifest(&manifest).unwrap_err();
        let messages: Vec<String> = errs.iter().map(ToString::to_string).collect();
        assert!(messages
            .iter()
            .any(|m| m.contains("[plan=down] stage 0: expected 2.0.0 -> 1.0.0, found 1.0.0 -> 2.0.0")));
        assert!(messages
            .iter()
            .any(|m| m.contains("[plan=short] 2 schemas need 1 stages, found 0")));
    }

    #[test]
    fn renames_and_sets_must_name_declared_fields() {
        let manifest = parse(&format!(
            r#"{SCHEMAS}
[[plan]]
name = "up"
schemas = ["1", "2"]

[[plan.stage]]
from = "1"
to = "2"
renames = [{{ record = "Setting", from = "pushNotificationEnabled", to = "notificationEnabled" }}]
set = [
    {{ record = "Setting", field = "missing", value = true }},
    {{ record = "Setting", field = "syncCalendarEnabled", value = 1 }},
]
"#
        ));
        let errs = validate_manifest(&manifest).unwrap_err();
        assert_eq!(errs.len(), 4);
        assert!(errs.iter().all(|e| e.record.as_deref() == Some("Setting")));
        assert!(errs[0].message.contains("rename source"));
        assert!(errs[1].message.contains("rename target"));
        assert!(errs[2].message.contains("not declared"));
        assert!(errs[3].message.contains("invalid value"));
    }

    #[test]
    fn display_includes_context() {
        let err = ValidationError::new("boom")
            .in_schema("2")
            .in_record("Setting")
            .in_field("x");
        assert_eq!(err.to_string(), "[schema=2, record=Setting, field=x] boom");
        assert_eq!(ValidationError::new("plain").to_string(), "plain");
    }
}
