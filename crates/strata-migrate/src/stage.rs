//! A single directed migration step between two adjacent schema versions.

use std::fmt;
use std::path::Path;

use crate::adapter::{StoreAdapter, StoreHandle};
use crate::backup::MigrationBackup;
use crate::context::{ReadContext, WriteContext};
use crate::error::{BoxError, HookError, HookResult, StageError};
use crate::record::Value;
use crate::schema::SchemaDescriptor;
use crate::version::SchemaVersion;

/// Hook run against the store still opened under the stage's source schema.
/// Whatever must survive the schema swap goes into the returned backup.
pub type WillMigrate = dyn Fn(&ReadContext<'_>) -> HookResult<MigrationBackup> + Send + Sync;

/// Hook run against the store reopened under the stage's target schema.
/// Receives the backup returned by the same stage's [`WillMigrate`] hook.
pub type DidMigrate =
    dyn Fn(&mut WriteContext<'_>, MigrationBackup) -> HookResult<()> + Send + Sync;

/// An explicitly declared field rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRename {
    pub record_type: String,
    pub from: String,
    pub to: String,
}

/// A constant assigned to a field of every record of a type after the
/// schema swap.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldAssignment {
    pub record_type: String,
    pub field: String,
    pub value: Value,
}

/// A directed edge between two adjacent schema versions.
///
/// Immutable once built. Declared renames and assignments run before the
/// custom hooks in their respective phases.
pub struct MigrationStage {
    from: SchemaVersion,
    to: SchemaVersion,
    renames: Vec<FieldRename>,
    assignments: Vec<FieldAssignment>,
    will_migrate: Option<Box<WillMigrate>>,
    did_migrate: Option<Box<DidMigrate>>,
}

impl fmt::Debug for MigrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStage")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("renames", &self.renames)
            .field("assignments", &self.assignments)
            .field("will_migrate", &self.will_migrate.is_some())
            .field("did_migrate", &self.did_migrate.is_some())
            .finish()
    }
}

impl MigrationStage {
    /// A stage with no hooks: the store adapter's materialization is the
    /// whole migration.
    pub fn lightweight(from: SchemaVersion, to: SchemaVersion) -> Self {
        Self {
            from,
            to,
            renames: Vec::new(),
            assignments: Vec::new(),
            will_migrate: None,
            did_migrate: None,
        }
    }

    /// Start building a stage with renames and/or hooks.
    pub fn custom(from: SchemaVersion, to: SchemaVersion) -> StageBuilder {
        StageBuilder {
            stage: Self::lightweight(from, to),
        }
    }

    pub fn from_version(&self) -> SchemaVersion {
        self.from
    }

    pub fn to_version(&self) -> SchemaVersion {
        self.to
    }

    pub fn renames(&self) -> &[FieldRename] {
        &self.renames
    }

    pub fn assignments(&self) -> &[FieldAssignment] {
        &self.assignments
    }

    /// Run this stage against `location`.
    ///
    /// The store is opened under `from`, the will phase captures the backup,
    /// the handle is reopened under `to`, the did phase consumes the backup,
    /// and the result is verified and committed together with the new version
    /// marker. On any error the handle is dropped without saving, so the store
    /// keeps its previous records and marker.
    pub fn apply<A: StoreAdapter>(
        &self,
        adapter: &A,
        location: &Path,
        from: &SchemaDescriptor,
        to: &SchemaDescriptor,
    ) -> Result<(), StageError> {
        debug_assert_eq!(from.version(), self.from);
        debug_assert_eq!(to.version(), self.to);

        let mut handle =
            adapter
                .open_under_schema(location, from)
                .map_err(|e| StageError::Open {
                    version: self.from,
                    source: BoxError::from(e),
                })?;

        let backup = {
            let ctx = ReadContext::new(&handle, self.to);
            self.will_phase(&ctx).map_err(StageError::WillMigrate)?
        };
        tracing::debug!(from = %self.from, to = %self.to, empty = backup.is_empty(), "will phase complete");

        handle
            .reopen_under(to)
            .map_err(|e| StageError::Materialize {
                version: self.to,
                source: BoxError::from(e),
            })?;

        {
            let mut ctx = WriteContext::new(&mut handle, self.from);
            self.did_phase(&mut ctx, backup)
                .map_err(StageError::DidMigrate)?;
        }
        tracing::debug!(from = %self.from, to = %self.to, "did phase complete");

        handle.verify().map_err(|e| StageError::Conformance {
            version: self.to,
            source: BoxError::from(e),
        })?;

        handle.stage_version(self.to);
        handle
            .save()
            .map_err(|e| StageError::Commit(BoxError::from(e)))
    }

    fn will_phase(&self, ctx: &ReadContext<'_>) -> HookResult<MigrationBackup> {
        let mut backup = MigrationBackup::new();

        for rename in &self.renames {
            let records = ctx.fetch(&rename.record_type)?;
            tracing::debug!(
                record_type = %rename.record_type,
                from = %rename.from,
                to = %rename.to,
                records = records.len(),
                "capturing renamed field"
            );
            for mut record in records {
                if let Some(value) = record.take(&rename.from) {
                    backup.stash_field(&rename.record_type, record.id, rename.to.clone(), value);
                }
            }
        }

        if let Some(hook) = &self.will_migrate {
            backup.merge(hook(ctx)?);
        }
        Ok(backup)
    }

    fn did_phase(&self, ctx: &mut WriteContext<'_>, mut backup: MigrationBackup) -> HookResult<()> {
        for rename in &self.renames {
            for id in backup.stashed_ids(&rename.record_type) {
                let Some(value) = backup.take_field(&rename.record_type, id, &rename.to) else {
                    continue;
                };
                // The record may have been dropped along with its type.
                if let Some(mut record) = ctx.get(&rename.record_type, id)? {
                    record.set(rename.to.clone(), value);
                    ctx.update(record)?;
                }
            }
        }

        for assignment in &self.assignments {
            for mut record in ctx.fetch(&assignment.record_type)? {
                record.set(assignment.field.clone(), assignment.value.clone());
                ctx.update(record)?;
            }
        }

        match &self.did_migrate {
            Some(hook) => hook(ctx, backup),
            None => Ok(()),
        }
    }
}

/// Builder for [`MigrationStage::custom`].
#[must_use]
pub struct StageBuilder {
    stage: MigrationStage,
}

impl StageBuilder {
    /// Declare that `from` in the source shape of `record_type` becomes `to`
    /// in the target shape. The value is carried through the stage backup.
    pub fn rename_field(
        mut self,
        record_type: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.stage.renames.push(FieldRename {
            record_type: record_type.into(),
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Assign `value` to `field` on every record of `record_type` in the did
    /// phase. Absent records make this a no-op.
    pub fn assign_field(
        mut self,
        record_type: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.stage.assignments.push(FieldAssignment {
            record_type: record_type.into(),
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn will_migrate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ReadContext<'_>) -> HookResult<MigrationBackup> + Send + Sync + 'static,
    {
        self.stage.will_migrate = Some(Box::new(hook));
        self
    }

    pub fn did_migrate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut WriteContext<'_>, MigrationBackup) -> HookResult<()> + Send + Sync + 'static,
    {
        self.stage.did_migrate = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> MigrationStage {
        self.stage
    }
}

impl From<StageBuilder> for MigrationStage {
    fn from(builder: StageBuilder) -> Self {
        builder.build()
    }
}

/// Convenience for hooks: turn any displayable failure into a [`HookError`].
pub fn hook_failure(err: impl fmt::Display) -> HookError {
    HookError::msg(err.to_string())
}
