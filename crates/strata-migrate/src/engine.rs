use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;
use uuid::Uuid;

use crate::adapter::{AdapterError, StoreAdapter, StoreHandle};
use crate::error::{BoxError, MigrationError};
use crate::plan::{MigrationPlan, ResolvedPath};
use crate::registry::SchemaRegistry;
use crate::schema::SchemaDescriptor;
use crate::version::SchemaVersion;

/// How the engine recovers from a store-format mismatch before retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum FallbackPolicy {
    /// Open the store under the registry's oldest schema and stamp it.
    #[default]
    OldestSchema,
    /// Try every registered schema in registry order and stamp the first
    /// one the persisted data conforms to.
    FirstConforming,
}

/// Configuration for the migration engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineConfig {
    /// Format-recovery retries allowed per open.
    pub retry_budget: u32,
    /// Recovery strategy used before each retry.
    pub fallback: FallbackPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_budget: 1,
            fallback: FallbackPolicy::default(),
        }
    }
}

/// One stage the engine ran (or, for a dry run, would run).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppliedStage {
    /// Position of the stage within its plan.
    pub index: usize,
    pub from: SchemaVersion,
    pub to: SchemaVersion,
}

/// What a successful open did to reach the target version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationReport {
    /// Correlates log events of one open.
    pub run_id: Uuid,
    pub started_at: SystemTime,
    pub target: SchemaVersion,
    pub stages: Vec<AppliedStage>,
    pub retries_used: u32,
}

impl MigrationReport {
    fn new(target: SchemaVersion) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: SystemTime::now(),
            target,
            stages: Vec::new(),
            retries_used: 0,
        }
    }

    /// Whether any stage ran.
    pub fn migrated(&self) -> bool {
        !self.stages.is_empty()
    }
}

/// Opens stores at a requested schema version, migrating them there first.
///
/// The engine probes the recorded version marker, resolves the stage path
/// through the caller's plan and runs the stages one by one. Every stage
/// commits its data together with the new marker, so a failure or crash
/// leaves the store at the last completed stage and the next open resumes
/// from there.
///
/// # Example
///
/// ```
/// use strata_migrate::{
///     FieldDef, FieldType, MigrationEngine, MigrationPlan, MigrationStage, RecordType,
///     SchemaDescriptor, SchemaRegistry, SchemaVersion,
/// };
/// use strata_store::MemoryStore;
///
/// let v1 = SchemaVersion::major(1);
/// let v2 = SchemaVersion::major(2);
/// let registry = SchemaRegistry::new(vec![
///     SchemaDescriptor::new(v1, vec![RecordType::new("Todo")]).unwrap(),
///     SchemaDescriptor::new(
///         v2,
///         vec![RecordType::new("Todo").field(FieldDef::new("done", FieldType::Bool).default_value(false))],
///     )
///     .unwrap(),
/// ])
/// .unwrap();
/// let plan = MigrationPlan::upgrade("up", vec![v1, v2], vec![MigrationStage::lightweight(v1, v2)]).unwrap();
///
/// let engine = MigrationEngine::new(MemoryStore::new(), registry);
/// drop(engine.open_store("todos", v1, None).unwrap());
/// let _handle = engine.open_store("todos", v2, Some(&plan)).unwrap();
/// assert_eq!(engine.recorded_version("todos").unwrap(), Some(v2));
/// ```
pub struct MigrationEngine<A: StoreAdapter> {
    adapter: A,
    registry: Arc<SchemaRegistry>,
    config: EngineConfig,
}

impl<A: StoreAdapter> MigrationEngine<A> {
    pub fn new(adapter: A, registry: impl Into<Arc<SchemaRegistry>>) -> Self {
        Self {
            adapter,
            registry: registry.into(),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The version marker persisted at `location`, if any.
    pub fn recorded_version(
        &self,
        location: impl AsRef<Path>,
    ) -> Result<Option<SchemaVersion>, MigrationError> {
        let location = location.as_ref();
        self.adapter
            .recorded_version(location)
            .map_err(|e| classify(location, e))
    }

    /// Open `location` at `target`, migrating through `plan` if needed.
    /// Uses the configured retry budget.
    pub fn open_store(
        &self,
        location: impl AsRef<Path>,
        target: SchemaVersion,
        plan: Option<&MigrationPlan>,
    ) -> Result<A::Handle, MigrationError> {
        self.run(location.as_ref(), target, plan, self.config.retry_budget)
            .map(|(handle, _)| handle)
    }

    /// Like [`open_store`](Self::open_store) with an explicit retry budget.
    pub fn open_store_with_retry(
        &self,
        location: impl AsRef<Path>,
        target: SchemaVersion,
        plan: Option<&MigrationPlan>,
        retry_budget: u32,
    ) -> Result<A::Handle, MigrationError> {
        self.run(location.as_ref(), target, plan, retry_budget)
            .map(|(handle, _)| handle)
    }

    /// Like [`open_store`](Self::open_store), also reporting what was done.
    pub fn open_store_with_report(
        &self,
        location: impl AsRef<Path>,
        target: SchemaVersion,
        plan: Option<&MigrationPlan>,
    ) -> Result<(A::Handle, MigrationReport), MigrationError> {
        self.run(location.as_ref(), target, plan, self.config.retry_budget)
    }

    /// Stages an open at `target` would run, without touching the store.
    ///
    /// An unversioned store that does not fit `target` is resolved the way
    /// [`open_store`](Self::open_store) would recover it under the configured
    /// budget and fallback policy, from the version recovery would stamp.
    pub fn pending_stages(
        &self,
        location: impl AsRef<Path>,
        target: SchemaVersion,
        plan: Option<&MigrationPlan>,
    ) -> Result<Vec<AppliedStage>, MigrationError> {
        let location = location.as_ref();
        let descriptor = self.check_request(target, plan)?;
        let start = match self.recorded_version(location)? {
            Some(current) => current,
            None => match self.adapter.probe_schema(location, descriptor) {
                Ok(()) => return Ok(Vec::new()),
                Err(e) if e.is_format_mismatch() && self.config.retry_budget > 0 => {
                    match self.fallback_version(location) {
                        Ok(version) => version,
                        Err(_) => return Err(classify(location, e)),
                    }
                }
                Err(e) => return Err(classify(location, e)),
            },
        };
        if start == target {
            return Ok(Vec::new());
        }
        Ok(resolve(location, start, target, plan)?
            .iter()
            .map(|(index, stage)| AppliedStage {
                index,
                from: stage.from_version(),
                to: stage.to_version(),
            })
            .collect())
    }

    fn check_request<'r>(
        &'r self,
        target: SchemaVersion,
        plan: Option<&MigrationPlan>,
    ) -> Result<&'r SchemaDescriptor, MigrationError> {
        let descriptor = self.registry.describe(target)?;
        if let Some(plan) = plan {
            plan.validate_against(&self.registry)?;
        }
        Ok(descriptor)
    }

    fn run(
        &self,
        location: &Path,
        target: SchemaVersion,
        plan: Option<&MigrationPlan>,
        retry_budget: u32,
    ) -> Result<(A::Handle, MigrationReport), MigrationError> {
        let descriptor = self.check_request(target, plan)?;
        let mut report = MigrationReport::new(target);
        let span = tracing::info_span!(
            "open_store",
            run = %report.run_id,
            location = %location.display(),
            target = %target,
        );
        let _enter = span.enter();

        let mut budget = retry_budget;
        loop {
            match self.attempt(location, descriptor, plan, &mut report) {
                Ok(handle) => {
                    tracing::info!(
                        stages = report.stages.len(),
                        retries = report.retries_used,
                        "store ready"
                    );
                    return Ok((handle, report));
                }
                Err(MigrationError::StoreFormat { location: at, source }) if budget > 0 => {
                    budget -= 1;
                    tracing::warn!(
                        error = %source,
                        policy = ?self.config.fallback,
                        remaining = budget,
                        "store format mismatch, recovering before retry"
                    );
                    match self.recover_format(location) {
                        Ok(version) => {
                            report.retries_used += 1;
                            tracing::info!(version = %version, "store stamped for retry");
                        }
                        Err(recovery) => {
                            tracing::error!(error = %recovery, "format recovery failed");
                            return Err(MigrationError::StoreFormat { location: at, source });
                        }
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn attempt(
        &self,
        location: &Path,
        descriptor: &SchemaDescriptor,
        plan: Option<&MigrationPlan>,
        report: &mut MigrationReport,
    ) -> Result<A::Handle, MigrationError> {
        let target = descriptor.version();
        let current = self.recorded_version(location)?;

        let Some(current) = current else {
            tracing::debug!("no version marker, opening under target schema");
            let mut handle = self.open_under(location, descriptor)?;
            if handle.has_changes() {
                handle.save().map_err(|e| classify(location, e))?;
            }
            return Ok(handle);
        };
        if current == target {
            tracing::debug!("store already at target version");
            return self.open_under(location, descriptor);
        }

        let path = resolve(location, current, target, plan)?;
        tracing::info!(from = %current, stages = path.len(), "migrating store");
        for (index, stage) in path.iter() {
            let (from, to) = (stage.from_version(), stage.to_version());
            let from_schema = self.registry.describe(from)?;
            let to_schema = self.registry.describe(to)?;

            tracing::info!(stage = index, from = %from, to = %to, "applying migration stage");
            stage
                .apply(&self.adapter, location, from_schema, to_schema)
                .map_err(|source| {
                    tracing::error!(stage = index, from = %from, to = %to, error = %source, "migration stage failed");
                    MigrationError::StageFailed {
                        index,
                        from,
                        to,
                        left_at: from,
                        source,
                    }
                })?;
            tracing::info!(stage = index, version = %to, "migration stage committed");
            report.stages.push(AppliedStage { index, from, to });
        }

        self.open_under(location, descriptor)
    }

    /// Stamp the location with a schema its data is accepted under, so the
    /// next attempt can migrate from there. Only unversioned stores can be
    /// stamped: a store that already carries a marker has nothing to recover.
    fn recover_format(&self, location: &Path) -> Result<SchemaVersion, BoxError> {
        if let Some(recorded) = self.adapter.recorded_version(location)? {
            return Err(BoxError::from(format!(
                "store is already recorded at schema {recorded}"
            )));
        }
        let version = self.fallback_version(location)?;
        let mut handle = self
            .adapter
            .open_under_schema(location, self.registry.describe(version)?)?;
        handle.save()?;
        Ok(version)
    }

    /// The schema format recovery would stamp, found without writing.
    fn fallback_version(&self, location: &Path) -> Result<SchemaVersion, BoxError> {
        let candidates: Vec<&SchemaDescriptor> = match self.config.fallback {
            FallbackPolicy::OldestSchema => vec![self.registry.oldest()],
            FallbackPolicy::FirstConforming => self.registry.iter().collect(),
        };

        let mut last_error = None;
        for descriptor in candidates {
            match self.adapter.probe_schema(location, descriptor) {
                Ok(()) => return Ok(descriptor.version()),
                Err(e) => {
                    tracing::debug!(version = %descriptor.version(), error = %e, "schema rejected during recovery");
                    last_error = Some(BoxError::from(e));
                }
            }
        }
        Err(last_error.unwrap_or_else(|| BoxError::from("no schema to recover with")))
    }

    fn open_under(
        &self,
        location: &Path,
        descriptor: &SchemaDescriptor,
    ) -> Result<A::Handle, MigrationError> {
        self.adapter
            .open_under_schema(location, descriptor)
            .map_err(|e| classify(location, e))
    }
}

fn resolve<'p>(
    location: &Path,
    current: SchemaVersion,
    target: SchemaVersion,
    plan: Option<&'p MigrationPlan>,
) -> Result<ResolvedPath<'p>, MigrationError> {
    match plan {
        Some(plan) => plan.resolve_path(current, target),
        None => Err(MigrationError::StoreFormat {
            location: location.to_path_buf(),
            source: BoxError::from(format!(
                "store is at schema {current} and no migration plan to {target} was given"
            )),
        }),
    }
}

fn classify<E: AdapterError>(location: &Path, err: E) -> MigrationError {
    if err.is_format_mismatch() {
        MigrationError::StoreFormat {
            location: location.to_path_buf(),
            source: BoxError::from(err),
        }
    } else {
        MigrationError::Store(BoxError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_allows_one_retry() {
        let config = EngineConfig::default();
        assert_eq!(config.retry_budget, 1);
        assert_eq!(config.fallback, FallbackPolicy::OldestSchema);
    }

    #[test]
    fn empty_report_has_not_migrated() {
        let report = MigrationReport::new(SchemaVersion::major(2));
        assert!(!report.migrated());
        assert_eq!(report.retries_used, 0);
    }
}
