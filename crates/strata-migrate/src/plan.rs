//! Linear migration plans and stage-path resolution.

use std::fmt;

use crate::error::MigrationError;
use crate::registry::SchemaRegistry;
use crate::stage::MigrationStage;
use crate::version::SchemaVersion;

/// Which way a plan's stages walk its schema list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Stage `i` goes from `schemas[i]` to `schemas[i + 1]`.
    Upgrade,
    /// Stage `i` goes from `schemas[n - 1 - i]` to `schemas[n - 2 - i]`.
    Downgrade,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upgrade => f.write_str("upgrade"),
            Direction::Downgrade => f.write_str("downgrade"),
        }
    }
}

/// An ordered path of stages over a contiguous run of schema versions, in
/// one direction.
///
/// Upgrade and downgrade over the same schemas are two separate plans; the
/// caller picks one, the engine never infers direction from version order.
#[derive(Debug)]
pub struct MigrationPlan {
    name: String,
    schemas: Vec<SchemaVersion>,
    stages: Vec<MigrationStage>,
    direction: Direction,
}

/// The contiguous run of plan stages between two versions.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedPath<'a> {
    offset: usize,
    stages: &'a [MigrationStage],
}

impl<'a> ResolvedPath<'a> {
    /// Position of the first resolved stage within the plan.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn stages(&self) -> &'a [MigrationStage] {
        self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stages paired with their index in the plan.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &'a MigrationStage)> + 'a {
        let offset = self.offset;
        self.stages
            .iter()
            .enumerate()
            .map(move |(i, stage)| (offset + i, stage))
    }
}

impl MigrationPlan {
    /// Build a plan, checking that `stages` cover each consecutive pair of
    /// `schemas` exactly once in the given direction.
    pub fn new(
        name: impl Into<String>,
        direction: Direction,
        schemas: Vec<SchemaVersion>,
        stages: Vec<MigrationStage>,
    ) -> Result<Self, MigrationError> {
        let plan = Self {
            name: name.into(),
            schemas,
            stages,
            direction,
        };
        plan.check_shape()?;
        Ok(plan)
    }

    pub fn upgrade(
        name: impl Into<String>,
        schemas: Vec<SchemaVersion>,
        stages: Vec<MigrationStage>,
    ) -> Result<Self, MigrationError> {
        Self::new(name, Direction::Upgrade, schemas, stages)
    }

    pub fn downgrade(
        name: impl Into<String>,
        schemas: Vec<SchemaVersion>,
        stages: Vec<MigrationStage>,
    ) -> Result<Self, MigrationError> {
        Self::new(name, Direction::Downgrade, schemas, stages)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn schemas(&self) -> &[SchemaVersion] {
        &self.schemas
    }

    pub fn stages(&self) -> &[MigrationStage] {
        &self.stages
    }

    pub fn contains(&self, version: SchemaVersion) -> bool {
        self.schemas.contains(&version)
    }

    /// Fail with `UnknownVersion` for the first plan version the registry
    /// does not know.
    pub fn validate_against(&self, registry: &SchemaRegistry) -> Result<(), MigrationError> {
        match self.schemas.iter().find(|v| !registry.contains(**v)) {
            Some(v) => Err(MigrationError::UnknownVersion(*v)),
            None => Ok(()),
        }
    }

    /// Slice the stages that carry a store from `current` to `target`.
    ///
    /// Both versions must be in the plan, and `target` must lie in the
    /// plan's direction from `current`. Equal versions resolve to an empty
    /// path.
    pub fn resolve_path(
        &self,
        current: SchemaVersion,
        target: SchemaVersion,
    ) -> Result<ResolvedPath<'_>, MigrationError> {
        let no_path = |reason: String| MigrationError::NoPathFound {
            from: current,
            to: target,
            reason,
        };
        let position = |v: SchemaVersion| {
            self.schemas
                .iter()
                .position(|s| *s == v)
                .ok_or_else(|| no_path(format!("{v} is not part of plan `{}`", self.name)))
        };

        let pc = position(current)?;
        let pt = position(target)?;
        if pc == pt {
            return Ok(ResolvedPath {
                offset: 0,
                stages: &[],
            });
        }

        let last = self.schemas.len() - 1;
        let range = match self.direction {
            Direction::Upgrade if pt > pc => pc..pt,
            Direction::Downgrade if pt < pc => (last - pc)..(last - pt),
            direction => {
                return Err(no_path(format!(
                    "plan `{}` is a {direction} plan",
                    self.name
                )))
            }
        };
        Ok(ResolvedPath {
            offset: range.start,
            stages: &self.stages[range],
        })
    }

    fn check_shape(&self) -> Result<(), MigrationError> {
        let invalid = |reason: String| MigrationError::InvalidPlan {
            plan: self.name.clone(),
            reason,
        };

        if self.schemas.is_empty() {
            return Err(invalid("a plan needs at least one schema".into()));
        }
        for (i, v) in self.schemas.iter().enumerate() {
            if self.schemas[..i].contains(v) {
                return Err(invalid(format!("schema {v} listed twice")));
            }
        }
        let expected = self.schemas.len() - 1;
        if self.stages.len() != expected {
            return Err(invalid(format!(
                "{} schemas need exactly {expected} stages, found {}",
                self.schemas.len(),
                self.stages.len()
            )));
        }

        for (i, stage) in self.stages.iter().enumerate() {
            let (from, to) = match self.direction {
                Direction::Upgrade => (self.schemas[i], self.schemas[i + 1]),
                Direction::Downgrade => (self.schemas[expected - i], self.schemas[expected - i - 1]),
            };
            if stage.from_version() != from || stage.to_version() != to {
                return Err(invalid(format!(
                    "stage {i} goes {} -> {}, expected {from} -> {to} for a {} plan",
                    stage.from_version(),
                    stage.to_version(),
                    self.direction
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(n: u32) -> SchemaVersion {
        SchemaVersion::major(n)
    }

    fn upgrade_plan(n: u32) -> MigrationPlan {
        let schemas: Vec<_> = (1..=n).map(v).collect();
        let stages = schemas
            .windows(2)
            .map(|w| MigrationStage::lightweight(w[0], w[1]))
            .collect();
        MigrationPlan::upgrade("up", schemas, stages).unwrap()
    }

    fn downgrade_plan(n: u32) -> MigrationPlan {
        let schemas: Vec<_> = (1..=n).map(v).collect();
        let stages = schemas
            .windows(2)
            .rev()
            .map(|w| MigrationStage::lightweight(w[1], w[0]))
            .collect();
        MigrationPlan::downgrade("down", schemas, stages).unwrap()
    }

    #[test]
    fn rejects_gaps_and_wrong_direction() {
        let skip = MigrationPlan::upgrade(
            "skip",
            vec![v(1), v(2), v(3)],
            vec![
                MigrationStage::lightweight(v(1), v(2)),
                MigrationStage::lightweight(v(1), v(3)),
            ],
        );
        assert!(matches!(skip, Err(MigrationError::InvalidPlan { .. })));

        let backwards = MigrationPlan::upgrade(
            "backwards",
            vec![v(1), v(2)],
            vec![MigrationStage::lightweight(v(2), v(1))],
        );
        assert!(matches!(backwards, Err(MigrationError::InvalidPlan { .. })));

        let short = MigrationPlan::upgrade("short", vec![v(1), v(2), v(3)], vec![]);
        assert!(matches!(short, Err(MigrationError::InvalidPlan { .. })));

        let empty = MigrationPlan::downgrade("empty", vec![], vec![]);
        assert!(matches!(empty, Err(MigrationError::InvalidPlan { .. })));
    }

    #[test]
    fn resolves_upgrade_slice() {
        let plan = upgrade_plan(4);
        let path = plan.resolve_path(v(2), v(4)).unwrap();
        assert_eq!(path.offset(), 1);
        let edges: Vec<_> = path
            .iter()
            .map(|(i, s)| (i, s.from_version(), s.to_version()))
            .collect();
        assert_eq!(edges, vec![(1, v(2), v(3)), (2, v(3), v(4))]);
    }

    #[test]
    fn resolves_downgrade_slice() {
        let plan = downgrade_plan(4);
        let path = plan.resolve_path(v(3), v(1)).unwrap();
        let edges: Vec<_> = path
            .iter()
            .map(|(i, s)| (i, s.from_version(), s.to_version()))
            .collect();
        assert_eq!(edges, vec![(1, v(3), v(2)), (2, v(2), v(1))]);
    }

    #[test]
    fn no_path_for_wrong_direction_or_unknown_version() {
        let plan = upgrade_plan(3);
        assert!(matches!(
            plan.resolve_path(v(3), v(1)),
            Err(MigrationError::NoPathFound { .. })
        ));
        assert!(matches!(
            plan.resolve_path(v(1), v(9)),
            Err(MigrationError::NoPathFound { .. })
        ));
        assert!(plan.resolve_path(v(2), v(2)).unwrap().is_empty());
    }

    #[test]
    fn validate_against_registry() {
        use crate::record::FieldType;
        use crate::schema::{FieldDef, RecordType, SchemaDescriptor};

        let desc = |n| {
            SchemaDescriptor::new(
                v(n),
                vec![RecordType::new("A").field(FieldDef::new("x", FieldType::Int))],
            )
            .unwrap()
        };
        let registry = SchemaRegistry::new(vec![desc(1), desc(2)]).unwrap();
        assert!(upgrade_plan(2).validate_against(&registry).is_ok());
        assert!(matches!(
            upgrade_plan(3).validate_against(&registry),
            Err(MigrationError::UnknownVersion(x)) if x == v(3)
        ));
    }

    proptest! {
        #[test]
        fn upgrade_path_is_contiguous(n in 2u32..10, a in 0u32..10, b in 0u32..10) {
            let plan = upgrade_plan(n);
            let (from, to) = (a % n + 1, b % n + 1);
            match plan.resolve_path(v(from), v(to)) {
                Ok(path) => {
                    prop_assert!(from <= to);
                    prop_assert_eq!(path.len() as u32, to - from);
                    let mut at = v(from);
                    for (_, stage) in path.iter() {
                        prop_assert_eq!(stage.from_version(), at);
                        at = stage.to_version();
                    }
                    prop_assert_eq!(at, v(to));
                }
                Err(_) => prop_assert!(from > to),
            }
        }

        #[test]
        fn downgrade_path_is_contiguous(n in 2u32..10, a in 0u32..10, b in 0u32..10) {
            let plan = downgrade_plan(n);
            let (from, to) = (a % n + 1, b % n + 1);
            match plan.resolve_path(v(from), v(to)) {
                Ok(path) => {
                    prop_assert!(from >= to);
                    prop_assert_eq!(path.len() as u32, from - to);
                    let mut at = v(from);
                    for (_, stage) in path.iter() {
                        prop_assert_eq!(stage.from_version(), at);
                        at = stage.to_version();
                    }
                    prop_assert_eq!(at, v(to));
                }
                Err(_) => prop_assert!(from < to),
            }
        }
    }
}
