//! Create, Apply and Delete of records against target files.
//!
//! Every operation runs entirely inside [`mutate`]: the target is parsed,
//! checked and edited while its lock is held, so two invocations racing on
//! the same file serialize. Nothing spans more than one file; a failure on
//! the shadow file after a successful passwd update leaves both as they are
//! and is reported to the caller.

use crate::core::allocator::{allocate_id, used_gids};
use crate::core::codec::AccountLine;
use crate::core::config::EntitiesConfig;
use crate::core::error::EntitiesError;
use crate::core::merge::{check_gid_conflict, merge};
use crate::core::mutator::{TargetLines, mutate};
use crate::core::password::prepare_shadow;
use crate::core::record::{GShadow, Group, GroupId, Kind, Record, Shadow, User};
use crate::core::store::EntityStore;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// What an Apply ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyOutcome {
    Created,
    Updated,
}

/// One entity written by [`Reconciler::apply_store`].
#[derive(Debug, Clone, Serialize)]
pub struct AppliedEntity {
    pub kind: Kind,
    pub name: String,
    pub outcome: ApplyOutcome,
}

/// Runs reconciliation operations with a given configuration.
#[derive(Debug, Clone)]
pub struct Reconciler<'a> {
    config: &'a EntitiesConfig,
}

impl<'a> Reconciler<'a> {
    pub fn new(config: &'a EntitiesConfig) -> Self {
        Self { config }
    }

    /// The configured target for `record`, unless `target` overrides it.
    pub fn resolve_target<'p>(&'p self, record: &Record, target: Option<&'p Path>) -> &'p Path {
        target.unwrap_or_else(|| self.config.target_for(record.kind()))
    }

    /// Append `record` to `target`. Fails with `AlreadyExists` when the key
    /// is present.
    pub fn create(&self, record: &Record, target: &Path) -> Result<(), EntitiesError> {
        let record = prepare(record.clone())?;
        mutate(target, &self.config.lock, |lines| {
            let record = resolve_dynamic_gid(record.clone(), lines, self.config)?;
            insert_new(lines, &record)
        })?;
        info!(kind = %record.kind(), name = record.key(), target = %target.display(), "entity created");
        Ok(())
    }

    /// Replace the line of `record` in `target`, merging with the current
    /// record, or create it when absent.
    pub fn apply(
        &self,
        record: &Record,
        target: &Path,
        safe: bool,
    ) -> Result<ApplyOutcome, EntitiesError> {
        let record = prepare(record.clone())?;
        let outcome = mutate(target, &self.config.lock, |lines| {
            let current = current_record(lines, &record)?;

            // An explicit gid owned by another group is refused before any edit.
            if let (true, Record::Group(desired)) = (safe, &record) {
                check_gid_conflict(desired, &lines.parse::<Group>()?)?;
            }

            match (current, lines.position(record.key())) {
                (Some(current), Some(idx)) => {
                    let merged = merge(Some(&current), record.clone(), safe)?;
                    lines.replace(idx, merged.to_line());
                    Ok(ApplyOutcome::Updated)
                }
                _ => {
                    let record = resolve_dynamic_gid(record.clone(), lines, self.config)?;
                    insert_new(lines, &record)?;
                    Ok(ApplyOutcome::Created)
                }
            }
        })?;
        info!(kind = %record.kind(), name = record.key(), target = %target.display(), ?outcome, safe, "entity applied");
        Ok(outcome)
    }

    /// Remove the line of `record` from `target`. Fails with `NotFound` when
    /// the key is absent.
    pub fn delete(&self, record: &Record, target: &Path) -> Result<(), EntitiesError> {
        mutate(target, &self.config.lock, |lines| {
            // Refuse to edit a target that does not parse as the record's kind.
            current_record(lines, record)?;
            let idx = lines.position(record.key()).ok_or_else(|| {
                EntitiesError::NotFound(format!(
                    "{} {} in {}",
                    record.kind(),
                    record.key(),
                    target.display()
                ))
            })?;
            lines.remove(idx);
            Ok(())
        })?;
        info!(kind = %record.kind(), name = record.key(), target = %target.display(), "entity deleted");
        Ok(())
    }

    /// Apply every entity named `name` in `store`, across all kinds.
    pub fn apply_named(
        &self,
        store: &EntityStore,
        name: &str,
        safe: bool,
    ) -> Result<Vec<AppliedEntity>, EntitiesError> {
        let records: Vec<Record> = Kind::ALL
            .iter()
            .filter_map(|kind| store.get(*kind, name))
            .collect();
        if records.is_empty() {
            return Err(EntitiesError::NotFound(format!(
                "no entities found with name {}",
                name
            )));
        }
        self.apply_records(records, safe)
    }

    /// Apply every entity in `store`: users, then groups, shadows, gshadows.
    /// Stops at the first failure; entities applied before it stay applied.
    pub fn apply_store(
        &self,
        store: &EntityStore,
        safe: bool,
    ) -> Result<Vec<AppliedEntity>, EntitiesError> {
        let records: Vec<Record> = Kind::ALL
            .iter()
            .flat_map(|kind| store.records(*kind))
            .collect();
        self.apply_records(records, safe)
    }

    fn apply_records(
        &self,
        records: Vec<Record>,
        safe: bool,
    ) -> Result<Vec<AppliedEntity>, EntitiesError> {
        let mut applied = Vec::with_capacity(records.len());
        for record in records {
            let target = self.config.target_for(record.kind());
            let outcome = self.apply(&record, target, safe)?;
            applied.push(AppliedEntity {
                kind: record.kind(),
                name: record.key().to_string(),
                outcome,
            });
        }
        Ok(applied)
    }
}

/// Checks and per-kind preparation that do not depend on the target file.
fn prepare(record: Record) -> Result<Record, EntitiesError> {
    if record.key().is_empty() {
        return Err(EntitiesError::MalformedRecord(format!(
            "empty {} name",
            record.kind()
        )));
    }
    match record {
        Record::Shadow(shadow) => Ok(Record::Shadow(prepare_shadow(shadow)?)),
        other => Ok(other),
    }
}

/// Parse the target as `record`'s kind and return the current record with
/// the same key.
fn current_record(lines: &TargetLines, record: &Record) -> Result<Option<Record>, EntitiesError> {
    fn lookup<T: AccountLine>(lines: &TargetLines, key: &str) -> Result<Option<Record>, EntitiesError> {
        Ok(lines.parse::<T>()?.remove(key).map(Into::into))
    }
    match record.kind() {
        Kind::User => lookup::<User>(lines, record.key()),
        Kind::Group => lookup::<Group>(lines, record.key()),
        Kind::Shadow => lookup::<Shadow>(lines, record.key()),
        Kind::GShadow => lookup::<GShadow>(lines, record.key()),
    }
}

/// Give a group without a fixed gid the lowest free id of the range.
fn resolve_dynamic_gid(
    record: Record,
    lines: &TargetLines,
    config: &EntitiesConfig,
) -> Result<Record, EntitiesError> {
    match record {
        Record::Group(mut group) if group.needs_gid() => {
            let existing = lines.parse::<Group>()?;
            let gid = allocate_id(&used_gids(&existing), config.dynamic_range)?;
            group.gid = Some(GroupId::Fixed(gid));
            Ok(Record::Group(group))
        }
        other => Ok(other),
    }
}

fn insert_new(lines: &mut TargetLines, record: &Record) -> Result<(), EntitiesError> {
    if lines.position(record.key()).is_some() {
        return Err(EntitiesError::AlreadyExists(format!(
            "{} {}",
            record.kind(),
            record.key()
        )));
    }
    // Validates the target before it is extended.
    current_record(lines, record)?;
    lines.push(record.to_line());
    Ok(())
}
