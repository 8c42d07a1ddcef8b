//! Reconciliation of a desired record with the existing one.
//!
//! Users, shadow and gshadow entries are taken as desired. Groups union
//! their memberships; in safe mode the existing gid and password are kept.

use crate::core::error::EntitiesError;
use crate::core::record::{Group, GroupId, Record};
use std::collections::BTreeMap;

/// Produce the record to persist for `desired`, given the `current` record
/// with the same key, if any.
pub fn merge(
    current: Option<&Record>,
    desired: Record,
    safe: bool,
) -> Result<Record, EntitiesError> {
    let Some(current) = current else {
        return Ok(desired);
    };
    if current.kind() != desired.kind() || current.key() != desired.key() {
        return Err(EntitiesError::MergeConflict(format!(
            "cannot merge {} {} into {} {}",
            desired.kind(),
            desired.key(),
            current.kind(),
            current.key()
        )));
    }
    match (current, desired) {
        (Record::Group(current), Record::Group(desired)) => {
            Ok(Record::Group(merge_group(current, desired, safe)))
        }
        (_, desired) => Ok(desired),
    }
}

/// Merge two versions of the same group.
///
/// Members are the union of both lists, current members first. With `safe`
/// the current gid and password always win; otherwise desired values win
/// unless they are empty (an unset or dynamic gid keeps the current one).
pub fn merge_group(current: &Group, desired: Group, safe: bool) -> Group {
    let users = current.users.union(&desired.users);
    let (gid, password) = if safe {
        (current.gid, current.password.clone())
    } else {
        let gid = match desired.gid {
            Some(GroupId::Fixed(gid)) => Some(GroupId::Fixed(gid)),
            _ => current.gid,
        };
        let password = if desired.password.is_empty() {
            current.password.clone()
        } else {
            desired.password
        };
        (gid, password)
    };
    Group {
        name: desired.name,
        password,
        gid,
        users,
    }
}

/// Safe-mode guard: an explicit gid must not belong to a differently named
/// group in `existing`.
pub fn check_gid_conflict(
    desired: &Group,
    existing: &BTreeMap<String, Group>,
) -> Result<(), EntitiesError> {
    let Some(gid) = desired.fixed_gid() else {
        return Ok(());
    };
    match existing
        .values()
        .find(|g| g.fixed_gid() == Some(gid) && g.name != desired.name)
    {
        Some(owner) => Err(EntitiesError::MergeConflict(format!(
            "gid {} is already used on group {}",
            gid, owner.name
        ))),
        None => Ok(()),
    }
}
