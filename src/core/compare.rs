//! One-directional diff of a desired store against the current state.
//!
//! Every record of the desired store is looked up in the current snapshot.
//! Absent records are reported as missing; present ones are compared on a
//! per-kind subset of fields. Records only present in the current snapshot
//! are not reported.

use crate::core::record::{GShadow, Group, Kind, Record, Shadow, User};
use crate::core::store::EntityStore;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Difference {
    pub kind: Kind,
    pub name: String,
    pub missing: bool,
    pub descr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_entity: Option<Record>,
    pub target_entity: Record,
}

impl Difference {
    fn missing(desired: Record) -> Self {
        let descr = format!("{} {} is not present.", label(desired.kind()), desired.key());
        Self {
            kind: desired.kind(),
            name: desired.key().to_string(),
            missing: true,
            descr,
            original_entity: None,
            target_entity: desired,
        }
    }

    fn differs(current: Record, desired: Record) -> Self {
        let descr = format!("{} {} has difference.", label(desired.kind()), desired.key());
        Self {
            kind: desired.kind(),
            name: desired.key().to_string(),
            missing: false,
            descr,
            original_entity: Some(current),
            target_entity: desired,
        }
    }
}

fn label(kind: Kind) -> &'static str {
    match kind {
        Kind::User => "User",
        Kind::Group => "Group",
        Kind::Shadow => "Shadow with username",
        Kind::GShadow => "GShadow with name",
    }
}

fn user_differs(current: &User, desired: &User) -> bool {
    current.uid != desired.uid
        || current.gid != desired.gid
        || current.homedir != desired.homedir
        || current.shell != desired.shell
}

fn group_differs(current: &Group, desired: &Group) -> bool {
    let gid_differs = match desired.fixed_gid() {
        Some(gid) => current.fixed_gid() != Some(gid),
        None => false,
    };
    current.password != desired.password
        || gid_differs
        || !current.users.same_set(&desired.users)
}

fn shadow_differs(current: &Shadow, desired: &Shadow) -> bool {
    current.min_age != desired.min_age
        || current.max_age != desired.max_age
        || current.warn != desired.warn
        || current.inactive != desired.inactive
        || current.expire != desired.expire
}

fn gshadow_differs(current: &GShadow, desired: &GShadow) -> bool {
    current.password != desired.password
        || !current.administrators.same_set(&desired.administrators)
        || !current.members.same_set(&desired.members)
}

fn record_differs(current: &Record, desired: &Record) -> bool {
    match (current, desired) {
        (Record::User(c), Record::User(d)) => user_differs(c, d),
        (Record::Group(c), Record::Group(d)) => group_differs(c, d),
        (Record::Shadow(c), Record::Shadow(d)) => shadow_differs(c, d),
        (Record::GShadow(c), Record::GShadow(d)) => gshadow_differs(c, d),
        _ => true,
    }
}

/// Differences between `desired` and `current`, users first, then groups,
/// shadows and gshadows, each ordered by name.
pub fn compare(desired: &EntityStore, current: &EntityStore) -> Vec<Difference> {
    let mut differences = Vec::new();
    for kind in Kind::ALL {
        for wanted in desired.records(kind) {
            match current.get(kind, wanted.key()) {
                None => differences.push(Difference::missing(wanted)),
                Some(existing) if record_differs(&existing, &wanted) => {
                    differences.push(Difference::differs(existing, wanted))
                }
                Some(_) => {}
            }
        }
    }
    differences
}
