//! Lowest-free id allocation inside the configured range.

use crate::core::config::IdRange;
use crate::core::error::EntitiesError;
use crate::core::record::Group;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Returns the smallest id in `range` not present in `in_use`.
pub fn allocate_id(in_use: &BTreeSet<u32>, range: IdRange) -> Result<u32, EntitiesError> {
    let id = (range.min..=range.max)
        .find(|candidate| !in_use.contains(candidate))
        .ok_or(EntitiesError::NoFreeId {
            min: range.min,
            max: range.max,
        })?;
    debug!(id, min = range.min, max = range.max, "allocated dynamic id");
    Ok(id)
}

/// Gids currently assigned in a parsed group database.
pub fn used_gids(groups: &BTreeMap<String, Group>) -> BTreeSet<u32> {
    groups.values().filter_map(Group::fixed_gid).collect()
}
