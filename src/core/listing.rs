//! Filtered, ordered listings of a store's entities.

use crate::core::record::{Kind, Record};
use crate::core::store::EntityStore;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListOrder {
    #[default]
    Name,
    /// Numeric uid/gid. Kinds without one fall back to name order.
    Id,
}

/// Records of `kind` whose key matches `filter`, in the requested order.
pub fn list_entries(
    store: &EntityStore,
    kind: Kind,
    filter: Option<&Regex>,
    order: ListOrder,
) -> Vec<Record> {
    let mut entries: Vec<Record> = store
        .records(kind)
        .into_iter()
        .filter(|r| filter.is_none_or(|re| re.is_match(r.key())))
        .collect();
    if order == ListOrder::Id {
        // Stable sort keeps name order among equal or missing ids.
        entries.sort_by_key(|r| r.numeric_id().map_or(u64::MAX, u64::from));
    }
    entries
}

/// Column headers for a listing table of `kind`.
pub fn headers(kind: Kind) -> &'static [&'static str] {
    match kind {
        Kind::User => &[
            "Username", "Password", "User ID", "Group ID", "Info", "Home", "Shell",
        ],
        Kind::Group => &["Group Name", "Encrypted Password", "Group ID", "Users"],
        Kind::Shadow => &[
            "Username",
            "Password",
            "Last Changed",
            "Min",
            "Max",
            "Warn",
            "Inactive",
            "Expire",
            "Reserved",
        ],
        Kind::GShadow => &["Name", "Password", "Administrators", "Members"],
    }
}

/// Table row for `record`: its line fields in order.
pub fn row(record: &Record) -> Vec<String> {
    record.to_line().split(':').map(str::to_string).collect()
}
