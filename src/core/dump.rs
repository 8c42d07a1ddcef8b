//! Export of a store as a tree of specification documents.
//!
//! Each record becomes `<dir>/<kind>s/entity_<kind>_<name>.yaml`, readable
//! back with [`crate::core::specfile::read_specification`].

use crate::core::error::EntitiesError;
use crate::core::record::{Kind, Record};
use crate::core::store::EntityStore;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize)]
pub struct DumpSummary {
    pub written: Vec<PathBuf>,
}

fn subdir(kind: Kind) -> &'static str {
    match kind {
        Kind::User => "users",
        Kind::Group => "groups",
        Kind::Shadow => "shadows",
        Kind::GShadow => "gshadows",
    }
}

/// Path of the document for `record` under `target_dir`.
pub fn document_path(target_dir: &Path, record: &Record) -> PathBuf {
    target_dir
        .join(subdir(record.kind()))
        .join(format!("entity_{}_{}.yaml", record.kind(), record.key()))
}

/// Write every record of `store` under `target_dir`, overwriting documents
/// that already exist.
pub fn dump_store(store: &EntityStore, target_dir: &Path) -> Result<DumpSummary, EntitiesError> {
    let mut summary = DumpSummary::default();
    for kind in Kind::ALL {
        let records = store.records(kind);
        if records.is_empty() {
            continue;
        }
        fs::create_dir_all(target_dir.join(subdir(kind)))?;
        for record in records {
            let path = document_path(target_dir, &record);
            let yaml = serde_yaml::to_string(&record).map_err(|e| {
                EntitiesError::MalformedRecord(format!("cannot encode {} {}: {}", kind, record.key(), e))
            })?;
            fs::write(&path, yaml)?;
            debug!(path = %path.display(), "dumped entity");
            summary.written.push(path);
        }
    }
    Ok(summary)
}
