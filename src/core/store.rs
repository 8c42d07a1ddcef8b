//! In-memory entity store.
//!
//! An [`EntityStore`] aggregates records of the four kinds into name-keyed
//! maps. It is filled either from trees of specification documents (desired
//! state) or from the live account files (current state).
//!
//! Loading is order-sensitive: directories are walked in the order given,
//! entries within a directory by file name, and a document naming a key that
//! is already present is merged into the earlier record rather than
//! replacing it. This is how a base specification composes with overlays.

use crate::core::codec::parse_file;
use crate::core::config::EntitiesConfig;
use crate::core::error::EntitiesError;
use crate::core::merge::merge;
use crate::core::record::{GShadow, Group, Kind, Record, Shadow, User};
use crate::core::specfile::{is_specification, read_specification};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A specification document that could not be decoded during a load.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of [`EntityStore::load`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: Vec<SkippedDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityStore {
    pub users: BTreeMap<String, User>,
    pub groups: BTreeMap<String, Group>,
    pub shadows: BTreeMap<String, Shadow>,
    pub gshadows: BTreeMap<String, GShadow>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the live system: the four configured target files.
    pub fn from_system(config: &EntitiesConfig) -> Result<Self, EntitiesError> {
        Ok(Self {
            users: parse_file(&config.users_file)?,
            groups: parse_file(&config.groups_file)?,
            shadows: parse_file(&config.shadow_file)?,
            gshadows: parse_file(&config.gshadow_file)?,
        })
    }

    /// Load every specification document found under `dirs`.
    ///
    /// Documents that fail to decode are skipped and listed in the report;
    /// an unreadable directory aborts the load.
    pub fn load<P: AsRef<Path>>(&mut self, dirs: &[P]) -> Result<LoadReport, EntitiesError> {
        let mut report = LoadReport::default();
        for dir in dirs {
            let mut files = Vec::new();
            collect_documents(dir.as_ref(), &mut files)?;
            for file in files {
                match read_specification(&file) {
                    Ok(record) => {
                        debug!(path = %file.display(), kind = %record.kind(), key = record.key(), "loaded entity");
                        self.add_entity(record)?;
                        report.loaded += 1;
                    }
                    Err(EntitiesError::MalformedRecord(reason)) => {
                        warn!(path = %file.display(), %reason, "skipping entity document");
                        report.skipped.push(SkippedDocument { path: file, reason });
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(report)
    }

    /// Add one record, merging it into an existing record with the same key.
    pub fn add_entity(&mut self, record: Record) -> Result<(), EntitiesError> {
        let current = self.get(record.kind(), record.key());
        let merged = merge(current.as_ref(), record, false)?;
        self.insert(merged);
        Ok(())
    }

    fn insert(&mut self, record: Record) {
        match record {
            Record::User(u) => {
                self.users.insert(u.username.clone(), u);
            }
            Record::Group(g) => {
                self.groups.insert(g.name.clone(), g);
            }
            Record::Shadow(s) => {
                self.shadows.insert(s.username.clone(), s);
            }
            Record::GShadow(g) => {
                self.gshadows.insert(g.name.clone(), g);
            }
        }
    }

    pub fn get_user(&self, name: &str) -> Option<&User> {
        self.users.get(name)
    }

    pub fn get_group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    pub fn get_shadow(&self, name: &str) -> Option<&Shadow> {
        self.shadows.get(name)
    }

    pub fn get_gshadow(&self, name: &str) -> Option<&GShadow> {
        self.gshadows.get(name)
    }

    /// Owned copy of the record of `kind` named `name`.
    pub fn get(&self, kind: Kind, name: &str) -> Option<Record> {
        match kind {
            Kind::User => self.users.get(name).cloned().map(Record::User),
            Kind::Group => self.groups.get(name).cloned().map(Record::Group),
            Kind::Shadow => self.shadows.get(name).cloned().map(Record::Shadow),
            Kind::GShadow => self.gshadows.get(name).cloned().map(Record::GShadow),
        }
    }

    /// All records of `kind`, ordered by key.
    pub fn records(&self, kind: Kind) -> Vec<Record> {
        match kind {
            Kind::User => self.users.values().cloned().map(Record::User).collect(),
            Kind::Group => self.groups.values().cloned().map(Record::Group).collect(),
            Kind::Shadow => self.shadows.values().cloned().map(Record::Shadow).collect(),
            Kind::GShadow => self
                .gshadows
                .values()
                .cloned()
                .map(Record::GShadow)
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.users.len() + self.groups.len() + self.shadows.len() + self.gshadows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Recursively gather specification files under `dir`, sorted per directory.
fn collect_documents(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), EntitiesError> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(EntitiesError::IoError)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()
        .map_err(EntitiesError::IoError)?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            collect_documents(&path, out)?;
        } else if is_specification(&path) {
            out.push(path);
        }
    }
    Ok(())
}
