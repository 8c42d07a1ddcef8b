//! Entities: declarative management of Unix account databases.
//!
//! Users, groups, shadow and gshadow entries are described as YAML
//! specification documents and reconciled into the colon-delimited account
//! files (`/etc/passwd`, `/etc/group`, `/etc/shadow`, `/etc/gshadow`).
//!
//! # Architecture
//!
//! - [`core::record`] and [`core::codec`]: the four record kinds and their line format
//! - [`core::mutator`]: lock, read, edit and rewrite a target file
//! - [`core::merge`] and [`core::allocator`]: merge rules and dynamic gids
//! - [`core::store`]: specification trees and live-system snapshots
//! - [`core::reconcile`] and [`core::compare`]: the operations
//!
//! Every edit of a target file holds an exclusive `flock` on
//! `<lock dir>/<basename>.lock` for the whole read-modify-write cycle.
//!
//! # Examples
//!
//! ```bash
//! # Add a group, allocating a gid when the document has none
//! entities create specs/groups/ops.yaml
//!
//! # Merge a whole tree of specifications without touching existing ids
//! entities merge -s specs/base -s specs/site --all
//!
//! # What would change?
//! entities compare -s specs/base --json
//! ```

pub mod core;

mod cli;

use crate::core::compare::compare;
use crate::core::config::{EntitiesConfig, load_config};
use crate::core::dump::dump_store;
use crate::core::error::EntitiesError;
use crate::core::listing::list_entries;
use crate::core::output::{render_differences, render_records, to_json};
use crate::core::reconcile::{ApplyOutcome, Reconciler};
use crate::core::specfile::read_specification;
use crate::core::store::EntityStore;
use clap::Parser;
use cli::{Cli, Command, TargetFilesArgs};
use colored::Colorize;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Whether `--verbose`/`-v` appears on the command line. Used by the binary
/// to pick the log level before full argument parsing.
pub fn verbose_requested<I, S>(args: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .any(|a| matches!(a.as_ref(), "--verbose" | "-v"))
}

/// Resolve the effective configuration: defaults, then the TOML file, then
/// environment overrides, then command-line target paths.
fn build_config(
    config_path: Option<&Path>,
    targets: &TargetFilesArgs,
) -> Result<EntitiesConfig, EntitiesError> {
    let mut config = match config_path {
        Some(path) => load_config(path)?,
        None => EntitiesConfig::default(),
    };
    config.apply_env(|name| std::env::var(name).ok())?;

    let overrides: [(&Option<PathBuf>, &mut PathBuf); 4] = [
        (&targets.users_file, &mut config.users_file),
        (&targets.groups_file, &mut config.groups_file),
        (&targets.shadow_file, &mut config.shadow_file),
        (&targets.gshadow_file, &mut config.gshadow_file),
    ];
    for (wanted, slot) in overrides {
        if let Some(path) = wanted {
            *slot = path.clone();
        }
    }

    config.validate()?;
    debug!(?config, "resolved configuration");
    Ok(config)
}

fn load_store(dirs: &[PathBuf]) -> Result<EntityStore, EntitiesError> {
    let mut store = EntityStore::new();
    let report = store.load(dirs)?;
    for skipped in &report.skipped {
        eprintln!(
            "{} {}: {}",
            "skipped".yellow(),
            skipped.path.display(),
            skipped.reason
        );
    }
    debug!(loaded = report.loaded, skipped = report.skipped.len(), "specification store loaded");
    Ok(store)
}

pub fn run() -> Result<(), EntitiesError> {
    let cli = Cli::parse();
    let config = build_config(cli.config.as_deref(), &cli.targets)?;
    let reconciler = Reconciler::new(&config);

    match cli.command {
        Command::Create(args) => {
            let record = read_specification(&args.spec)?;
            let target = reconciler.resolve_target(&record, args.file.as_deref());
            reconciler.create(&record, target)?;
            println!("Entity {} created.", record.key());
        }
        Command::Apply { entity, safe } => {
            let record = read_specification(&entity.spec)?;
            let target = reconciler.resolve_target(&record, entity.file.as_deref());
            let verb = match reconciler.apply(&record, target, safe)? {
                ApplyOutcome::Created => "created",
                ApplyOutcome::Updated => "updated",
            };
            println!("Entity {} {}.", record.key(), verb);
        }
        Command::Delete(args) => {
            let record = read_specification(&args.spec)?;
            let target = reconciler.resolve_target(&record, args.file.as_deref());
            reconciler.delete(&record, target)?;
            println!("Entity {} deleted.", record.key());
        }
        Command::Merge { specs, entity, all } => {
            let store = load_store(&specs.specs_dirs)?;
            let applied = match entity {
                Some(name) if !all => reconciler.apply_named(&store, &name, true)?,
                _ => {
                    if store.is_empty() {
                        return Err(EntitiesError::NotFound(
                            "no entities to merge".to_string(),
                        ));
                    }
                    reconciler.apply_store(&store, true)?
                }
            };
            for entry in applied {
                println!("Merged {} {}.", entry.kind, entry.name);
            }
        }
        Command::Compare { specs, json } => {
            let desired = load_store(&specs.specs_dirs)?;
            let current = EntityStore::from_system(&config)?;
            let differences = compare(&desired, &current);
            if json {
                println!("{}", to_json(&differences)?);
            } else {
                print!("{}", render_differences(&differences));
            }
        }
        Command::List {
            kind,
            specs_dirs,
            filter,
            order,
            json,
        } => {
            let store = if specs_dirs.is_empty() {
                EntityStore::from_system(&config)?
            } else {
                load_store(&specs_dirs)?
            };
            let filter = filter
                .map(|raw| {
                    Regex::new(&raw).map_err(|e| {
                        EntitiesError::ConfigError(format!("invalid filter '{}': {}", raw, e))
                    })
                })
                .transpose()?;
            let kind = kind.into();
            let entries = list_entries(&store, kind, filter.as_ref(), order.into());
            if json {
                println!("{}", to_json(&entries)?);
            } else {
                print!("{}", render_records(kind, &entries));
            }
        }
        Command::Dump { target_dir } => {
            let store = EntityStore::from_system(&config)?;
            let summary = dump_store(&store, &target_dir)?;
            println!(
                "Dumped {} entities into {}.",
                summary.written.len(),
                target_dir.display()
            );
        }
    }
    Ok(())
}
