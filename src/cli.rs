//! CLI struct definitions for the entities command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `lib.rs`.

use crate::core::listing::ListOrder;
use crate::core::record::Kind;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "entities",
    version = env!("CARGO_PKG_VERSION"),
    about = "Declarative management of /etc/passwd, /etc/group, /etc/shadow and /etc/gshadow entries."
)]
pub(crate) struct Cli {
    /// TOML configuration file with target paths, id range and lock settings.
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,
    /// Log at debug level unless RUST_LOG says otherwise.
    #[clap(long, short = 'v', global = true)]
    pub verbose: bool,
    #[clap(flatten)]
    pub targets: TargetFilesArgs,
    #[clap(subcommand)]
    pub command: Command,
}

/// Per-kind target overrides, applied after config file and environment.
#[derive(clap::Args, Debug, Default)]
pub(crate) struct TargetFilesArgs {
    #[clap(long, global = true)]
    pub users_file: Option<PathBuf>,
    #[clap(long, global = true)]
    pub groups_file: Option<PathBuf>,
    #[clap(long, global = true)]
    pub shadow_file: Option<PathBuf>,
    #[clap(long, global = true)]
    pub gshadow_file: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub(crate) struct EntityFileArgs {
    /// Specification document describing the entity.
    pub spec: PathBuf,
    /// Target file to edit instead of the kind's configured default.
    #[clap(long, short = 'f')]
    pub file: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub(crate) struct SpecsDirArgs {
    /// Directory of specification documents. Later directories overlay earlier ones.
    #[clap(long = "specs-dir", short = 's', required = true)]
    pub specs_dirs: Vec<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum ListKind {
    Users,
    Groups,
    Shadows,
    Gshadows,
}

impl From<ListKind> for Kind {
    fn from(value: ListKind) -> Self {
        match value {
            ListKind::Users => Kind::User,
            ListKind::Groups => Kind::Group,
            ListKind::Shadows => Kind::Shadow,
            ListKind::Gshadows => Kind::GShadow,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OrderArg {
    Name,
    Id,
}

impl From<OrderArg> for ListOrder {
    fn from(value: OrderArg) -> Self {
        match value {
            OrderArg::Name => ListOrder::Name,
            OrderArg::Id => ListOrder::Id,
        }
    }
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Create an entity. Fails when it is already present.
    Create(EntityFileArgs),
    /// Create or update an entity.
    Apply {
        #[clap(flatten)]
        entity: EntityFileArgs,
        /// Never change the gid or password of an existing group.
        #[clap(long)]
        safe: bool,
    },
    /// Delete an entity. Fails when it is absent.
    Delete(EntityFileArgs),
    /// Merge entities from specification directories into the system,
    /// keeping existing ids and passwords.
    Merge {
        #[clap(flatten)]
        specs: SpecsDirArgs,
        /// Name of the entity to merge, across all kinds.
        #[clap(long, short = 'e', conflicts_with = "all", required_unless_present = "all")]
        entity: Option<String>,
        /// Merge every entity of the specification store.
        #[clap(long)]
        all: bool,
    },
    /// Show the entities of the specification store that differ from the system.
    Compare {
        #[clap(flatten)]
        specs: SpecsDirArgs,
        #[clap(long)]
        json: bool,
    },
    /// List entities of one kind.
    List {
        #[clap(value_enum)]
        kind: ListKind,
        /// Read a specification store instead of the system files.
        #[clap(long = "specs-dir", short = 's')]
        specs_dirs: Vec<PathBuf>,
        /// Regular expression matched against entity names.
        #[clap(long)]
        filter: Option<String>,
        #[clap(long, value_enum, default_value = "name")]
        order: OrderArg,
        #[clap(long)]
        json: bool,
    },
    /// Write the system entities as specification documents.
    Dump {
        #[clap(long)]
        target_dir: PathBuf,
    },
}
