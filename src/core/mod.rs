//! Core modules of the entities reconciliation engine.
//!
//! Records and their line codecs, the locked file mutator, merge rules,
//! the entity store and the operations built on top of them.

pub mod allocator;
pub mod codec;
pub mod compare;
pub mod config;
pub mod dump;
pub mod error;
pub mod listing;
pub mod merge;
pub mod mutator;
pub mod output;
pub mod password;
pub mod reconcile;
pub mod record;
pub mod specfile;
pub mod store;
