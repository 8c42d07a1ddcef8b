use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EntitiesError {
    #[error("Malformed record: {0}")]
    MalformedRecord(String),
    #[error("Entity already present: {0}")]
    AlreadyExists(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Failed locking file: {0}")]
    LockFailed(String),
    #[error("No available id in range {min}-{max}")]
    NoFreeId { min: u32, max: u32 },
    #[error("Merge conflict: {0}")]
    MergeConflict(String),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
}
