//! Decoding of YAML specification documents.

use crate::core::error::EntitiesError;
use crate::core::record::Record;
use std::fs;
use std::path::Path;

/// File extensions recognised as specification documents.
pub const SPEC_EXTENSIONS: &[&str] = &["yaml", "yml"];

pub fn is_specification(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SPEC_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decode a document from its text. The `kind` field selects the record type.
pub fn parse_specification(content: &str) -> Result<Record, EntitiesError> {
    let record: Record = serde_yaml::from_str(content)
        .map_err(|e| EntitiesError::MalformedRecord(format!("invalid entity document: {}", e)))?;
    if record.key().is_empty() {
        return Err(EntitiesError::MalformedRecord(format!(
            "{} document has an empty name",
            record.kind()
        )));
    }
    Ok(record)
}

/// Read and decode the document at `path`.
pub fn read_specification(path: &Path) -> Result<Record, EntitiesError> {
    let content = fs::read_to_string(path).map_err(EntitiesError::IoError)?;
    parse_specification(&content).map_err(|e| match e {
        EntitiesError::MalformedRecord(msg) => {
            EntitiesError::MalformedRecord(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}
