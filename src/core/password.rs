//! Shadow entry preparation: `now` resolution and password hashing.

use crate::core::error::EntitiesError;
use crate::core::record::Shadow;
use sha_crypt::{ROUNDS_DEFAULT, Sha512Params, sha512_simple};
use std::time::{SystemTime, UNIX_EPOCH};

/// Literal accepted in `last_changed` meaning "today".
pub const LAST_CHANGED_NOW: &str = "now";

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Whole days since the unix epoch.
pub fn days_since_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        / SECONDS_PER_DAY
}

/// True when the value is already a crypt hash or a locked/disabled marker.
pub fn is_hashed(password: &str) -> bool {
    password.starts_with('$') || password.starts_with('!') || password.starts_with('*')
}

/// SHA-512 crypt (`$6$`) with a fresh random salt.
pub fn hash_password(plaintext: &str) -> Result<String, EntitiesError> {
    let params = Sha512Params::new(ROUNDS_DEFAULT)
        .map_err(|e| EntitiesError::PasswordHash(format!("{:?}", e)))?;
    sha512_simple(plaintext, &params).map_err(|e| EntitiesError::PasswordHash(format!("{:?}", e)))
}

/// Resolve `last_changed: now` and hash a plaintext password.
pub fn prepare_shadow(mut shadow: Shadow) -> Result<Shadow, EntitiesError> {
    if shadow.last_changed == LAST_CHANGED_NOW {
        shadow.last_changed = days_since_epoch().to_string();
    }
    if !shadow.password.is_empty() && !is_hashed(&shadow.password) {
        shadow.password = hash_password(&shadow.password)?;
    }
    Ok(shadow)
}
