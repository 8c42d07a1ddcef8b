//! Runtime configuration for the reconciliation engine.
//!
//! Target file paths, the dynamic id range and lock timing are carried in an
//! explicit [`EntitiesConfig`] value. The core never reads the process
//! environment itself: environment overrides go through [`EntitiesConfig::apply_env`]
//! with a caller-supplied lookup.

use crate::core::error::EntitiesError;
use crate::core::record::Kind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DEFAULT_PASSWD: &str = "ENTITY_DEFAULT_PASSWD";
pub const ENV_DEFAULT_GROUPS: &str = "ENTITY_DEFAULT_GROUPS";
pub const ENV_DEFAULT_SHADOW: &str = "ENTITY_DEFAULT_SHADOW";
pub const ENV_DEFAULT_GSHADOW: &str = "ENTITY_DEFAULT_GSHADOW";
pub const ENV_DYNAMIC_RANGE: &str = "ENTITY_DYNAMIC_RANGE";
pub const ENV_LOCK_TIMEOUT_MS: &str = "ENTITY_LOCK_TIMEOUT_MS";
pub const ENV_LOCK_INTERVAL_MS: &str = "ENTITY_LOCK_INTERVAL_MS";

/// First id handed out to dynamically allocated groups.
pub const HUMAN_ID_MIN: u32 = 1000;
/// Last id handed out to dynamically allocated groups.
pub const HUMAN_ID_MAX: u32 = 60000;

const DEFAULT_LOCK_DIR: &str = "/run/lock";
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_LOCK_INTERVAL_MS: u64 = 100;

/// Inclusive range of ids the allocator may hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdRange {
    pub min: u32,
    pub max: u32,
}

impl Default for IdRange {
    fn default() -> Self {
        Self {
            min: HUMAN_ID_MIN,
            max: HUMAN_ID_MAX,
        }
    }
}

impl IdRange {
    /// Parses the `min-max` form used by `ENTITY_DYNAMIC_RANGE`.
    pub fn parse(raw: &str) -> Result<Self, EntitiesError> {
        let (min, max) = raw.trim().split_once('-').ok_or_else(|| {
            EntitiesError::ConfigError(format!("dynamic range '{}' is not in min-max form", raw))
        })?;
        let parse = |s: &str| {
            s.trim().parse::<u32>().map_err(|e| {
                EntitiesError::ConfigError(format!("dynamic range '{}': {}", raw, e))
            })
        };
        Ok(Self {
            min: parse(min)?,
            max: parse(max)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Directory holding the `<basename>.lock` files.
    pub dir: PathBuf,
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_LOCK_DIR),
            timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_LOCK_INTERVAL_MS,
        }
    }
}

impl LockConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Lock file guarding `target`, derived from its base name.
    pub fn lock_path(&self, target: &Path) -> PathBuf {
        let base = target
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "entities".to_string());
        self.dir.join(format!("{}.lock", base))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitiesConfig {
    pub users_file: PathBuf,
    pub groups_file: PathBuf,
    pub shadow_file: PathBuf,
    pub gshadow_file: PathBuf,
    pub dynamic_range: IdRange,
    pub lock: LockConfig,
}

impl Default for EntitiesConfig {
    fn default() -> Self {
        Self {
            users_file: PathBuf::from("/etc/passwd"),
            groups_file: PathBuf::from("/etc/group"),
            shadow_file: PathBuf::from("/etc/shadow"),
            gshadow_file: PathBuf::from("/etc/gshadow"),
            dynamic_range: IdRange::default(),
            lock: LockConfig::default(),
        }
    }
}

impl EntitiesConfig {
    /// Default target file for records of `kind`.
    pub fn target_for(&self, kind: Kind) -> &Path {
        match kind {
            Kind::User => &self.users_file,
            Kind::Group => &self.groups_file,
            Kind::Shadow => &self.shadow_file,
            Kind::GShadow => &self.gshadow_file,
        }
    }

    /// Applies environment-style overrides. `lookup` returns the value of a
    /// variable, or `None` when it is unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), EntitiesError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty(ENV_DEFAULT_PASSWD) {
            self.users_file = PathBuf::from(v);
        }
        if let Some(v) = non_empty(ENV_DEFAULT_GROUPS) {
            self.groups_file = PathBuf::from(v);
        }
        if let Some(v) = non_empty(ENV_DEFAULT_SHADOW) {
            self.shadow_file = PathBuf::from(v);
        }
        if let Some(v) = non_empty(ENV_DEFAULT_GSHADOW) {
            self.gshadow_file = PathBuf::from(v);
        }
        if let Some(v) = non_empty(ENV_DYNAMIC_RANGE) {
            self.dynamic_range = IdRange::parse(&v)?;
        }
        if let Some(v) = non_empty(ENV_LOCK_TIMEOUT_MS) {
            self.lock.timeout_ms = parse_millis(ENV_LOCK_TIMEOUT_MS, &v)?;
        }
        if let Some(v) = non_empty(ENV_LOCK_INTERVAL_MS) {
            self.lock.poll_interval_ms = parse_millis(ENV_LOCK_INTERVAL_MS, &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), EntitiesError> {
        if self.dynamic_range.min > self.dynamic_range.max {
            return Err(EntitiesError::ConfigError(format!(
                "dynamic range {}-{} is inverted",
                self.dynamic_range.min, self.dynamic_range.max
            )));
        }
        if self.lock.poll_interval_ms == 0 {
            return Err(EntitiesError::ConfigError(
                "lock poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_millis(name: &str, raw: &str) -> Result<u64, EntitiesError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| EntitiesError::ConfigError(format!("{}='{}': {}", name, raw, e)))
}

/// Load configuration from a TOML file. Missing keys keep their defaults.
pub fn load_config(path: &Path) -> Result<EntitiesConfig, EntitiesError> {
    let content = fs::read_to_string(path).map_err(EntitiesError::IoError)?;
    let config: EntitiesConfig =
        toml::from_str(&content).map_err(|e| EntitiesError::ConfigError(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_point_at_system_files() {
        let config = EntitiesConfig::default();
        assert_eq!(config.target_for(Kind::User), Path::new("/etc/passwd"));
        assert_eq!(config.target_for(Kind::GShadow), Path::new("/etc/gshadow"));
        assert_eq!(config.dynamic_range, IdRange { min: 1000, max: 60000 });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_use_injected_lookup() {
        let vars: HashMap<&str, &str> = [
            (ENV_DEFAULT_GROUPS, "/tmp/group"),
            (ENV_DYNAMIC_RANGE, "200-300"),
            (ENV_LOCK_TIMEOUT_MS, "250"),
            (ENV_DEFAULT_SHADOW, ""),
        ]
        .into_iter()
        .collect();

        let mut config = EntitiesConfig::default();
        config
            .apply_env(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.groups_file, PathBuf::from("/tmp/group"));
        assert_eq!(config.shadow_file, PathBuf::from("/etc/shadow"));
        assert_eq!(config.dynamic_range, IdRange { min: 200, max: 300 });
        assert_eq!(config.lock.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_bad_range_is_config_error() {
        assert!(matches!(
            IdRange::parse("abc"),
            Err(EntitiesError::ConfigError(_))
        ));
        let mut config = EntitiesConfig::default();
        config.dynamic_range = IdRange { min: 10, max: 5 };
        assert!(matches!(
            config.validate(),
            Err(EntitiesError::ConfigError(_))
        ));
    }

    #[test]
    fn test_lock_path_uses_target_basename() {
        let lock = LockConfig {
            dir: PathBuf::from("/var/lock"),
            ..LockConfig::default()
        };
        assert_eq!(
            lock.lock_path(Path::new("/etc/group")),
            PathBuf::from("/var/lock/group.lock")
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("entities.toml");
        fs::write(
            &path,
            "groups_file = \"/srv/group\"\n\n[lock]\ntimeout_ms = 500\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.groups_file, PathBuf::from("/srv/group"));
        assert_eq!(config.users_file, PathBuf::from("/etc/passwd"));
        assert_eq!(config.lock.timeout_ms, 500);
        assert_eq!(config.lock.poll_interval_ms, 100);
    }
}
