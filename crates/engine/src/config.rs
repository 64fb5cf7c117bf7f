//! Engine configuration
//!
//! One `shotdb.toml` configures every logical database the process hosts.
//! A missing file is materialized with commented defaults on first load so
//! a fresh deployment has something to edit. Limits fall back to the
//! deployment-proven defaults in `shotdb_core::limits`.
//!
//! ```toml
//! [db.main]
//! root = "/srv/shots/main"
//! volatile_root = "/srv/shots/volatile"
//! sync_root = "/srv/shots/sync"
//!
//! [db.archive]
//! root = "/srv/shots/archive"
//! volatile_root = "/srv/shots/archive-volatile"
//! sync_root = "/srv/shots/archive-sync"
//! read_only = true
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use shotdb_core::limits::{
    DEFAULT_DISPOSE_DELAY_SECS, DEFAULT_LOW_SPACE_WARN_MB, DEFAULT_MAX_OPEN_SHOTS,
    DEFAULT_STALL_THRESHOLD_SECS, DEFAULT_SWEEP_INTERVAL_SECS, DEFAULT_TASK_LIST_CAP,
};
use shotdb_core::{ShotError, ShotResult};

/// Configuration file name looked up in the engine's config directory.
pub const CONFIG_FILE_NAME: &str = "shotdb.toml";

/// Configuration of one logical database instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Main (permanent) tier root directory
    pub root: PathBuf,
    /// Volatile tier root directory
    pub volatile_root: PathBuf,
    /// Sync-flag tree root directory
    pub sync_root: PathBuf,
    /// Reject all writes on this instance
    pub read_only: bool,
    /// Maximum open shot objects before the sweep evicts oldest-idle first
    pub max_open_shots: usize,
    /// Idle seconds before a refcount-zero shot is evicted
    pub dispose_delay_secs: u64,
    /// Wake interval of the background sweep thread
    pub sweep_interval_secs: u64,
    /// Cap on shots per replication task list
    pub task_list_cap: usize,
    /// Age after which a lingering prep sync flag is demoted to stall
    pub stall_threshold_secs: u64,
    /// Delete the erased-marker file immediately after an incoming erase
    pub remove_erased: bool,
    /// Free-space warning threshold in megabytes
    pub low_space_warn_mb: u64,
    /// Name of the master database consulted for absent non-local shots
    pub master: Option<String>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            volatile_root: PathBuf::new(),
            sync_root: PathBuf::new(),
            read_only: false,
            max_open_shots: DEFAULT_MAX_OPEN_SHOTS,
            dispose_delay_secs: DEFAULT_DISPOSE_DELAY_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            task_list_cap: DEFAULT_TASK_LIST_CAP,
            stall_threshold_secs: DEFAULT_STALL_THRESHOLD_SECS,
            remove_erased: false,
            low_space_warn_mb: DEFAULT_LOW_SPACE_WARN_MB,
            master: None,
        }
    }
}

impl DbConfig {
    /// Check the required path fields are present.
    ///
    /// # Errors
    ///
    /// `Config` naming the missing field.
    pub fn validate(&self, db_name: &str) -> ShotResult<()> {
        for (field, path) in [
            ("root", &self.root),
            ("volatile_root", &self.volatile_root),
            ("sync_root", &self.sync_root),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ShotError::Config(format!(
                    "db.{db_name}: {field} is required"
                )));
            }
        }
        Ok(())
    }
}

/// Whole-process configuration: one entry per logical database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Databases by name
    pub db: BTreeMap<String, DbConfig>,
}

impl EngineConfig {
    /// Parse a configuration string.
    ///
    /// # Errors
    ///
    /// `Config` on a TOML syntax or schema error, or an invalid entry.
    pub fn from_toml(raw: &str) -> ShotResult<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| ShotError::Config(e.to_string()))?;
        for (name, db) in &config.db {
            db.validate(name)?;
            if let Some(master) = &db.master {
                if !config.db.contains_key(master) {
                    return Err(ShotError::Config(format!(
                        "db.{name}: master {master:?} is not a configured database"
                    )));
                }
                if master == name {
                    return Err(ShotError::Config(format!(
                        "db.{name}: database cannot be its own master"
                    )));
                }
            }
        }
        Ok(config)
    }

    /// Load `shotdb.toml` from a directory, writing a commented default
    /// file first when none exists.
    ///
    /// # Errors
    ///
    /// I/O errors, or `Config` when the file does not parse.
    pub fn load_or_create(dir: &Path) -> ShotResult<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            std::fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
            info!(path = %path.display(), "default configuration written");
        }
        let raw = std::fs::read_to_string(&path)?;
        Self::from_toml(&raw)
    }
}

const DEFAULT_CONFIG_TEMPLATE: &str = "\
# shotdb configuration
#
# One [db.<name>] section per logical database. The three path fields are
# required; everything else falls back to the defaults shown.
#
# [db.main]
# root = \"/srv/shots/main\"
# volatile_root = \"/srv/shots/volatile\"
# sync_root = \"/srv/shots/sync\"
# read_only = false
# max_open_shots = 64
# dispose_delay_secs = 300
# sweep_interval_secs = 10
# task_list_cap = 999
# stall_threshold_secs = 86400
# remove_erased = false
# low_space_warn_mb = 1024
# master = \"archive\"
";

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
        [db.main]
        root = "/srv/main"
        volatile_root = "/srv/vol"
        sync_root = "/srv/sync"
    "#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = EngineConfig::from_toml(MINIMAL).unwrap();
        let db = &config.db["main"];
        assert_eq!(db.root, PathBuf::from("/srv/main"));
        assert_eq!(db.max_open_shots, DEFAULT_MAX_OPEN_SHOTS);
        assert_eq!(db.stall_threshold_secs, DEFAULT_STALL_THRESHOLD_SECS);
        assert!(!db.read_only);
        assert!(db.master.is_none());
    }

    #[test]
    fn test_missing_path_rejected() {
        let raw = r#"
            [db.main]
            root = "/srv/main"
            volatile_root = "/srv/vol"
        "#;
        let err = EngineConfig::from_toml(raw).unwrap_err();
        assert!(err.to_string().contains("sync_root"));
    }

    #[test]
    fn test_unknown_master_rejected() {
        let raw = r#"
            [db.main]
            root = "/a"
            volatile_root = "/b"
            sync_root = "/c"
            master = "archive"
        "#;
        let err = EngineConfig::from_toml(raw).unwrap_err();
        assert!(err.to_string().contains("archive"));
    }

    #[test]
    fn test_self_master_rejected() {
        let raw = r#"
            [db.main]
            root = "/a"
            volatile_root = "/b"
            sync_root = "/c"
            master = "main"
        "#;
        assert!(EngineConfig::from_toml(raw).is_err());
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = EngineConfig::from_toml("not = [valid").unwrap_err();
        assert!(matches!(err, ShotError::Config(_)));
    }

    #[test]
    fn test_default_template_parses_empty() {
        // The template is all comments; a missing [db] table means no
        // databases, not a schema error.
        let config = EngineConfig::from_toml(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert!(config.db.is_empty());
    }

    #[test]
    fn test_load_or_create_writes_template() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::load_or_create(dir.path()).unwrap();
        assert!(config.db.is_empty(), "template has no active databases");
        assert!(dir.path().join(CONFIG_FILE_NAME).exists());

        // Second load reads the same file back.
        EngineConfig::load_or_create(dir.path()).unwrap();
    }
}
