//! Application context
//!
//! All per-process state lives in one `AppContext` built at startup and
//! passed by reference to whoever needs it; there are no globals. The
//! context constructs every configured database instance, wires master
//! links, starts one sweep thread per instance, and tears everything down
//! in reverse on shutdown.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use shotdb_core::{ShotError, ShotResult};

use crate::config::EngineConfig;
use crate::database::DbInstance;
use crate::sweep::Sweeper;

/// Process-wide engine state: instances plus their sweep threads.
pub struct AppContext {
    instances: BTreeMap<String, Arc<DbInstance>>,
    sweepers: Vec<Sweeper>,
}

impl AppContext {
    /// Build the context from a parsed configuration.
    ///
    /// # Errors
    ///
    /// `Config` for wiring errors; I/O errors from instance construction.
    pub fn from_config(config: EngineConfig) -> ShotResult<Self> {
        let mut instances = BTreeMap::new();
        for (name, db_config) in &config.db {
            let instance = DbInstance::new(name, db_config.clone())?;
            instances.insert(name.clone(), instance);
        }
        // Master links can only be wired once every instance exists.
        for (name, db_config) in &config.db {
            if let Some(master_name) = &db_config.master {
                let master = instances
                    .get(master_name)
                    .cloned()
                    .ok_or_else(|| {
                        ShotError::Config(format!(
                            "db.{name}: master {master_name:?} is not a configured database"
                        ))
                    })?;
                instances[name].set_master(master);
            }
        }
        let sweepers = instances
            .values()
            .map(|db| {
                Sweeper::start(
                    db.clone(),
                    Duration::from_secs(db.config().sweep_interval_secs),
                )
            })
            .collect();
        info!(databases = instances.len(), "engine context started");
        Ok(Self { instances, sweepers })
    }

    /// Load (or materialize) `shotdb.toml` in a directory and start.
    ///
    /// # Errors
    ///
    /// See [`EngineConfig::load_or_create`] and [`Self::from_config`].
    pub fn open(config_dir: &Path) -> ShotResult<Self> {
        Self::from_config(EngineConfig::load_or_create(config_dir)?)
    }

    /// Look up a database instance by name.
    pub fn db(&self, name: &str) -> Option<Arc<DbInstance>> {
        self.instances.get(name).cloned()
    }

    /// Configured database names, sorted.
    pub fn db_names(&self) -> Vec<&str> {
        self.instances.keys().map(String::as_str).collect()
    }

    /// Cooperative shutdown: sweep threads joined, instances closed.
    pub fn shutdown(mut self) {
        for sweeper in self.sweepers.drain(..) {
            sweeper.stop();
        }
        for db in self.instances.values() {
            db.shutdown();
        }
        info!("engine context shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn two_db_config(dir: &TempDir) -> EngineConfig {
        let raw = format!(
            r#"
            [db.main]
            root = "{0}/main/data"
            volatile_root = "{0}/main/vol"
            sync_root = "{0}/main/sync"
            master = "archive"

            [db.archive]
            root = "{0}/archive/data"
            volatile_root = "{0}/archive/vol"
            sync_root = "{0}/archive/sync"
            read_only = true
            "#,
            dir.path().display()
        );
        EngineConfig::from_toml(&raw).unwrap()
    }

    #[test]
    fn test_context_builds_and_wires_instances() {
        let dir = TempDir::new().unwrap();
        let ctx = AppContext::from_config(two_db_config(&dir)).unwrap();
        assert_eq!(ctx.db_names(), vec!["archive", "main"]);
        assert!(ctx.db("main").is_some());
        assert!(ctx.db("nope").is_none());
        ctx.shutdown();
    }

    #[test]
    fn test_context_shutdown_closes_instances() {
        let dir = TempDir::new().unwrap();
        let ctx = AppContext::from_config(two_db_config(&dir)).unwrap();
        let main = ctx.db("main").unwrap();
        ctx.shutdown();
        assert!(main.is_shutting_down());
    }

    #[test]
    fn test_open_materializes_default_config() {
        let dir = TempDir::new().unwrap();
        let ctx = AppContext::open(dir.path()).unwrap();
        assert!(ctx.db_names().is_empty());
        assert!(dir.path().join(crate::config::CONFIG_FILE_NAME).exists());
        ctx.shutdown();
    }
}
