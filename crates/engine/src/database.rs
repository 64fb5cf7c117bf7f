//! Database instance
//!
//! One `DbInstance` per configured logical database: it owns the shot
//! cache, both replication cursors, the inbound portion receiver, and an
//! operator-visible status line. Writes to the volatile tier are wrapped
//! in the sync-flag begin/end transaction so the volatile lane sees them;
//! main-tier writes need no flags because the permanent lane diffs file
//! lists.
//!
//! A `master` database, when configured, is consulted read-only for shots
//! absent locally — but only for non-local names; a locally-issued suffix
//! cannot exist anywhere else, so it never falls back.

use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use shotdb_core::{
    Broadcaster, ChangeMonitor, NoopObserver, ShotError, ShotName, ShotResult, SignalId, Tier,
};
use shotdb_storage::{NewShotParams, Shot, SignalHeader};
use shotdb_sync::{
    flags, BackupCursor, Lane, PortionOutcome, PortionReceiver, ResumeMarker, SendItem, SyncOp,
    SyncPaths,
};

use crate::cache::{ShotCache, ShotHandle};
use crate::config::DbConfig;

/// One logical database: cache, replication lanes, and status.
pub struct DbInstance {
    name: String,
    config: DbConfig,
    cache: ShotCache,
    permanent: Mutex<BackupCursor>,
    volatile: Mutex<BackupCursor>,
    receiver: Mutex<PortionReceiver>,
    master: Mutex<Option<Arc<DbInstance>>>,
    broadcaster: Mutex<Arc<dyn Broadcaster>>,
    status: Mutex<String>,
    shutdown: Arc<AtomicBool>,
}

impl DbInstance {
    /// Build an instance from its configuration, creating the tier roots.
    ///
    /// # Errors
    ///
    /// `Config` on an invalid configuration; I/O errors creating the
    /// directory roots.
    pub fn new(name: &str, config: DbConfig) -> ShotResult<Arc<Self>> {
        config.validate(name)?;
        for root in [&config.root, &config.volatile_root, &config.sync_root] {
            std::fs::create_dir_all(root)?;
        }
        let shutdown = Arc::new(AtomicBool::new(false));
        let paths = SyncPaths {
            data_root: config.root.clone(),
            volatile_root: config.volatile_root.clone(),
            sync_root: config.sync_root.clone(),
        };
        let stall_threshold = Duration::from_secs(config.stall_threshold_secs);
        let cache = ShotCache::new(
            name,
            config.root.clone(),
            config.volatile_root.clone(),
            !config.read_only,
            config.max_open_shots,
            Duration::from_secs(config.dispose_delay_secs),
            shutdown.clone(),
        );
        let instance = Arc::new(Self {
            name: name.to_string(),
            cache,
            permanent: Mutex::new(BackupCursor::new(
                Lane::Permanent,
                paths.clone(),
                config.task_list_cap,
                stall_threshold,
            )),
            volatile: Mutex::new(BackupCursor::new(
                Lane::Volatile,
                paths,
                config.task_list_cap,
                stall_threshold,
            )),
            receiver: Mutex::new(PortionReceiver::new(
                &config.root,
                &config.volatile_root,
                config.remove_erased,
            )),
            master: Mutex::new(None),
            broadcaster: Mutex::new(Arc::new(NoopObserver)),
            status: Mutex::new(String::new()),
            config,
            shutdown,
        });
        info!(db = name, "database instance ready");
        Ok(instance)
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instance configuration.
    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Wire the read-only master fallback (done once at startup).
    pub fn set_master(&self, master: Arc<DbInstance>) {
        *self.master.lock() = Some(master);
    }

    /// Install the broadcaster notified on administrative events (done
    /// once at startup by whoever owns the session layer).
    pub fn set_broadcaster(&self, broadcaster: Arc<dyn Broadcaster>) {
        *self.broadcaster.lock() = broadcaster;
    }

    fn broadcaster(&self) -> Arc<dyn Broadcaster> {
        self.broadcaster.lock().clone()
    }

    // ------------------------------------------------------------------
    // Shot access
    // ------------------------------------------------------------------

    /// Open or create a shot.
    ///
    /// With `allow_master`, a shot absent locally whose name is not
    /// locally issued is looked up in the master database instead.
    ///
    /// # Errors
    ///
    /// See [`ShotCache::open_or_create`]; additionally `ReadOnly` for a
    /// create on a read-only instance.
    pub fn open_shot(
        &self,
        name: &ShotName,
        create: bool,
        params: NewShotParams,
        allow_master: bool,
    ) -> ShotResult<ShotHandle> {
        if create && self.config.read_only {
            return Err(ShotError::ReadOnly(self.name.clone()));
        }
        match self.cache.open_or_create(name, create, params) {
            Ok(handle) => {
                if create && handle.is_newly_created() {
                    self.broadcaster().shot_created(name.as_str());
                }
                Ok(handle)
            }
            Err(ShotError::NotFound(_)) if allow_master && !create && !name.is_local() => {
                let master = self.master.lock().clone();
                match master {
                    Some(master) => {
                        master.open_shot(name, false, NewShotParams::default(), false)
                    }
                    None => Err(ShotError::NotFound(name.as_str().to_string())),
                }
            }
            other => other,
        }
    }

    /// Write one trace through a shot handle, maintaining volatile-tier
    /// sync flags around the write.
    ///
    /// # Errors
    ///
    /// `Busy` when another writer holds the tuple's prep flag, `SyncState`
    /// when the prep flag cannot be created (either way the write is not
    /// attempted); otherwise see [`Shot::put_trace`].
    pub fn put_trace(
        &self,
        shot: &Shot,
        tier: Tier,
        header: &SignalHeader,
        payload: &[u8],
        monitor: &dyn ChangeMonitor,
    ) -> ShotResult<()> {
        if tier != Tier::Volatile {
            return shot.put_trace(tier, header, payload, monitor);
        }
        let id = SignalId::new(header.signal)?;
        flags::sync_op_begin(&self.config.sync_root, shot.name(), id, SyncOp::Add)?;
        let result = shot.put_trace(tier, header, payload, monitor);
        flags::sync_op_end(
            &self.config.sync_root,
            shot.name(),
            id,
            SyncOp::Add,
            true,
            result.is_ok(),
        );
        if result.is_ok() {
            self.broadcaster().flag_changed(shot.name().as_str());
        }
        result
    }

    /// Erase a volatile-tier trace, leaving an erase flag for replication.
    ///
    /// # Errors
    ///
    /// `Busy` when another writer holds the tuple's prep flag, `SyncState`
    /// when it cannot be created; otherwise see [`Shot::delete_trace`].
    pub fn delete_trace(
        &self,
        shot: &Shot,
        id: SignalId,
        monitor: &dyn ChangeMonitor,
    ) -> ShotResult<()> {
        flags::sync_op_begin(&self.config.sync_root, shot.name(), id, SyncOp::Erase)?;
        let result = shot.delete_trace(id, monitor);
        flags::sync_op_end(
            &self.config.sync_root,
            shot.name(),
            id,
            SyncOp::Erase,
            true,
            result.is_ok(),
        );
        if result.is_ok() {
            self.broadcaster().flag_changed(shot.name().as_str());
        }
        result
    }

    // ------------------------------------------------------------------
    // Backup/sync API
    // ------------------------------------------------------------------

    /// Reset the permanent lane from a wire-form resume marker.
    ///
    /// # Errors
    ///
    /// `SyncState` on a malformed marker; `LaneStalled` on a sticky error.
    pub fn bup_reset_from(&self, marker_wire: &str) -> ShotResult<()> {
        let marker = ResumeMarker::from_wire(marker_wire)?;
        self.permanent.lock().reset_from(marker)
    }

    /// Rescan the volatile lane's flag tree.
    ///
    /// # Errors
    ///
    /// `LaneStalled` on a sticky error.
    pub fn bup_continue_from_volatile(&self) -> ShotResult<()> {
        self.volatile.lock().continue_from_volatile()
    }

    /// Next outbound item of a lane, or `None` when exhausted.
    ///
    /// # Errors
    ///
    /// `LaneStalled` when the lane carries a sticky error.
    pub fn bup_next_to_send(&self, lane: Lane) -> ShotResult<Option<SendItem>> {
        self.cursor(lane).lock().next_to_send()
    }

    /// Record the replica's confirmation for one delivered item.
    pub fn bup_confirm_delivery(&self, lane: Lane, shot: &ShotName, file: &str, op: SyncOp) {
        self.cursor(lane).lock().confirm_delivery(shot, file, op);
    }

    /// Wire-form resume marker reflecting all confirmed deliveries.
    pub fn bup_capture_marker(&self) -> String {
        self.permanent.lock().capture_marker().to_wire()
    }

    /// Sticky visible error of a lane.
    pub fn bup_visible_error(&self, lane: Lane) -> Option<String> {
        self.cursor(lane).lock().visible_error().map(str::to_string)
    }

    /// Latch a sticky error on a lane (e.g. after a transport failure).
    pub fn set_bup_visible_error(&self, lane: Lane, message: &str) {
        self.cursor(lane).lock().set_visible_error(message);
    }

    /// Clear a lane's sticky error so it can make progress again.
    pub fn reset_bup_error(&self, lane: Lane) {
        self.cursor(lane).lock().reset_error();
    }

    /// Apply one inbound replication portion.
    ///
    /// # Errors
    ///
    /// `ReadOnly` is not raised here: replication is the one writer a
    /// read-only replica accepts. See [`PortionReceiver::accept_portion`]
    /// for the offset and I/O errors.
    pub fn accept_bup_portion(
        &self,
        shot: &ShotName,
        file: &str,
        tier: Tier,
        offset: u64,
        total: u64,
        bytes: &[u8],
    ) -> ShotResult<PortionOutcome> {
        let outcome = self
            .receiver
            .lock()
            .accept_portion(shot, file, tier, offset, total, bytes)?;
        if outcome != PortionOutcome::InProgress {
            self.broadcaster().signals_updated(shot.as_str(), 1);
        }
        Ok(outcome)
    }

    fn cursor(&self, lane: Lane) -> &Mutex<BackupCursor> {
        match lane {
            Lane::Permanent => &self.permanent,
            Lane::Volatile => &self.volatile,
        }
    }

    // ------------------------------------------------------------------
    // Sweep and status
    // ------------------------------------------------------------------

    /// One eviction tick (called by the sweep thread).
    pub fn evict_tick(&self) {
        self.cache.evict(false);
    }

    /// Refresh the operator-visible status line: free space and lane
    /// health. Best-effort; a failed probe reports as unknown.
    pub fn refresh_status(&self) {
        let free_mb = free_space_mb(&self.config.root);
        if let Some(mb) = free_mb {
            if mb < self.config.low_space_warn_mb {
                warn!(db = %self.name, free_mb = mb, "free space below threshold");
            }
        }
        let (perm_pos, perm_total) = self.permanent.lock().progress();
        let vol_err = self.volatile.lock().visible_error().map(str::to_string);
        let mut line = match free_mb {
            Some(mb) => format!("{}: {} MB free", self.name, mb),
            None => format!("{}: free space unknown", self.name),
        };
        line.push_str(&format!(", permanent {perm_pos}/{perm_total}"));
        if let Some(err) = vol_err {
            line.push_str(&format!(", volatile lane stalled: {err}"));
        }
        *self.status.lock() = line;
    }

    /// Current operator-visible status line.
    pub fn status_string(&self) -> String {
        self.status.lock().clone()
    }

    /// True once shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Begin cooperative shutdown: new opens are rejected, idle shots are
    /// detached. Operations already in flight finish normally.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.cache.close_all();
        info!(db = %self.name, "database instance shut down");
    }

    #[cfg(test)]
    pub(crate) fn cache(&self) -> &ShotCache {
        &self.cache
    }
}

fn free_space_mb(path: &Path) -> Option<u64> {
    fs2::available_space(path).ok().map(|b| b / (1024 * 1024))
}
