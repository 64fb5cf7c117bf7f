//! Backup cursor
//!
//! One `BackupCursor` exists per database instance per lane. It owns the
//! bounded task list (shots), the per-shot item list (files), and the
//! (task, item) position. The cursor is not reentrant and not internally
//! concurrent: the caller's scheduler tick drives it, one item at a time.
//!
//! A lane that accumulates too many inconsistent items latches a sticky
//! visible error and refuses further progress until explicitly reset. This
//! keeps a broken remote or corrupted local state from being hammered on
//! every tick.

use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use shotdb_core::limits::STRANGE_ITEM_LIMIT;
use shotdb_core::{ShotError, ShotName, ShotResult};

use crate::flags::{self, SyncOp};
use crate::marker::ResumeMarker;

/// Replication lane a cursor drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// Permanent archive: enumerate data directories, diff against the
    /// resume marker
    Permanent,
    /// Volatile tier: consult sync flag files instead of diffing
    Volatile,
}

/// Directory roots a cursor works against.
#[derive(Debug, Clone)]
pub struct SyncPaths {
    /// Main (permanent) data tree root
    pub data_root: PathBuf,
    /// Volatile tier data tree root
    pub volatile_root: PathBuf,
    /// Sync-flag tree root (mirrors the shot directory structure)
    pub sync_root: PathBuf,
}

/// One replication work item: a file of a shot, to add or erase remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskItem {
    /// Shot the file belongs to
    pub shot: ShotName,
    /// Data file name (`NNNN.000`)
    pub file: String,
    /// Operation the replica must apply
    pub op: SyncOp,
    /// File size in bytes (0 for erase)
    pub size: u64,
}

/// Replication cursor for one lane of one database instance.
#[derive(Debug)]
pub struct BackupCursor {
    pub(crate) lane: Lane,
    pub(crate) paths: SyncPaths,
    pub(crate) task_cap: usize,
    pub(crate) stall_threshold: Duration,
    pub(crate) tasks: Vec<ShotName>,
    pub(crate) task_pos: usize,
    pub(crate) items: Vec<TaskItem>,
    pub(crate) item_pos: usize,
    pub(crate) items_loaded: bool,
    pub(crate) marker: ResumeMarker,
    pub(crate) captured: ResumeMarker,
    pub(crate) last_seen: Option<ShotName>,
    pub(crate) strange: u32,
    pub(crate) visible_error: Option<String>,
}

impl BackupCursor {
    /// Create an idle cursor for one lane.
    pub fn new(lane: Lane, paths: SyncPaths, task_cap: usize, stall_threshold: Duration) -> Self {
        Self {
            lane,
            paths,
            task_cap,
            stall_threshold,
            tasks: Vec::new(),
            task_pos: 0,
            items: Vec::new(),
            item_pos: 0,
            items_loaded: false,
            marker: ResumeMarker::start(),
            captured: ResumeMarker::start(),
            last_seen: None,
            strange: 0,
            visible_error: None,
        }
    }

    /// Lane this cursor drives.
    pub fn lane(&self) -> Lane {
        self.lane
    }

    /// Rebuild the permanent-lane task list from a resume marker.
    ///
    /// # Errors
    ///
    /// `SyncState` on the wrong lane or a sticky error; I/O errors from the
    /// directory walk.
    pub fn reset_from(&mut self, marker: ResumeMarker) -> ShotResult<()> {
        if self.lane != Lane::Permanent {
            return Err(ShotError::SyncState(
                "reset_from is a permanent-lane operation".to_string(),
            ));
        }
        self.check_not_stalled()?;
        self.tasks = crate::permanent::enumerate_tasks(&self.paths.data_root, &marker, self.task_cap)?;
        self.task_pos = 0;
        self.items.clear();
        self.item_pos = 0;
        self.items_loaded = false;
        self.captured = marker.clone();
        self.marker = marker;
        info!(
            tasks = self.tasks.len(),
            month = %self.marker.month,
            day = self.marker.day,
            "permanent lane reset"
        );
        Ok(())
    }

    /// Rebuild the volatile-lane task list from the sync-flag tree.
    ///
    /// # Errors
    ///
    /// `SyncState` on the wrong lane or a sticky error.
    pub fn continue_from_volatile(&mut self) -> ShotResult<()> {
        if self.lane != Lane::Volatile {
            return Err(ShotError::SyncState(
                "continue_from_volatile is a volatile-lane operation".to_string(),
            ));
        }
        self.check_not_stalled()?;
        self.tasks = crate::volatile::scan_tasks(&self.paths.sync_root);
        self.task_pos = 0;
        self.items.clear();
        self.item_pos = 0;
        self.items_loaded = false;
        info!(tasks = self.tasks.len(), "volatile lane rescanned");
        Ok(())
    }

    /// Record that the replica confirmed receipt of one item.
    ///
    /// On the permanent lane this advances the captured resume marker; on
    /// the volatile lane it clears the item's syncing flag.
    pub fn confirm_delivery(&mut self, shot: &ShotName, file: &str, op: SyncOp) {
        match self.lane {
            Lane::Permanent => {
                let month = shot.month_dir().to_string();
                let day = day_of_month(shot);
                if self.captured.month != month || self.captured.day != day {
                    self.captured = ResumeMarker {
                        month,
                        day,
                        done: Vec::new(),
                    };
                }
                self.captured.mark_done(shot.as_str(), file);
            }
            Lane::Volatile => {
                if let Some(id) = parse_item_signal(file) {
                    let dir = flags::sync_shot_dir(&self.paths.sync_root, shot);
                    flags::confirm_delivery(&dir, id, op);
                }
            }
        }
        debug!(shot = shot.as_str(), file, ?op, "delivery confirmed");
    }

    /// Current resume marker reflecting everything confirmed so far.
    /// Feeding it back into `reset_from` must not cause a resend.
    pub fn capture_marker(&self) -> ResumeMarker {
        self.captured.clone()
    }

    /// Sticky visible error, if the lane has latched one.
    pub fn visible_error(&self) -> Option<&str> {
        self.visible_error.as_deref()
    }

    /// Latch a sticky error; the lane refuses progress until reset.
    pub fn set_visible_error(&mut self, message: impl Into<String>) {
        self.visible_error = Some(message.into());
    }

    /// Clear the sticky error and the strange-item counter.
    pub fn reset_error(&mut self) {
        self.visible_error = None;
        self.strange = 0;
    }

    /// (consumed, total) task positions, for status reporting.
    pub fn progress(&self) -> (usize, usize) {
        (self.task_pos, self.tasks.len())
    }

    /// Shot of the most recently handed-out item.
    pub fn last_seen(&self) -> Option<&ShotName> {
        self.last_seen.as_ref()
    }

    pub(crate) fn check_not_stalled(&self) -> ShotResult<()> {
        match &self.visible_error {
            Some(msg) => Err(ShotError::LaneStalled(msg.clone())),
            None => Ok(()),
        }
    }

    /// Count one inconsistent item; latch the sticky error at the limit.
    ///
    /// # Errors
    ///
    /// `LaneStalled` exactly when the limit is hit by this call.
    pub(crate) fn note_strange(&mut self, context: &str) -> ShotResult<()> {
        self.strange += 1;
        if self.strange >= STRANGE_ITEM_LIMIT {
            let msg = format!("too many inconsistent sync items (last: {context})");
            self.set_visible_error(msg.clone());
            return Err(ShotError::LaneStalled(msg));
        }
        Ok(())
    }
}

/// Day-of-month of a shot (1..=31).
pub(crate) fn day_of_month(shot: &ShotName) -> u32 {
    shot.day()[4..6].parse().unwrap_or(0)
}

/// Signal id from an item file name (`NNNN.000`).
pub(crate) fn parse_item_signal(file: &str) -> Option<shotdb_core::SignalId> {
    let stem = file.split_once('.')?.0;
    let raw: u16 = stem.parse().ok()?;
    shotdb_core::SignalId::new(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths(dir: &TempDir) -> SyncPaths {
        SyncPaths {
            data_root: dir.path().join("data"),
            volatile_root: dir.path().join("vol"),
            sync_root: dir.path().join("sync"),
        }
    }

    #[test]
    fn test_lane_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let mut permanent = BackupCursor::new(
            Lane::Permanent,
            paths(&dir),
            999,
            Duration::from_secs(3600),
        );
        assert!(permanent.continue_from_volatile().is_err());

        let mut volatile = BackupCursor::new(
            Lane::Volatile,
            paths(&dir),
            999,
            Duration::from_secs(3600),
        );
        assert!(volatile.reset_from(ResumeMarker::start()).is_err());
    }

    #[test]
    fn test_sticky_error_blocks_progress() {
        let dir = TempDir::new().unwrap();
        let mut cursor = BackupCursor::new(
            Lane::Permanent,
            paths(&dir),
            999,
            Duration::from_secs(3600),
        );
        cursor.set_visible_error("remote rejected handshake");
        let err = cursor.reset_from(ResumeMarker::start()).unwrap_err();
        assert!(matches!(err, ShotError::LaneStalled(_)));

        cursor.reset_error();
        std::fs::create_dir_all(&cursor.paths.data_root).unwrap();
        cursor.reset_from(ResumeMarker::start()).unwrap();
    }

    #[test]
    fn test_captured_marker_tracks_confirmations() {
        let dir = TempDir::new().unwrap();
        let mut cursor = BackupCursor::new(
            Lane::Permanent,
            paths(&dir),
            999,
            Duration::from_secs(3600),
        );
        let day15 = ShotName::parse("240115E01").unwrap();
        let day16 = ShotName::parse("240116E01").unwrap();

        cursor.confirm_delivery(&day15, "0012.000", SyncOp::Add);
        cursor.confirm_delivery(&day15, "0013.000", SyncOp::Add);
        let marker = cursor.capture_marker();
        assert_eq!(marker.month, "2401");
        assert_eq!(marker.day, 15);
        assert_eq!(marker.done.len(), 2);

        // Crossing a day boundary resets the done list.
        cursor.confirm_delivery(&day16, "0001.000", SyncOp::Add);
        let marker = cursor.capture_marker();
        assert_eq!(marker.day, 16);
        assert_eq!(marker.done, vec!["240116E01/0001.000"]);
    }

    #[test]
    fn test_strange_counter_latches_at_limit() {
        let dir = TempDir::new().unwrap();
        let mut cursor = BackupCursor::new(
            Lane::Volatile,
            paths(&dir),
            999,
            Duration::from_secs(3600),
        );
        for _ in 0..STRANGE_ITEM_LIMIT - 1 {
            cursor.note_strange("flag without data").unwrap();
        }
        let err = cursor.note_strange("flag without data").unwrap_err();
        assert!(matches!(err, ShotError::LaneStalled(_)));
        assert!(cursor.visible_error().is_some());
    }

    #[test]
    fn test_day_of_month() {
        let shot = ShotName::parse("240105A").unwrap();
        assert_eq!(day_of_month(&shot), 5);
    }

    #[test]
    fn test_parse_item_signal() {
        assert_eq!(parse_item_signal("0012.000").map(|s| s.index()), Some(12));
        assert_eq!(parse_item_signal("0000.000"), None);
        assert_eq!(parse_item_signal("junk"), None);
    }
}
