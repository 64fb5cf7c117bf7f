//! Volatile-tier lane enumeration
//!
//! The volatile lane never diffs file lists. It walks the sync-flag tree
//! (which mirrors the shot directory structure) and derives work items from
//! the flags alone: an item is sendable when its flag is `done` or
//! `syncing` and the underlying data's presence matches the operation —
//! present for add, absent for erase. Stale flags are opportunistically
//! cleaned during the walk; flags that contradict the data are counted as
//! strange rather than acted on.

use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

use shotdb_core::{ShotName, SignalId};
use shotdb_storage::layout;

use crate::cursor::{BackupCursor, TaskItem};
use crate::flags::{self, SyncOp};

/// Shots with any sync flag present, in ascending shot order.
pub(crate) fn scan_tasks(sync_root: &Path) -> Vec<ShotName> {
    let mut tasks = Vec::new();
    let Ok(months) = std::fs::read_dir(sync_root) else {
        return tasks;
    };
    for month in months.flatten() {
        let Ok(shots) = std::fs::read_dir(month.path()) else {
            continue;
        };
        for shot_entry in shots.flatten() {
            let name = shot_entry.file_name().to_string_lossy().to_string();
            let Ok(shot) = ShotName::parse(&name) else {
                continue;
            };
            if dir_has_flags(&shot_entry.path()) {
                tasks.push(shot);
            }
        }
    }
    tasks.sort();
    tasks
}

fn dir_has_flags(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|e| {
        e.file_name()
            .to_string_lossy()
            .rsplit_once('.')
            .and_then(|(_, ext)| flags::parse_flag_ext(ext))
            .is_some()
    })
}

/// Distinct (signal, operation) tuples with any flag in a sync shot dir.
fn flagged_tuples(sync_shot_dir: &Path) -> BTreeSet<(SignalId, bool)> {
    // bool = op is erase; BTreeSet keeps item order deterministic.
    let mut tuples = BTreeSet::new();
    let Ok(entries) = std::fs::read_dir(sync_shot_dir) else {
        return tuples;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let Some((stem, ext)) = name.split_once('.') else {
            continue;
        };
        let Some((op, _)) = flags::parse_flag_ext(ext) else {
            continue;
        };
        let Ok(raw) = stem.parse::<u16>() else {
            continue;
        };
        let Ok(id) = SignalId::new(raw) else {
            continue;
        };
        tuples.insert((id, op == SyncOp::Erase));
    }
    tuples
}

impl BackupCursor {
    /// Eligible work items of one volatile-lane shot, after flag cleanup.
    pub(crate) fn load_volatile_items(&mut self, shot: &ShotName) -> Vec<TaskItem> {
        let sync_dir = flags::sync_shot_dir(&self.paths.sync_root, shot);
        let data_dir = layout::shot_dir(&self.paths.volatile_root, shot);

        let mut items = Vec::new();
        for (id, is_erase) in flagged_tuples(&sync_dir) {
            let op = if is_erase { SyncOp::Erase } else { SyncOp::Add };
            let data_path = layout::signal_file(&data_dir, id, layout::DATA_EXT);
            let data_matches = match op {
                SyncOp::Add => data_path.exists(),
                SyncOp::Erase => !data_path.exists(),
            };

            flags::clean_flags(&sync_dir, id, op, self.stall_threshold, data_matches);

            if flags::eligible(&sync_dir, id, op, data_matches) {
                let size = match op {
                    SyncOp::Add => std::fs::metadata(&data_path).map(|m| m.len()).unwrap_or(0),
                    SyncOp::Erase => 0,
                };
                items.push(TaskItem {
                    shot: shot.clone(),
                    file: layout::signal_file_name(id, layout::DATA_EXT),
                    op,
                    size,
                });
            } else if !data_matches
                && matches!(
                    flags::probe(&sync_dir, id, op),
                    Some(flags::FlagState::Done) | Some(flags::FlagState::Syncing)
                )
            {
                // Flag claims the operation finished but the data disagrees.
                let _ = self.note_strange(&format!(
                    "signal {id} of shot {shot}: {op:?} flag contradicts data"
                ));
            }
        }
        debug!(shot = shot.as_str(), items = items.len(), "volatile items loaded");
        items
    }
}
