//! Permanent-data lane enumeration
//!
//! The permanent lane walks the data tree directly: month shards in
//! ascending order, shots within each month in shot order (date, then
//! suffix length, then lexicographic). The resume marker bounds the walk
//! from below; the task cap bounds it from above, but enumeration only
//! stops at a day boundary once the cap is exceeded so a day is never
//! half-replicated.

use std::path::Path;
use tracing::debug;

use shotdb_core::{ShotName, ShotResult};
use shotdb_storage::layout;

use crate::cursor::{day_of_month, TaskItem};
use crate::flags::SyncOp;
use crate::marker::ResumeMarker;

/// Build the bounded, ordered shot task list for one reset.
pub(crate) fn enumerate_tasks(
    data_root: &Path,
    marker: &ResumeMarker,
    cap: usize,
) -> ShotResult<Vec<ShotName>> {
    let mut months: Vec<String> = Vec::new();
    if data_root.exists() {
        for entry in std::fs::read_dir(data_root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if name.len() != 4 || !name.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            if name.as_str() >= marker.month.as_str() {
                months.push(name);
            }
        }
    }
    months.sort();

    let mut tasks: Vec<ShotName> = Vec::new();
    'months: for month in &months {
        let mut shots: Vec<ShotName> = Vec::new();
        for entry in std::fs::read_dir(data_root.join(month))? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let Ok(shot) = ShotName::parse(&name) else {
                // Foreign directories in the tree are ignored, not fatal.
                continue;
            };
            if month == &marker.month && day_of_month(&shot) < marker.day {
                continue;
            }
            shots.push(shot);
        }
        shots.sort();

        for shot in shots {
            if tasks.len() >= cap {
                // Over the cap: stop, but only once the day changes.
                let same_day = tasks.last().is_some_and(|last| last.day() == shot.day());
                if !same_day {
                    break 'months;
                }
            }
            tasks.push(shot);
        }
    }
    debug!(tasks = tasks.len(), cap, "permanent task list built");
    Ok(tasks)
}

/// Files of one shot not yet acknowledged by the resume marker.
pub(crate) fn load_items(
    data_root: &Path,
    shot: &ShotName,
    marker: &ResumeMarker,
) -> ShotResult<Vec<TaskItem>> {
    let dir = layout::shot_dir(data_root, shot);
    let mut items = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let file = entry.file_name().to_string_lossy().to_string();
        let is_data = file
            .split_once('.')
            .is_some_and(|(_, ext)| ext == layout::DATA_EXT);
        if !is_data || marker.is_done(shot.as_str(), &file) {
            continue;
        }
        items.push(TaskItem {
            shot: shot.clone(),
            file,
            op: SyncOp::Add,
            size: entry.metadata()?.len(),
        });
    }
    items.sort_by(|a, b| a.file.cmp(&b.file));
    Ok(items)
}
