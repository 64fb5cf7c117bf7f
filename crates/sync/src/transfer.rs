//! Outbound transfer continuations
//!
//! `next_to_send` hands the transport layer exactly one continuation per
//! call and advances the (task, item) cursor. An add operation carries an
//! open read handle and its remaining size; an erase is a zero-length
//! continuation whose arrival alone tells the replica to erase. Items that
//! vanish between enumeration and pickup are counted strange and skipped.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

use shotdb_core::{ShotName, ShotResult};
use shotdb_storage::layout;

use crate::cursor::{parse_item_signal, BackupCursor, Lane, TaskItem};
use crate::flags::{self, SyncOp};

/// One outbound item: the transport layer pulls bytes until exhausted,
/// then reports the remote's confirmation back to the cursor.
#[derive(Debug)]
pub struct SendItem {
    /// Shot the file belongs to
    pub shot: ShotName,
    /// Data file name on the remote side (`NNNN.000`)
    pub file: String,
    /// Operation the replica must apply
    pub op: SyncOp,
    /// Total bytes this continuation produces (0 for erase)
    pub total: u64,
    reader: Option<File>,
    served: u64,
}

impl SendItem {
    /// True for an erase item (no bytes to pull).
    pub fn is_erase(&self) -> bool {
        self.op == SyncOp::Erase
    }

    /// Bytes still to be pulled.
    pub fn remaining(&self) -> u64 {
        self.total - self.served
    }

    /// Pull the next chunk; returns 0 when exhausted.
    ///
    /// # Errors
    ///
    /// I/O errors from the underlying file.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> ShotResult<usize> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(0);
        };
        let remaining = (self.total - self.served) as usize;
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(remaining);
        let got = reader.read(&mut buf[..want])?;
        let n = if got == 0 {
            // File truncated underneath us; pad so the declared size holds.
            buf[..want].fill(0);
            want
        } else {
            got
        };
        self.served += n as u64;
        Ok(n)
    }
}

impl BackupCursor {
    /// Hand out the next work item, or `None` when the task list is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// `LaneStalled` when the lane carries a sticky error (pre-existing or
    /// latched by this call); I/O errors from the item walk.
    pub fn next_to_send(&mut self) -> ShotResult<Option<SendItem>> {
        self.check_not_stalled()?;
        loop {
            if self.items_loaded && self.item_pos < self.items.len() {
                let item = self.items[self.item_pos].clone();
                self.item_pos += 1;
                match self.open_item(&item) {
                    Ok(send) => {
                        self.last_seen = Some(item.shot.clone());
                        debug!(
                            shot = item.shot.as_str(),
                            file = %item.file,
                            op = ?item.op,
                            size = item.size,
                            "item handed to transport"
                        );
                        return Ok(Some(send));
                    }
                    Err(e) => {
                        warn!(
                            shot = item.shot.as_str(),
                            file = %item.file,
                            error = %e,
                            "enumerated item no longer openable"
                        );
                        self.note_strange(&format!("{}/{}", item.shot, item.file))?;
                        continue;
                    }
                }
            }

            if self.task_pos >= self.tasks.len() {
                return Ok(None);
            }
            let shot = self.tasks[self.task_pos].clone();
            self.task_pos += 1;
            self.items = match self.lane {
                Lane::Permanent => {
                    crate::permanent::load_items(&self.paths.data_root, &shot, &self.marker)?
                }
                Lane::Volatile => self.load_volatile_items(&shot),
            };
            self.item_pos = 0;
            self.items_loaded = true;
        }
    }

    fn open_item(&self, item: &TaskItem) -> ShotResult<SendItem> {
        if item.op == SyncOp::Erase {
            return Ok(SendItem {
                shot: item.shot.clone(),
                file: item.file.clone(),
                op: item.op,
                total: 0,
                reader: None,
                served: 0,
            });
        }
        let root: &Path = match self.lane {
            Lane::Permanent => &self.paths.data_root,
            Lane::Volatile => &self.paths.volatile_root,
        };
        let path = layout::shot_dir(root, &item.shot).join(&item.file);
        let file = File::open(&path)?;
        let total = file.metadata()?.len();

        if self.lane == Lane::Volatile {
            if let Some(id) = parse_item_signal(&item.file) {
                let sync_dir = flags::sync_shot_dir(&self.paths.sync_root, &item.shot);
                flags::mark_syncing(&sync_dir, id, item.op);
            }
        }
        Ok(SendItem {
            shot: item.shot.clone(),
            file: item.file.clone(),
            op: item.op,
            total,
            reader: Some(file),
            served: 0,
        })
    }
}
