//! Inbound portion receiver
//!
//! The replica side of a transfer. Incoming bytes for one (shot, file)
//! arrive in sequential portions; each portion's offset must continue
//! exactly where the previous one stopped or the portion is rejected
//! without touching the partial temp file. On reaching the declared full
//! size the file is committed with the same rotate-then-rename protocol
//! the local writer uses. A zero-length volatile-tier portion means
//! "erase": the existing file is renamed to the erased-marker extension
//! and optionally deleted afterward.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use shotdb_core::{ShotError, ShotName, ShotResult, Tier};
use shotdb_storage::layout::{self, ERASED_EXT, PREV_EXT, TEMP_EXT};

/// Result of feeding one portion to the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortionOutcome {
    /// Bytes appended; more portions expected
    InProgress,
    /// Declared size reached; file committed into place
    Committed,
    /// Zero-length volatile portion applied as an erase
    Erased,
}

#[derive(Debug)]
struct ActivePortion {
    temp: PathBuf,
    written: u64,
    total: u64,
}

/// Sequential portion writer for incoming replication data.
#[derive(Debug)]
pub struct PortionReceiver {
    data_root: PathBuf,
    volatile_root: PathBuf,
    remove_erased: bool,
    active: HashMap<(String, String), ActivePortion>,
}

impl PortionReceiver {
    /// Receiver writing into the given tier roots.
    ///
    /// With `remove_erased` the erased-marker file left by an erase is
    /// deleted immediately instead of being kept for diagnostics.
    pub fn new(data_root: &Path, volatile_root: &Path, remove_erased: bool) -> Self {
        Self {
            data_root: data_root.to_path_buf(),
            volatile_root: volatile_root.to_path_buf(),
            remove_erased,
            active: HashMap::new(),
        }
    }

    /// Apply one incoming portion.
    ///
    /// # Errors
    ///
    /// `OffsetMismatch` when the portion does not continue the previous
    /// write (the partial temp file is left untouched); I/O errors from
    /// file creation, append, or the commit rename.
    pub fn accept_portion(
        &mut self,
        shot: &ShotName,
        file: &str,
        tier: Tier,
        offset: u64,
        total: u64,
        bytes: &[u8],
    ) -> ShotResult<PortionOutcome> {
        let root = match tier {
            Tier::Main => &self.data_root,
            Tier::Volatile => &self.volatile_root,
        };
        let dir = layout::shot_dir(root, shot);

        if tier == Tier::Volatile && total == 0 {
            return self.apply_erase(&dir, shot, file);
        }

        let key = (shot.as_str().to_string(), file.to_string());
        if !self.active.contains_key(&key) {
            if offset != 0 {
                return Err(ShotError::OffsetMismatch {
                    expected: 0,
                    given: offset,
                });
            }
            std::fs::create_dir_all(&dir)?;
            let temp_name = layout::with_extension(file, TEMP_EXT).ok_or_else(|| {
                ShotError::Format(format!("portion file name not stem.ext: {file:?}"))
            })?;
            let temp = dir.join(temp_name);
            File::create(&temp)?;
            self.active.insert(
                key.clone(),
                ActivePortion {
                    temp,
                    written: 0,
                    total,
                },
            );
        }

        let portion = self
            .active
            .get_mut(&key)
            .ok_or_else(|| ShotError::SyncState("portion state lost".to_string()))?;
        if offset != portion.written {
            return Err(ShotError::OffsetMismatch {
                expected: portion.written,
                given: offset,
            });
        }

        let mut handle = OpenOptions::new().append(true).open(&portion.temp)?;
        handle.write_all(bytes)?;
        portion.written += bytes.len() as u64;

        if portion.written < portion.total {
            return Ok(PortionOutcome::InProgress);
        }
        handle.sync_all()?;
        drop(handle);

        // Declared size reached: rotate any previous copy aside, rename the
        // temp into place, make the rename durable.
        let temp = portion.temp.clone();
        self.active.remove(&key);
        let target = dir.join(file);
        if target.exists() {
            if let Some(prev_name) = layout::with_extension(file, PREV_EXT) {
                let prev = dir.join(prev_name);
                if let Err(e) = std::fs::remove_file(&prev) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %prev.display(), error = %e, "stale backup removal failed");
                    }
                }
                std::fs::rename(&target, &prev)?;
            }
        }
        std::fs::rename(&temp, &target)?;
        if let Ok(dir_handle) = File::open(&dir) {
            let _ = dir_handle.sync_all();
        }
        debug!(shot = shot.as_str(), file, total, "incoming file committed");
        Ok(PortionOutcome::Committed)
    }

    fn apply_erase(&self, dir: &Path, shot: &ShotName, file: &str) -> ShotResult<PortionOutcome> {
        let target = dir.join(file);
        if !target.exists() {
            // Already absent; the erase is a no-op, not an error.
            debug!(shot = shot.as_str(), file, "erase of absent file");
            return Ok(PortionOutcome::Erased);
        }
        let erased_name = layout::with_extension(file, ERASED_EXT).ok_or_else(|| {
            ShotError::Format(format!("portion file name not stem.ext: {file:?}"))
        })?;
        let erased = dir.join(erased_name);
        if let Err(e) = std::fs::remove_file(&erased) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %erased.display(), error = %e, "stale erased marker removal failed");
            }
        }
        std::fs::rename(&target, &erased)?;
        if self.remove_erased {
            std::fs::remove_file(&erased)?;
        }
        debug!(shot = shot.as_str(), file, "incoming erase applied");
        Ok(PortionOutcome::Erased)
    }

    /// Drop partial state for files whose transfer was abandoned. The temp
    /// files themselves are left on disk for diagnostics.
    pub fn abandon(&mut self, shot: &ShotName) {
        self.active.retain(|(s, _), _| s != shot.as_str());
    }
}
