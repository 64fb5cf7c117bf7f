//! Atomic signal writer
//!
//! Uses the write-flip-rename pattern for crash-safe trace creation:
//!
//! 1. Write header (status=not-ready) and payload to a `.900` temp file.
//! 2. Flip the status to ready and bump the update counter in place.
//! 3. fsync the temp file.
//! 4. Rotate any previous `.000` to `.002`, then rename the temp into place.
//! 5. fsync the parent directory.
//!
//! If the final rename fails after the previous file was displaced, the
//! writer attempts to put it back; when that also fails the caller gets a
//! distinct data-loss error so the signal's stored bit is cleared rather
//! than silently serving stale data. Failed temp files are left on disk
//! for diagnostics.

use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, warn};

use shotdb_core::{ShotError, ShotName, ShotResult, SignalId};

use crate::codec::signal_header::{SignalHeader, STATUS_READY};
use crate::layout::{self, DATA_EXT, PREV_EXT, TEMP_EXT};

/// Write one signal trace into a shot directory.
///
/// The header must already be normalized (identity and declared size
/// validated by the caller). `overwrite` enables the in-place replacement
/// semantics of the volatile tier: an existing target is rotated to the
/// backup extension first.
///
/// # Errors
///
/// I/O errors surface as `ShotError::Io`; a failed rename after the
/// previous file was displaced and could not be restored surfaces as
/// `ShotError::DataLoss`.
pub(crate) fn write_trace(
    dir: &Path,
    shot: &ShotName,
    id: SignalId,
    header: &SignalHeader,
    payload: &[u8],
    overwrite: bool,
) -> ShotResult<()> {
    let temp_path = layout::signal_file(dir, id, TEMP_EXT);
    let target = layout::signal_file(dir, id, DATA_EXT);

    // Step 1: header (not-ready) + payload into the temp file.
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&temp_path)?;
    file.write_all(&header.to_bytes())?;
    file.write_all(payload)?;

    // Step 2: flip status to ready, bump the update counter in place.
    file.seek(SeekFrom::Start(header.status_offset()))?;
    file.write_all(&[STATUS_READY])?;
    file.seek(SeekFrom::Start(header.update_count_offset()))?;
    file.write_u32::<LittleEndian>(header.update_count.wrapping_add(1))?;

    // Step 3: fsync before the rename makes the data visible.
    file.sync_all()?;
    drop(file);

    // Step 4: rotate the previous file aside, rename the temp into place.
    let mut displaced = false;
    if overwrite && target.exists() {
        let prev = layout::signal_file(dir, id, PREV_EXT);
        remove_if_present(&prev);
        std::fs::rename(&target, &prev)?;
        displaced = true;
    }
    if let Err(rename_err) = std::fs::rename(&temp_path, &target) {
        if displaced {
            let prev = layout::signal_file(dir, id, PREV_EXT);
            if let Err(restore_err) = std::fs::rename(&prev, &target) {
                warn!(
                    shot = shot.as_str(),
                    signal = id.index(),
                    %rename_err,
                    %restore_err,
                    "previous trace displaced and restore failed"
                );
                return Err(ShotError::DataLoss {
                    shot: shot.as_str().to_string(),
                    signal: id.index(),
                });
            }
        }
        return Err(ShotError::Io(rename_err));
    }

    // Step 5: fsync the parent directory so the rename is durable.
    if let Ok(dir_handle) = File::open(dir) {
        let _ = dir_handle.sync_all();
    }

    debug!(
        shot = shot.as_str(),
        signal = id.index(),
        bytes = payload.len(),
        overwrite,
        "trace committed"
    );
    Ok(())
}

/// Remove a file, ignoring absence.
pub(crate) fn remove_if_present(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "could not remove stale file");
        }
    }
}
