//! In-place density edits
//!
//! A density update rewrites only the payload region of an existing trace,
//! preserving the header's recorded offsets and declared size. Before the
//! first edit a backup copy of the current file is taken (`.001`); the
//! status flag is flipped not-ready → ready around the rewrite so a crash
//! mid-edit is detectable. Traces tagged edit-locked reject the edit.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

use byteorder::{LittleEndian, WriteBytesExt};
use shotdb_core::{ShotError, ShotName, ShotResult, SignalId};

use crate::codec::signal_header::{SignalHeader, STATUS_NOT_READY, STATUS_READY};
use crate::layout::{self, DATA_EXT, DENSITY_BACKUP_EXT};

/// Rewrite the payload region of a stored trace in place.
///
/// # Errors
///
/// - `SignalNotFound` when no data file exists.
/// - `EditLocked` when the header carries the edit-lock tag.
/// - `Format` when the new payload length differs from the declared size.
pub(crate) fn update_density(
    dir: &Path,
    shot: &ShotName,
    id: SignalId,
    new_payload: &[u8],
) -> ShotResult<()> {
    let target = layout::signal_file(dir, id, DATA_EXT);
    if !target.exists() {
        return Err(ShotError::SignalNotFound {
            shot: shot.as_str().to_string(),
            signal: id.index(),
        });
    }

    let mut file = OpenOptions::new().read(true).write(true).open(&target)?;
    let header = SignalHeader::read_from(&mut file)?;
    header.validate_identity(shot, id)?;

    if header.edit_locked {
        return Err(ShotError::EditLocked {
            shot: shot.as_str().to_string(),
            signal: id.index(),
        });
    }
    if new_payload.len() as u64 != header.payload_size {
        return Err(ShotError::Format(format!(
            "density payload is {} bytes but the trace declares {}",
            new_payload.len(),
            header.payload_size
        )));
    }

    // First edit takes a backup of the pristine file.
    let backup = layout::signal_file(dir, id, DENSITY_BACKUP_EXT);
    if !backup.exists() {
        std::fs::copy(&target, &backup)?;
    }

    // Not-ready around the payload rewrite; offsets and size untouched.
    file.seek(SeekFrom::Start(header.status_offset()))?;
    file.write_all(&[STATUS_NOT_READY])?;
    file.sync_data()?;

    file.seek(SeekFrom::Start(header.header_len() as u64))?;
    file.write_all(new_payload)?;

    file.seek(SeekFrom::Start(header.status_offset()))?;
    file.write_all(&[STATUS_READY])?;
    file.seek(SeekFrom::Start(header.update_count_offset()))?;
    file.write_u32::<LittleEndian>(header.update_count.wrapping_add(1))?;
    file.sync_all()?;

    debug!(
        shot = shot.as_str(),
        signal = id.index(),
        "density updated in place"
    );
    Ok(())
}
