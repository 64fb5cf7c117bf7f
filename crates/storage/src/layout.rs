//! On-disk layout
//!
//! The directory and file naming here is bit-compatible with existing
//! deployments and must not change:
//!
//! ```text
//! root/YYMM/YYMMDDxx/0000.000   shot-level header file
//! root/YYMM/YYMMDDxx/NNNN.000   signal trace, NNNN = zero-padded signal id
//! ```
//!
//! Extensions encode file roles: `.000` current data, `.002` previous
//! (backup) copy, `.001` density-edit backup, `.900` write-in-progress
//! temp, `.010` embedded config archive, `.003` erased marker. Sync flag
//! extensions (`.800`–`.807`) live in a mirrored tree managed by the sync
//! crate.

use std::path::{Path, PathBuf};

use shotdb_core::{ShotName, SignalId};

/// Current data file extension
pub const DATA_EXT: &str = "000";
/// Density-edit backup extension
pub const DENSITY_BACKUP_EXT: &str = "001";
/// Previous/backup copy extension (rotation target of overwrites)
pub const PREV_EXT: &str = "002";
/// Erased-marker extension (volatile erase keeps the displaced file)
pub const ERASED_EXT: &str = "003";
/// Embedded config archive extension
pub const CONFIG_BLOB_EXT: &str = "010";
/// Write-in-progress temp extension
pub const TEMP_EXT: &str = "900";

/// File stem of the shot-level header file
pub const SHOT_HEADER_STEM: &str = "0000";

/// Month-shard directory (`root/YYMM`) for a shot.
pub fn month_dir(root: &Path, shot: &ShotName) -> PathBuf {
    root.join(shot.month_dir())
}

/// Shot directory (`root/YYMM/YYMMDDxx`).
pub fn shot_dir(root: &Path, shot: &ShotName) -> PathBuf {
    month_dir(root, shot).join(shot.as_str())
}

/// Signal file name (`NNNN.ext`).
pub fn signal_file_name(id: SignalId, ext: &str) -> String {
    format!("{id}.{ext}")
}

/// Path of a signal file with the given extension inside a shot directory.
pub fn signal_file(dir: &Path, id: SignalId, ext: &str) -> PathBuf {
    dir.join(signal_file_name(id, ext))
}

/// Path of the shot-level header file inside a shot directory.
pub fn shot_header_file(dir: &Path) -> PathBuf {
    dir.join(format!("{SHOT_HEADER_STEM}.{DATA_EXT}"))
}

/// Swap the extension of a data file name (`NNNN.000` → `NNNN.ext`).
///
/// Returns `None` when the name does not look like `stem.ext`.
pub fn with_extension(file_name: &str, ext: &str) -> Option<String> {
    let stem = file_name.split_once('.')?.0;
    Some(format!("{stem}.{ext}"))
}

/// Parse a data file name (`NNNN.000`) back into a signal id.
///
/// The shot-header stem `0000` and non-data extensions yield `None`.
pub fn parse_signal_file(file_name: &str) -> Option<SignalId> {
    let (stem, ext) = file_name.split_once('.')?;
    if ext != DATA_EXT || stem.len() != 4 {
        return None;
    }
    let raw: u16 = stem.parse().ok()?;
    SignalId::new(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(n: u16) -> SignalId {
        SignalId::new(n).unwrap()
    }

    #[test]
    fn test_shot_dir_sharding() {
        let shot = ShotName::parse("240115E01").unwrap();
        let dir = shot_dir(Path::new("/data"), &shot);
        assert_eq!(dir, PathBuf::from("/data/2401/240115E01"));
    }

    #[test]
    fn test_signal_file_names() {
        assert_eq!(signal_file_name(sid(12), DATA_EXT), "0012.000");
        assert_eq!(signal_file_name(sid(9999), TEMP_EXT), "9999.900");
    }

    #[test]
    fn test_parse_signal_file() {
        assert_eq!(parse_signal_file("0012.000"), Some(sid(12)));
        assert_eq!(parse_signal_file("0000.000"), None, "shot header is not a signal");
        assert_eq!(parse_signal_file("0012.900"), None, "temp files are skipped");
        assert_eq!(parse_signal_file("junk"), None);
    }

    #[test]
    fn test_with_extension() {
        assert_eq!(with_extension("0012.000", PREV_EXT).as_deref(), Some("0012.002"));
        assert_eq!(with_extension("0012", PREV_EXT), None);
    }
}
