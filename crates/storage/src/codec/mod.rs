//! Binary trace-file codec
//!
//! Pure data transformation for the two on-disk header formats: the
//! shot-level header (one per shot, `0000.000`) and the per-signal header
//! that prefixes every trace file. No I/O policy lives here; the writer
//! and reader modules own that.
//!
//! All integers are little-endian. Names are fixed-size Pascal-style
//! length-prefixed strings. A leading 4-byte magic distinguishes shot
//! headers from signal headers.

pub mod shot_header;
pub mod signal_header;

pub use shot_header::{ShotHeader, SHOT_HEADER_SIZE, SHOT_MAGIC};
pub use signal_header::{
    SignalHeader, SIGNAL_MAGIC, SIZE64_MARKER, STATUS_NOT_READY, STATUS_READY,
    V1_HEADER_SIZE, V2_HEADER_SIZE,
};

use shotdb_core::{ShotError, ShotResult};

/// Fixed width of a shot-name field: 1 length byte + up to 9 characters.
pub const NAME_FIELD: usize = 10;

/// Encode a name into a fixed-width Pascal-style field, zero padded.
pub(crate) fn encode_name(name: &str, width: usize) -> Vec<u8> {
    let mut field = vec![0u8; width];
    let bytes = name.as_bytes();
    let len = bytes.len().min(width - 1);
    field[0] = len as u8;
    field[1..1 + len].copy_from_slice(&bytes[..len]);
    field
}

/// Decode a fixed-width Pascal-style name field.
///
/// # Errors
///
/// Returns a format error when the length byte exceeds the field or the
/// content is not valid UTF-8.
pub(crate) fn decode_name(field: &[u8]) -> ShotResult<String> {
    let len = field[0] as usize;
    if len >= field.len() {
        return Err(ShotError::Format(format!(
            "name length {len} exceeds {}-byte field",
            field.len()
        )));
    }
    String::from_utf8(field[1..1 + len].to_vec())
        .map_err(|_| ShotError::Format("name field is not UTF-8".to_string()))
}
