//! Per-signal trace-file header
//!
//! Every signal file starts with a 4-byte magic followed by a
//! version-dependent header, then the payload bytes. Two schema versions
//! exist in the field:
//!
//! - **V1 (legacy)**: 32-bit payload size, 36 bytes total.
//! - **V2**: the 32-bit size slot carries the `SIZE64_MARKER` sentinel and
//!   a 64-bit payload size follows, 48 bytes total.
//!
//! The codec detects and parses both; new files are always written V2.
//!
//! ```text
//! V1                                  V2
//! +--------------------+ 0            +--------------------+ 0
//! | magic "TRCE"       |              | magic "TRCE"       |
//! +--------------------+ 4            +--------------------+ 4
//! | payload size u32   |              | SIZE64_MARKER u32  |
//! +--------------------+ 8            +--------------------+ 8
//! | shot name (1+9)    |              | payload size u64   |
//! +--------------------+ 18           +--------------------+ 16
//! | status u8          |              | shot name (1+9)    |
//! | edit_lock u8       |              +--------------------+ 26
//! +--------------------+ 20           | status u8          |
//! | update count u32   |              | edit_lock u8       |
//! +--------------------+ 24           +--------------------+ 28
//! | created_at u64     |              | update count u32   |
//! +--------------------+ 32           +--------------------+ 32
//! | signal id u16      |              | created_at u64     |
//! | reserved [2]       |              +--------------------+ 40
//! +--------------------+ 36           | signal id u16      |
//!                                     | reserved [6]       |
//!                                     +--------------------+ 48
//! ```

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::io::Read;

use shotdb_core::{ShotError, ShotName, ShotResult, SignalId};

use super::{decode_name, encode_name, NAME_FIELD};

/// Magic bytes of a signal trace file: "TRCE"
pub const SIGNAL_MAGIC: [u8; 4] = *b"TRCE";

/// Sentinel in the 32-bit size slot marking the 64-bit-capable layout
pub const SIZE64_MARKER: u32 = 0xFFFF_FFFF;

/// Legacy header size in bytes
pub const V1_HEADER_SIZE: usize = 36;

/// 64-bit-capable header size in bytes
pub const V2_HEADER_SIZE: usize = 48;

/// Status flag: payload is complete and readable
pub const STATUS_READY: u8 = 0;

/// Status flag: write in progress, payload must not be served
pub const STATUS_NOT_READY: u8 = 1;

/// Decoded signal-file header, independent of schema version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalHeader {
    /// Owning shot name
    pub shot: String,
    /// Signal id within the shot
    pub signal: u16,
    /// Declared payload size in bytes
    pub payload_size: u64,
    /// `STATUS_READY` or `STATUS_NOT_READY`
    pub status: u8,
    /// Incremented on every committed rewrite
    pub update_count: u32,
    /// Creation timestamp, seconds since the Unix epoch
    pub created_at: u64,
    /// Density edits are rejected while set
    pub edit_locked: bool,
    /// True for the 64-bit-capable layout
    pub wide: bool,
}

impl SignalHeader {
    /// Create a fresh V2 header for a new write.
    pub fn new(shot: &ShotName, signal: SignalId, payload_size: u64, created_at: u64) -> Self {
        Self {
            shot: shot.as_str().to_string(),
            signal: signal.index(),
            payload_size,
            status: STATUS_NOT_READY,
            update_count: 0,
            created_at,
            edit_locked: false,
            wide: true,
        }
    }

    /// Encoded header length for this schema version.
    pub fn header_len(&self) -> usize {
        if self.wide {
            V2_HEADER_SIZE
        } else {
            V1_HEADER_SIZE
        }
    }

    /// Byte offset of the status flag (the edit-lock byte follows it).
    pub fn status_offset(&self) -> u64 {
        if self.wide {
            26
        } else {
            18
        }
    }

    /// Byte offset of the update counter.
    pub fn update_count_offset(&self) -> u64 {
        if self.wide {
            28
        } else {
            20
        }
    }

    /// Serialize to the on-disk layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.header_len());
        buf.extend_from_slice(&SIGNAL_MAGIC);
        if self.wide {
            buf.write_u32::<LittleEndian>(SIZE64_MARKER).unwrap();
            buf.write_u64::<LittleEndian>(self.payload_size).unwrap();
        } else {
            buf.write_u32::<LittleEndian>(self.payload_size as u32)
                .unwrap();
        }
        buf.extend_from_slice(&encode_name(&self.shot, NAME_FIELD));
        buf.push(self.status);
        buf.push(self.edit_locked as u8);
        buf.write_u32::<LittleEndian>(self.update_count).unwrap();
        buf.write_u64::<LittleEndian>(self.created_at).unwrap();
        buf.write_u16::<LittleEndian>(self.signal).unwrap();
        buf.resize(self.header_len(), 0);
        buf
    }

    /// Read and decode a header from the start of a trace file.
    ///
    /// Detects the schema version from the 32-bit size slot.
    ///
    /// # Errors
    ///
    /// Returns a format error on bad magic or a truncated header, and an
    /// I/O error if reading fails.
    pub fn read_from<R: Read>(reader: &mut R) -> ShotResult<Self> {
        let mut head = [0u8; 8];
        reader
            .read_exact(&mut head)
            .map_err(|e| map_truncated(e, "signal header"))?;
        if head[0..4] != SIGNAL_MAGIC {
            return Err(ShotError::Format(format!(
                "bad signal magic {:02x?}",
                &head[0..4]
            )));
        }
        let size32 = LittleEndian::read_u32(&head[4..8]);
        let wide = size32 == SIZE64_MARKER;
        let rest_len = if wide {
            V2_HEADER_SIZE - 8
        } else {
            V1_HEADER_SIZE - 8
        };
        let mut rest = vec![0u8; rest_len];
        reader
            .read_exact(&mut rest)
            .map_err(|e| map_truncated(e, "signal header"))?;

        let (payload_size, body) = if wide {
            (LittleEndian::read_u64(&rest[0..8]), &rest[8..])
        } else {
            (size32 as u64, &rest[..])
        };
        let shot = decode_name(&body[0..NAME_FIELD])?;
        let status = body[NAME_FIELD];
        let edit_locked = body[NAME_FIELD + 1] != 0;
        let update_count = LittleEndian::read_u32(&body[NAME_FIELD + 2..NAME_FIELD + 6]);
        let created_at = LittleEndian::read_u64(&body[NAME_FIELD + 6..NAME_FIELD + 14]);
        let signal = LittleEndian::read_u16(&body[NAME_FIELD + 14..NAME_FIELD + 16]);

        Ok(Self {
            shot,
            signal,
            payload_size,
            status,
            update_count,
            created_at,
            edit_locked,
            wide,
        })
    }

    /// Check the header belongs to the expected shot and signal.
    ///
    /// # Errors
    ///
    /// Returns a format error naming the mismatching field.
    pub fn validate_identity(&self, shot: &ShotName, signal: SignalId) -> ShotResult<()> {
        if self.shot != shot.as_str() {
            return Err(ShotError::Format(format!(
                "header names shot {} but {} was expected",
                self.shot, shot
            )));
        }
        if self.signal != signal.index() {
            return Err(ShotError::Format(format!(
                "header names signal {} but {} was expected",
                self.signal,
                signal.index()
            )));
        }
        Ok(())
    }
}

fn map_truncated(e: std::io::Error, what: &str) -> ShotError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        ShotError::Format(format!("{what} too small"))
    } else {
        ShotError::Io(e)
    }
}
