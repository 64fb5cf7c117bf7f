//! Shot-level header (`0000.000`)
//!
//! Created once per shot, this file is the zero-signal marker that makes a
//! shot directory valid. It carries program metadata and may be followed by
//! an embedded configuration blob of `config_len` bytes.
//!
//! ```text
//! +--------------------+ 0
//! | magic "SHOT"       |
//! +--------------------+ 4
//! | format version u32 |
//! +--------------------+ 8
//! | shot name (1+9)    |
//! +--------------------+ 18
//! | created_at u64     |
//! +--------------------+ 26
//! | program (1+31)     |
//! +--------------------+ 58
//! | config_len u32     |
//! +--------------------+ 62
//! | reserved [2]       |
//! +--------------------+ 64
//! | config blob        | config_len bytes
//! +--------------------+
//! ```

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::io::Read;

use shotdb_core::{ShotError, ShotName, ShotResult};

use super::{decode_name, encode_name, NAME_FIELD};

/// Magic bytes of a shot header file: "SHOT"
pub const SHOT_MAGIC: [u8; 4] = *b"SHOT";

/// Shot header format version
pub const SHOT_FORMAT_VERSION: u32 = 1;

/// Fixed shot header size in bytes (config blob follows)
pub const SHOT_HEADER_SIZE: usize = 64;

/// Fixed width of the program-name field: 1 length byte + up to 31 chars
const PROGRAM_FIELD: usize = 32;

/// Decoded shot-level header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShotHeader {
    /// Shot this header belongs to
    pub shot: String,
    /// Creation timestamp, seconds since the Unix epoch
    pub created_at: u64,
    /// Acquisition program metadata (up to 31 characters)
    pub program: String,
    /// Length of the embedded config blob following the header
    pub config_len: u32,
}

impl ShotHeader {
    /// Create a header for a newly materialized shot.
    pub fn new(shot: &ShotName, created_at: u64, program: &str) -> Self {
        Self {
            shot: shot.as_str().to_string(),
            created_at,
            program: program.to_string(),
            config_len: 0,
        }
    }

    /// Serialize to the fixed 64-byte on-disk layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SHOT_HEADER_SIZE);
        buf.extend_from_slice(&SHOT_MAGIC);
        buf.write_u32::<LittleEndian>(SHOT_FORMAT_VERSION).unwrap();
        buf.extend_from_slice(&encode_name(&self.shot, NAME_FIELD));
        buf.write_u64::<LittleEndian>(self.created_at).unwrap();
        buf.extend_from_slice(&encode_name(&self.program, PROGRAM_FIELD));
        buf.write_u32::<LittleEndian>(self.config_len).unwrap();
        buf.resize(SHOT_HEADER_SIZE, 0);
        buf
    }

    /// Read and decode a shot header.
    ///
    /// # Errors
    ///
    /// Returns a format error on bad magic, unsupported version, or a
    /// truncated header.
    pub fn read_from<R: Read>(reader: &mut R) -> ShotResult<Self> {
        let mut buf = [0u8; SHOT_HEADER_SIZE];
        reader.read_exact(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ShotError::Format("shot header too small".to_string())
            } else {
                ShotError::Io(e)
            }
        })?;
        if buf[0..4] != SHOT_MAGIC {
            return Err(ShotError::Format(format!(
                "bad shot magic {:02x?}",
                &buf[0..4]
            )));
        }
        let version = LittleEndian::read_u32(&buf[4..8]);
        if version > SHOT_FORMAT_VERSION {
            return Err(ShotError::Format(format!(
                "unsupported shot header version {version}"
            )));
        }
        let shot = decode_name(&buf[8..8 + NAME_FIELD])?;
        let created_at = LittleEndian::read_u64(&buf[18..26]);
        let program = decode_name(&buf[26..26 + PROGRAM_FIELD])?;
        let config_len = LittleEndian::read_u32(&buf[58..62]);
        Ok(Self {
            shot,
            created_at,
            program,
            config_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_roundtrip() {
        let shot = ShotName::parse("240115E01").unwrap();
        let mut h = ShotHeader::new(&shot, 1_705_276_800, "daq-main");
        h.config_len = 128;
        let bytes = h.to_bytes();
        assert_eq!(bytes.len(), SHOT_HEADER_SIZE);
        let decoded = ShotHeader::read_from(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(decoded, h);
    }

    #[test]
    fn test_magic_distinguishes_header_kinds() {
        let shot = ShotName::parse("240115E01").unwrap();
        let bytes = ShotHeader::new(&shot, 0, "").to_bytes();
        assert_eq!(&bytes[0..4], b"SHOT");
        assert_ne!(&bytes[0..4], &super::super::SIGNAL_MAGIC);
    }

    #[test]
    fn test_bad_magic() {
        let shot = ShotName::parse("240115E01").unwrap();
        let mut bytes = ShotHeader::new(&shot, 0, "daq").to_bytes();
        bytes[1] = 0;
        assert!(ShotHeader::read_from(&mut Cursor::new(&bytes)).is_err());
    }

    #[test]
    fn test_future_version_rejected() {
        let shot = ShotName::parse("240115E01").unwrap();
        let mut bytes = ShotHeader::new(&shot, 0, "daq").to_bytes();
        bytes[4] = 9;
        let err = ShotHeader::read_from(&mut Cursor::new(&bytes)).unwrap_err();
        assert!(err.to_string().contains("version"));
    }
}
