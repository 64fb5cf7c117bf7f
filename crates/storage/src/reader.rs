//! Trace read continuations
//!
//! Reads return a lazy byte-producing `TraceReader` that the transport
//! layer pulls from incrementally. Three shapes exist:
//!
//! - `Wait`: the signal is expected from its originating session but not
//!   yet written; no file is opened and the caller is told to come back.
//! - `File`: an open read handle serving header + payload; short files are
//!   padded with zeros up to the declared size instead of failing.
//! - `Packed`: an in-memory buffer for the synthetic reads (signal-id
//!   list, shot-header copy).

use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use shotdb_core::{ShotError, ShotName, ShotResult, SignalId};

use crate::codec::signal_header::{SignalHeader, STATUS_READY};
use crate::layout::{self, DATA_EXT};

/// Lazy byte-producing continuation for one read.
#[derive(Debug)]
pub enum TraceReader {
    /// Signal is mid-write by its originating session; retry later.
    Wait,
    /// Open file handle streaming header + payload, zero-padded to `total`.
    File {
        /// Open read handle positioned at the next unserved byte
        file: File,
        /// Total bytes this continuation will produce
        total: u64,
        /// Bytes already produced
        served: u64,
    },
    /// In-memory packed buffer (synthetic reads).
    Packed {
        /// The packed bytes
        data: Vec<u8>,
        /// Read position
        pos: usize,
    },
}

impl TraceReader {
    /// True when the caller should retry later instead of pulling bytes.
    pub fn is_wait(&self) -> bool {
        matches!(self, TraceReader::Wait)
    }

    /// Bytes this continuation can still produce.
    pub fn remaining(&self) -> u64 {
        match self {
            TraceReader::Wait => 0,
            TraceReader::File { total, served, .. } => total - served,
            TraceReader::Packed { data, pos } => (data.len() - pos) as u64,
        }
    }

    /// Pull the next chunk into `buf`, returning the byte count (0 when
    /// exhausted). Short files are padded with zeros up to the declared
    /// total rather than erroring.
    ///
    /// # Errors
    ///
    /// `ShotError::Busy` on a `Wait` continuation; I/O errors otherwise.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> ShotResult<usize> {
        match self {
            TraceReader::Wait => Err(ShotError::Busy {
                shot: String::new(),
                signal: 0,
            }),
            TraceReader::File { file, total, served } => {
                let remaining = (*total - *served) as usize;
                if remaining == 0 || buf.is_empty() {
                    return Ok(0);
                }
                let want = buf.len().min(remaining);
                let got = file.read(&mut buf[..want])?;
                let n = if got == 0 {
                    // File shorter than declared: serve zeros.
                    buf[..want].fill(0);
                    want
                } else {
                    got
                };
                *served += n as u64;
                Ok(n)
            }
            TraceReader::Packed { data, pos } => {
                let want = buf.len().min(data.len() - *pos);
                buf[..want].copy_from_slice(&data[*pos..*pos + want]);
                *pos += want;
                Ok(want)
            }
        }
    }

    /// Drain the continuation into a vector (test and tooling helper).
    ///
    /// # Errors
    ///
    /// Propagates `read_chunk` errors.
    pub fn read_to_end(&mut self) -> ShotResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = self.read_chunk(&mut chunk)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Open a stored trace for reading, validating its header identity.
///
/// # Errors
///
/// `SignalNotFound` when no data file exists; `Busy` when the file's
/// status flag is still not-ready; format errors on identity mismatch.
pub(crate) fn open_trace(dir: &Path, shot: &ShotName, id: SignalId) -> ShotResult<TraceReader> {
    let path = layout::signal_file(dir, id, DATA_EXT);
    let mut file = File::open(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ShotError::SignalNotFound {
                shot: shot.as_str().to_string(),
                signal: id.index(),
            }
        } else {
            ShotError::Io(e)
        }
    })?;
    let header = SignalHeader::read_from(&mut file)?;
    header.validate_identity(shot, id)?;
    if header.status != STATUS_READY {
        return Err(ShotError::Busy {
            shot: shot.as_str().to_string(),
            signal: id.index(),
        });
    }
    let total = header.header_len() as u64 + header.payload_size;
    file.seek(SeekFrom::Start(0))?;
    Ok(TraceReader::File {
        file,
        total,
        served: 0,
    })
}

/// Packed list of all currently-known signal ids: u32 count, then each id
/// as LE u16, ascending.
pub(crate) fn pack_signal_list(ids: &[SignalId]) -> TraceReader {
    let mut data = Vec::with_capacity(4 + ids.len() * 2);
    data.write_u32::<LittleEndian>(ids.len() as u32).unwrap();
    for id in ids {
        data.write_u16::<LittleEndian>(id.index()).unwrap();
    }
    TraceReader::Packed { data, pos: 0 }
}

/// Packed copy of the shot-level header file.
pub(crate) fn pack_shot_header(dir: &Path, shot: &ShotName) -> ShotResult<TraceReader> {
    let path = layout::shot_header_file(dir);
    let data = std::fs::read(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ShotError::NotFound(shot.as_str().to_string())
        } else {
            ShotError::Io(e)
        }
    })?;
    Ok(TraceReader::Packed { data, pos: 0 })
}
