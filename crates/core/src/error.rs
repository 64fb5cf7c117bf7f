//! Error types for the shot storage engine
//!
//! One `thiserror` enum covers every layer of the workspace, with
//! [`ShotResult`] as the shared result alias.
//!
//! The taxonomy distinguishes transient, caller-retriable conditions
//! (`Busy`) from permanent failures, and flags data-loss events separately
//! so replication treats the affected signal as absent instead of serving
//! stale data.

use std::io;
use thiserror::Error;

/// Result type alias for shot storage operations
pub type ShotResult<T> = std::result::Result<T, ShotError>;

/// Error types for the shot storage engine
#[derive(Debug, Error)]
pub enum ShotError {
    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// On-disk format error (bad magic, size mismatch, header too small)
    #[error("Format error: {0}")]
    Format(String),

    /// Signal is currently being written on the same tier; retry later
    #[error("Signal {signal} of shot {shot} is busy, retry later")]
    Busy {
        /// Shot the busy signal belongs to
        shot: String,
        /// Signal id that is mid-write
        signal: u16,
    },

    /// Write attempted on a read-only database instance
    #[error("Database {0} is read-only")]
    ReadOnly(String),

    /// Shot name collision on create
    #[error("Shot name {0} already in use")]
    NameInUse(String),

    /// Shot does not exist (locally or via master fallback)
    #[error("Shot {0} not found")]
    NotFound(String),

    /// Requested signal has no stored data
    #[error("Signal {signal} of shot {shot} not found")]
    SignalNotFound {
        /// Shot the signal was requested from
        shot: String,
        /// Missing signal id
        signal: u16,
    },

    /// Operation on a shot object after it was detached from its cache
    #[error("Shot {0} has been detached")]
    Detached(String),

    /// Atomic rename sequence failed after the previous file was displaced
    /// and could not be restored
    #[error("Data loss on signal {signal} of shot {shot}: previous file displaced and not restored")]
    DataLoss {
        /// Affected shot
        shot: String,
        /// Affected signal id
        signal: u16,
    },

    /// Density edit rejected because the trace is marked edit-locked
    #[error("Signal {signal} of shot {shot} is edit-locked")]
    EditLocked {
        /// Shot holding the locked trace
        shot: String,
        /// Locked signal id
        signal: u16,
    },

    /// Sync-flag transaction or resume-marker consistency failure
    #[error("Sync state error: {0}")]
    SyncState(String),

    /// Replication lane refuses progress until its sticky error is reset
    #[error("Replication lane stalled: {0}")]
    LaneStalled(String),

    /// Incoming portion offset does not continue the previous write
    #[error("Portion offset mismatch: expected {expected}, given {given}")]
    OffsetMismatch {
        /// Next offset the receiver expects
        expected: u64,
        /// Offset the sender supplied
        given: u64,
    },

    /// Shot name failed validation
    #[error("Invalid shot name: {0}")]
    InvalidName(String),

    /// Signal id outside the 1..=9999 range (and not a synthetic id)
    #[error("Invalid signal id: {0}")]
    InvalidSignal(i32),

    /// Configuration file missing, unreadable, or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Engine is shutting down; the operation was not started
    #[error("Engine is shutting down")]
    ShuttingDown,
}

impl ShotError {
    /// True for transient conditions the caller may simply retry.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ShotError::Busy { .. })
    }
}
