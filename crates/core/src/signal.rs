//! Signal identifiers and per-signal write state
//!
//! A signal id is a positive integer unique within a shot, 1..=9999.
//! Two synthetic negative ids exist for packed reads (the signal-id list
//! and a copy of the shot-level header); they never identify stored data.
//!
//! Per (shot, signal) state is tracked as one `TierState` per storage tier
//! instead of the historical 4-bit mask. `Rewriting` covers the legal
//! "stored and currently being overwritten" case on the volatile tier, so
//! no expressiveness is lost.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ShotError, ShotResult};

/// Highest valid signal id within a shot
pub const MAX_SIGNAL_ID: u16 = 9999;

/// Synthetic id: packed list of all currently-known signal ids
pub const SIGNAL_LIST_ID: i32 = -1;

/// Synthetic id: packed copy of the shot-level header
pub const SHOT_HEADER_ID: i32 = -2;

/// Validated signal id (1..=9999)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalId(u16);

impl SignalId {
    /// Create a signal id, validating the range.
    ///
    /// # Errors
    ///
    /// Returns `ShotError::InvalidSignal` for 0 or values above 9999.
    pub fn new(raw: u16) -> ShotResult<Self> {
        if raw == 0 || raw > MAX_SIGNAL_ID {
            return Err(ShotError::InvalidSignal(raw as i32));
        }
        Ok(Self(raw))
    }

    /// Raw numeric value.
    pub fn index(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for SignalId {
    /// Zero-padded 4-digit form, matching the on-disk file stem.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

/// Target of a read request: a stored trace or one of the synthetic dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadTarget {
    /// One stored signal trace
    Trace(SignalId),
    /// Packed list of all currently-known signal ids
    SignalList,
    /// Packed copy of the shot-level header file
    ShotHeader,
}

impl ReadTarget {
    /// Decode a wire-level id into a read target.
    ///
    /// # Errors
    ///
    /// Returns `ShotError::InvalidSignal` for ids that are neither a valid
    /// signal id nor a reserved synthetic id.
    pub fn from_raw(raw: i32) -> ShotResult<Self> {
        match raw {
            SIGNAL_LIST_ID => Ok(ReadTarget::SignalList),
            SHOT_HEADER_ID => Ok(ReadTarget::ShotHeader),
            n if n > 0 && n <= MAX_SIGNAL_ID as i32 => Ok(ReadTarget::Trace(SignalId(n as u16))),
            n => Err(ShotError::InvalidSignal(n)),
        }
    }
}

/// Storage tier a signal file lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Durable, synced-to-backup location
    Main,
    /// Faster, overwritable location synchronized via flag files
    Volatile,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Main => write!(f, "main"),
            Tier::Volatile => write!(f, "volatile"),
        }
    }
}

/// Outcome of a write reported to `TierState::finish_write`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Temp file renamed into place; data durable
    Committed,
    /// Write failed before the previous file was touched
    Failed,
    /// Rename failed after the previous file was displaced and the
    /// restore also failed; no durable data remains
    LostPrevious,
}

/// Per-tier write/storage state for one signal.
///
/// Exactly one write may be in flight per (signal, tier); concurrent
/// writers are rejected, not blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TierState {
    /// No durable data, no write in flight
    #[default]
    Absent,
    /// First write in flight, nothing durable yet
    Writing,
    /// Durably committed data, no write in flight
    Stored,
    /// Durable data exists and an overwrite is in flight
    Rewriting,
}

impl TierState {
    /// Begin a write on this tier.
    ///
    /// # Errors
    ///
    /// Returns `ShotError::Busy` if a write is already in flight.
    pub fn begin_write(&mut self, shot: &str, signal: SignalId) -> ShotResult<()> {
        match *self {
            TierState::Absent => {
                *self = TierState::Writing;
                Ok(())
            }
            TierState::Stored => {
                *self = TierState::Rewriting;
                Ok(())
            }
            TierState::Writing | TierState::Rewriting => Err(ShotError::Busy {
                shot: shot.to_string(),
                signal: signal.index(),
            }),
        }
    }

    /// Finish an in-flight write, committing or rolling back.
    ///
    /// On failure a `Rewriting` state falls back to `Stored` (the previous
    /// file is untouched) unless the outcome reports the previous file was
    /// lost, in which case the stored bit is cleared so replication sees
    /// the signal as absent.
    pub fn finish_write(&mut self, outcome: WriteOutcome) {
        *self = match (*self, outcome) {
            (_, WriteOutcome::Committed) => TierState::Stored,
            (TierState::Rewriting, WriteOutcome::Failed) => TierState::Stored,
            (_, WriteOutcome::Failed) => TierState::Absent,
            (_, WriteOutcome::LostPrevious) => TierState::Absent,
        };
    }

    /// True when durably committed data exists on this tier.
    pub fn is_stored(&self) -> bool {
        matches!(self, TierState::Stored | TierState::Rewriting)
    }

    /// True while a write is in flight on this tier.
    pub fn in_progress(&self) -> bool {
        matches!(self, TierState::Writing | TierState::Rewriting)
    }
}

/// Combined per-signal state across both tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignalState {
    /// Main (permanent) tier state
    pub main: TierState,
    /// Volatile tier state
    pub volatile: TierState,
}

impl SignalState {
    /// Mutable access to one tier's state.
    pub fn tier_mut(&mut self, tier: Tier) -> &mut TierState {
        match tier {
            Tier::Main => &mut self.main,
            Tier::Volatile => &mut self.volatile,
        }
    }

    /// Immutable access to one tier's state.
    pub fn tier(&self, tier: Tier) -> TierState {
        match tier {
            Tier::Main => self.main,
            Tier::Volatile => self.volatile,
        }
    }

    /// True when no tier holds data or a write.
    pub fn is_idle(&self) -> bool {
        self.main == TierState::Absent && self.volatile == TierState::Absent
    }
}
