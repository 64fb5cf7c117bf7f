//! Core types and traits for the shot storage engine
//!
//! This crate defines the foundational types used throughout the system:
//! - ShotName: validated date + suffix identifier with on-disk ordering
//! - SignalId / ReadTarget: signal id space including synthetic read ids
//! - Tier / TierState / SignalState: per-signal write gating per tier
//! - ShotError: error type hierarchy
//! - ChangeMonitor / Broadcaster: collaborator capability traits
//! - limits: deployment defaults

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod limits;
pub mod shot_name;
pub mod signal;
pub mod traits;

pub use error::{ShotError, ShotResult};
pub use shot_name::ShotName;
pub use signal::{
    ReadTarget, SignalId, SignalState, Tier, TierState, WriteOutcome, MAX_SIGNAL_ID,
    SHOT_HEADER_ID, SIGNAL_LIST_ID,
};
pub use traits::{Broadcaster, ChangeMonitor, NoopObserver};
