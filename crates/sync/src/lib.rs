//! Backup replication between a primary and a replica server
//!
//! Two independent lanes keep the replica current despite intermittent
//! connectivity:
//!
//! - the **permanent lane** walks the main data tree in ascending shot
//!   order and diffs each shot's files against a resume marker the replica
//!   sends back;
//! - the **volatile lane** never diffs: writers leave zero-byte flag files
//!   in a mirrored sync tree, and the lane derives its work items from the
//!   flags alone, including explicit erase propagation.
//!
//! Both lanes are driven by a [`BackupCursor`] that hands the transport
//! layer one [`SendItem`] continuation per tick. The receiving side is
//! [`PortionReceiver`], which enforces strict offset continuity and
//! commits with the same rotate-then-rename protocol the local writer
//! uses. Neither lane is internally concurrent; serializing ticks is the
//! caller's job.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accept;
pub mod cursor;
pub mod flags;
pub mod marker;
pub mod transfer;

mod permanent;
mod volatile;

pub use accept::{PortionOutcome, PortionReceiver};
pub use cursor::{BackupCursor, Lane, SyncPaths, TaskItem};
pub use flags::{FlagState, SyncOp};
pub use marker::ResumeMarker;
pub use transfer::SendItem;
