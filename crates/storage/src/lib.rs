//! Shot storage: on-disk layout, trace codec, and the shot object
//!
//! This crate owns everything that touches a shot directory directly:
//!
//! - `layout`: bit-compatible directory/file naming
//! - `codec`: binary signal and shot header formats
//! - `writer` / `reader` / `density`: the trace I/O protocols
//! - `signal_cache`: per-shot write gating and stored-state tracking
//! - `shot`: the reference-counted shot object tying it all together
//!
//! Higher layers (the engine's shot cache and the sync lanes) never open
//! trace files themselves; they go through [`Shot`] or the sync crate's
//! flag-directory protocols.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod layout;
pub mod shot;
pub mod signal_cache;

mod density;
mod reader;
mod writer;

pub use codec::shot_header::ShotHeader;
pub use codec::signal_header::SignalHeader;
pub use reader::TraceReader;
pub use shot::{DirectoryEntry, NewShotParams, Shot};
pub use signal_cache::SignalCache;
