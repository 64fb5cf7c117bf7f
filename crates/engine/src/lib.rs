//! Engine assembly for the shot storage system
//!
//! This crate ties the lower layers together into the API the transport
//! layer consumes:
//!
//! - [`AppContext`]: all per-process state, built once from `shotdb.toml`
//! - [`DbInstance`]: one logical database (cache + replication + status)
//! - [`ShotCache`] / [`ShotHandle`]: reference-counted shot access
//! - [`Sweeper`]: per-instance background eviction thread
//!
//! Core data types, the on-disk codec, and the replication primitives are
//! re-exported from the underlying crates so callers need only this one.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod context;
pub mod database;
pub mod sweep;

pub use cache::{ShotCache, ShotHandle};
pub use config::{DbConfig, EngineConfig, CONFIG_FILE_NAME};
pub use context::AppContext;
pub use database::DbInstance;
pub use sweep::Sweeper;

pub use shotdb_core::{
    Broadcaster, ChangeMonitor, NoopObserver, ReadTarget, ShotError, ShotName, ShotResult,
    SignalId, Tier,
};
pub use shotdb_storage::{
    DirectoryEntry, NewShotParams, Shot, ShotHeader, SignalHeader, TraceReader,
};
pub use shotdb_sync::{
    Lane, PortionOutcome, ResumeMarker, SendItem, SyncOp,
};
