//! shotdb - Shot storage engine with dual-lane backup replication
//!
//! shotdb stores time-stamped experimental records ("shots"), each holding
//! independently written data traces ("signals"), and keeps a replica
//! server synchronized despite intermittent connectivity.
//!
//! # Quick Start
//!
//! ```ignore
//! use shotdb::{AppContext, NewShotParams, NoopObserver, ShotName, SignalHeader, SignalId, Tier};
//!
//! // Load shotdb.toml (materialized with defaults on first run)
//! let ctx = AppContext::open(std::path::Path::new("/etc/shotdb"))?;
//! let db = ctx.db("main").expect("configured database");
//!
//! // Create today's shot and write one signal
//! let name = ShotName::parse("240115E01")?;
//! let shot = db.open_shot(&name, true, NewShotParams::default(), false)?;
//! let header = SignalHeader::new(&name, SignalId::new(12)?, 4, 0);
//! db.put_trace(&shot, Tier::Main, &header, b"data", &NoopObserver)?;
//! ```
//!
//! # Architecture
//!
//! The engine is layered: core types, on-disk storage and the trace codec,
//! the replication lanes, and the engine assembly that ties them to a
//! configuration. Everything a caller needs is re-exported from the engine
//! crate; the lower layers are implementation detail.

pub use shotdb_engine::*;
