//! Collaborator traits
//!
//! The engine does not own its observers: a change monitor is injected
//! per write/delete operation, and a broadcaster is handed to the engine
//! at construction for administrative events. Both are capability traits
//! with no-op implementations for tests and for callers that do not care.

use crate::signal::SignalId;

/// Sink notified after each committed write or delete.
///
/// Thread safety: invoked on the caller's thread while no engine locks are
/// held; implementations must be `Send + Sync`.
pub trait ChangeMonitor: Send + Sync {
    /// A signal's durable state changed.
    ///
    /// `was_waiting` is true when the signal was in the owning shot's
    /// expected-id set (a reader may be parked on it); `was_removed` is
    /// true for deletes.
    fn signal_changed(&self, signal: SignalId, was_waiting: bool, was_removed: bool);
}

/// Sink for administrative events consumed by session/UI layers.
pub trait Broadcaster: Send + Sync {
    /// A new shot was materialized on disk.
    fn shot_created(&self, shot: &str);

    /// One or more signals of a shot were updated or removed in bulk.
    fn signals_updated(&self, shot: &str, count: usize);

    /// A replication flag changed for a shot.
    fn flag_changed(&self, shot: &str);
}

/// Monitor/broadcaster that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ChangeMonitor for NoopObserver {
    fn signal_changed(&self, _signal: SignalId, _was_waiting: bool, _was_removed: bool) {}
}

impl Broadcaster for NoopObserver {
    fn shot_created(&self, _shot: &str) {}
    fn signals_updated(&self, _shot: &str, _count: usize) {}
    fn flag_changed(&self, _shot: &str) {}
}
