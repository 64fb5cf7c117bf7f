//! Per-shot signal state cache
//!
//! One mutex-guarded map of `SignalId -> SignalState` per shot. This is the
//! only fine-grained lock in the engine: it gates concurrent writes to the
//! same (signal, tier) and records which tiers hold durable data. The lock
//! is held for state transitions only, never across file I/O.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;

use shotdb_core::{ShotResult, SignalId, SignalState, Tier, TierState, WriteOutcome};

use crate::layout;

/// Mutex-guarded per-signal state map for one shot.
#[derive(Debug, Default)]
pub struct SignalCache {
    map: Mutex<HashMap<SignalId, SignalState>>,
}

impl SignalCache {
    /// Empty cache for a newly created shot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate stored bits from directory scans of both tiers.
    ///
    /// Unreadable directories contribute nothing; the scan is best-effort
    /// because the data files themselves are authoritative.
    pub fn populate(&self, main_dir: &Path, volatile_dir: &Path) {
        let mut map = self.map.lock();
        for (dir, tier) in [(main_dir, Tier::Main), (volatile_dir, Tier::Volatile)] {
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let name = entry.file_name();
                let Some(id) = layout::parse_signal_file(&name.to_string_lossy()) else {
                    continue;
                };
                *map.entry(id).or_default().tier_mut(tier) = TierState::Stored;
            }
        }
    }

    /// Mark a write in progress; rejects a concurrent writer on the same
    /// tier with a retriable busy error.
    pub fn begin_write(&self, shot: &str, id: SignalId, tier: Tier) -> ShotResult<()> {
        let mut map = self.map.lock();
        map.entry(id).or_default().tier_mut(tier).begin_write(shot, id)
    }

    /// Clear the in-progress bit, committing or rolling back the stored bit.
    pub fn finish_write(&self, id: SignalId, tier: Tier, outcome: WriteOutcome) {
        let mut map = self.map.lock();
        let state = map.entry(id).or_default();
        state.tier_mut(tier).finish_write(outcome);
        if state.is_idle() {
            map.remove(&id);
        }
    }

    /// Clear the stored bit after a delete.
    pub fn mark_removed(&self, id: SignalId, tier: Tier) {
        let mut map = self.map.lock();
        if let Some(state) = map.get_mut(&id) {
            *state.tier_mut(tier) = TierState::Absent;
            if state.is_idle() {
                map.remove(&id);
            }
        }
    }

    /// Current state of one signal.
    pub fn state(&self, id: SignalId) -> SignalState {
        self.map.lock().get(&id).copied().unwrap_or_default()
    }

    /// True when durable data exists on the tier.
    pub fn is_stored(&self, id: SignalId, tier: Tier) -> bool {
        self.state(id).tier(tier).is_stored()
    }

    /// Sorted snapshot of all known signal states.
    pub fn snapshot(&self) -> Vec<(SignalId, SignalState)> {
        let map = self.map.lock();
        let mut entries: Vec<_> = map.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }

    /// Drop all state (used on detach).
    pub fn clear(&self) {
        self.map.lock().clear();
    }
}
