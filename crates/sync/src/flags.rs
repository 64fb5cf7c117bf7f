//! Sync-flag state machine
//!
//! Replication state for the volatile tier lives in zero-byte flag files
//! under a dedicated sync tree mirroring the shot directory structure.
//! File existence *is* the state, which survives process restarts; state
//! transitions per (shot, signal, operation) are rename/delete sequences,
//! never a lock file.
//!
//! ```text
//! prep ──(op finishes, data modified)──> done ──(picked up)──> syncing
//!   │                                      ▲                      │
//!   │ (ages past threshold)                │ (stall reclaim,      │ (remote
//!   ▼                                      │  data consistent)    │  confirms)
//! stall ────────────────────────────────────┘                 (removed)
//! ```
//!
//! The begin/end transaction pair is deliberately asymmetric: `sync_op_begin`
//! returns an error when it cannot create the prep flag (the caller must not
//! proceed without one), while `sync_op_end` never fails — a stale flag
//! self-heals on the next cleanup pass.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use shotdb_core::limits::PREP_CREATE_ATTEMPTS;
use shotdb_core::{ShotError, ShotName, ShotResult, SignalId};
use shotdb_storage::layout;

/// Replicated operation a flag tuple belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncOp {
    /// Signal data was written and must reach the replica
    Add,
    /// Signal data was erased and the replica must erase too
    Erase,
}

impl SyncOp {
    /// The other operation kind.
    pub fn opposite(self) -> Self {
        match self {
            SyncOp::Add => SyncOp::Erase,
            SyncOp::Erase => SyncOp::Add,
        }
    }
}

/// One of the four mutually exclusive flag states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagState {
    /// Operation acknowledged locally, pending pickup
    Done,
    /// Operation in progress by the local writer
    Prep,
    /// Transfer to the replica has started
    Syncing,
    /// Prep aged past the cleanup threshold without resolution
    Stall,
}

/// All states, in probe priority order.
const ALL_STATES: [FlagState; 4] = [
    FlagState::Done,
    FlagState::Syncing,
    FlagState::Prep,
    FlagState::Stall,
];

/// Flag file extension for an (operation, state) pair.
pub fn flag_ext(op: SyncOp, state: FlagState) -> &'static str {
    match (op, state) {
        (SyncOp::Add, FlagState::Done) => "800",
        (SyncOp::Add, FlagState::Prep) => "801",
        (SyncOp::Add, FlagState::Syncing) => "802",
        (SyncOp::Add, FlagState::Stall) => "803",
        (SyncOp::Erase, FlagState::Done) => "804",
        (SyncOp::Erase, FlagState::Prep) => "805",
        (SyncOp::Erase, FlagState::Syncing) => "806",
        (SyncOp::Erase, FlagState::Stall) => "807",
    }
}

/// Parse a flag file extension back into its (operation, state) pair.
pub fn parse_flag_ext(ext: &str) -> Option<(SyncOp, FlagState)> {
    let pair = match ext {
        "800" => (SyncOp::Add, FlagState::Done),
        "801" => (SyncOp::Add, FlagState::Prep),
        "802" => (SyncOp::Add, FlagState::Syncing),
        "803" => (SyncOp::Add, FlagState::Stall),
        "804" => (SyncOp::Erase, FlagState::Done),
        "805" => (SyncOp::Erase, FlagState::Prep),
        "806" => (SyncOp::Erase, FlagState::Syncing),
        "807" => (SyncOp::Erase, FlagState::Stall),
        _ => return None,
    };
    Some(pair)
}

/// Path of one flag file inside a sync shot directory.
pub fn flag_path(sync_shot_dir: &Path, id: SignalId, op: SyncOp, state: FlagState) -> PathBuf {
    layout::signal_file(sync_shot_dir, id, flag_ext(op, state))
}

/// Sync shot directory for a shot (mirrors the data tree under `sync_root`).
pub fn sync_shot_dir(sync_root: &Path, shot: &ShotName) -> PathBuf {
    layout::shot_dir(sync_root, shot)
}

/// Probe which flag state currently holds for a (signal, operation) tuple.
///
/// A `done` or `syncing` flag from an earlier committed change can coexist
/// with the `prep` of an operation in progress; the highest-priority flag
/// wins and the probe reports it.
pub fn probe(sync_shot_dir: &Path, id: SignalId, op: SyncOp) -> Option<FlagState> {
    ALL_STATES
        .into_iter()
        .find(|state| flag_path(sync_shot_dir, id, op, *state).exists())
}

/// Begin a flag transaction: clear opposite-operation remnants, then create
/// a fresh `prep` flag. Same-operation `done`/`syncing` flags are left in
/// place: they record an earlier committed, not-yet-replicated change and
/// must survive an operation that fails after this point. On success the
/// `prep`-to-`done` promotion supersedes them.
///
/// Creation is retried a fixed number of times to tolerate a race with the
/// cleanup sweep removing the directory underneath us. An already-present
/// prep flag belongs to a concurrent writer and is never touched.
///
/// # Errors
///
/// `Busy` when another writer holds the prep flag for this tuple;
/// `SyncState` when no prep flag could be created. Either way the caller
/// must not proceed with the data operation.
pub fn sync_op_begin(
    sync_root: &Path,
    shot: &ShotName,
    id: SignalId,
    op: SyncOp,
) -> ShotResult<()> {
    let dir = sync_shot_dir(sync_root, shot);

    let mut last_err = None;
    for attempt in 1..=PREP_CREATE_ATTEMPTS {
        if let Err(e) = std::fs::create_dir_all(&dir) {
            last_err = Some(e);
            continue;
        }
        // A fresh operation supersedes a pending opposite one.
        for state in [FlagState::Done, FlagState::Stall] {
            remove_flag(&dir, id, op.opposite(), state);
        }
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(flag_path(&dir, id, op, FlagState::Prep))
        {
            Ok(_) => {
                debug!(shot = shot.as_str(), signal = id.index(), ?op, attempt, "prep flag created");
                return Ok(());
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ShotError::Busy {
                    shot: shot.as_str().to_string(),
                    signal: id.index(),
                });
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(ShotError::SyncState(format!(
        "could not create prep flag for signal {id} of shot {shot}: {}",
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// End a flag transaction. Never fails: problems are logged and left for
/// the cleanup pass to reconcile.
///
/// With `data_modified` the prep flag becomes `done` and its modification
/// time is refreshed so staleness cleanup measures from now; without it
/// the prep flag is simply removed, leaving no flag at all.
pub fn sync_op_end(
    sync_root: &Path,
    shot: &ShotName,
    id: SignalId,
    op: SyncOp,
    began_ok: bool,
    data_modified: bool,
) {
    if !began_ok {
        return;
    }
    let dir = sync_shot_dir(sync_root, shot);
    let prep = flag_path(&dir, id, op, FlagState::Prep);
    if !data_modified {
        remove_flag(&dir, id, op, FlagState::Prep);
        return;
    }
    let done = flag_path(&dir, id, op, FlagState::Done);
    if let Err(e) = std::fs::rename(&prep, &done) {
        warn!(
            shot = shot.as_str(),
            signal = id.index(),
            ?op,
            error = %e,
            "prep flag could not be promoted to done"
        );
        return;
    }
    // Truncating the zero-byte file refreshes its mtime.
    if let Err(e) = std::fs::File::create(&done) {
        warn!(
            shot = shot.as_str(),
            signal = id.index(),
            error = %e,
            "done flag mtime refresh failed"
        );
    }
}

/// Opportunistic cleanup for one (signal, operation) tuple.
///
/// A lingering `stall` is reclaimed as `done` when the underlying data
/// matches the operation's expectation, or back to `prep` when it does not
/// (the operation apparently never completed). A `prep` older than the
/// stall threshold is demoted to `stall`.
pub fn clean_flags(
    sync_shot_dir: &Path,
    id: SignalId,
    op: SyncOp,
    stall_threshold: Duration,
    data_matches: bool,
) {
    let stall = flag_path(sync_shot_dir, id, op, FlagState::Stall);
    if stall.exists() {
        let reclaimed = if data_matches {
            FlagState::Done
        } else {
            FlagState::Prep
        };
        let target = flag_path(sync_shot_dir, id, op, reclaimed);
        if let Err(e) = std::fs::rename(&stall, &target) {
            warn!(signal = id.index(), ?op, error = %e, "stall flag reclaim failed");
        } else {
            debug!(signal = id.index(), ?op, ?reclaimed, "stall flag reclaimed");
        }
    }

    let prep = flag_path(sync_shot_dir, id, op, FlagState::Prep);
    if let Ok(meta) = std::fs::metadata(&prep) {
        let stale = meta
            .modified()
            .ok()
            .and_then(|m| m.elapsed().ok())
            .is_some_and(|age| age > stall_threshold);
        if stale {
            let stall = flag_path(sync_shot_dir, id, op, FlagState::Stall);
            if let Err(e) = std::fs::rename(&prep, &stall) {
                warn!(signal = id.index(), ?op, error = %e, "prep flag demotion failed");
            } else {
                debug!(signal = id.index(), ?op, "stale prep flag demoted to stall");
            }
        }
    }
}

/// True when the tuple is ready to hand to the transfer cursor: the flag is
/// `done` or `syncing` and the data's presence matches the operation.
pub fn eligible(sync_shot_dir: &Path, id: SignalId, op: SyncOp, data_matches: bool) -> bool {
    if !data_matches {
        return false;
    }
    matches!(
        probe(sync_shot_dir, id, op),
        Some(FlagState::Done) | Some(FlagState::Syncing)
    )
}

/// Mark a tuple as picked up by the transfer cursor (`done` → `syncing`).
/// An already-`syncing` tuple (resumed transfer) is left as is.
pub fn mark_syncing(sync_shot_dir: &Path, id: SignalId, op: SyncOp) {
    let done = flag_path(sync_shot_dir, id, op, FlagState::Done);
    if done.exists() {
        let syncing = flag_path(sync_shot_dir, id, op, FlagState::Syncing);
        if let Err(e) = std::fs::rename(&done, &syncing) {
            warn!(signal = id.index(), ?op, error = %e, "done flag pickup failed");
        }
    }
}

/// Remove the `syncing` flag after the replica confirmed receipt.
pub fn confirm_delivery(sync_shot_dir: &Path, id: SignalId, op: SyncOp) {
    remove_flag(sync_shot_dir, id, op, FlagState::Syncing);
    // Pickup may have raced the confirmation; a done flag left behind would
    // cause a spurious resend.
    remove_flag(sync_shot_dir, id, op, FlagState::Done);
}

fn remove_flag(dir: &Path, id: SignalId, op: SyncOp, state: FlagState) {
    let path = flag_path(dir, id, op, state);
    if let Err(e) = std::fs::remove_file(&path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "flag file removal failed");
        }
    }
}
