//! Engine-wide defaults and limits
//!
//! Values here are the deployment-proven defaults; most are overridable
//! through `shotdb.toml`.

/// Default cap on shots per replication task list.
///
/// Enumeration stops only at a day boundary once the cap is exceeded, so a
/// task list can run slightly over this value.
pub const DEFAULT_TASK_LIST_CAP: usize = 999;

/// Default age after which a lingering `prep` sync flag is demoted to
/// `stall` (24 hours).
pub const DEFAULT_STALL_THRESHOLD_SECS: u64 = 24 * 60 * 60;

/// Default maximum number of open shot objects per database instance.
pub const DEFAULT_MAX_OPEN_SHOTS: usize = 64;

/// Default idle time before a refcount-zero shot is evicted.
pub const DEFAULT_DISPOSE_DELAY_SECS: u64 = 300;

/// Default wake interval of the background sweep thread.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10;

/// Default low-free-space warning threshold in megabytes.
pub const DEFAULT_LOW_SPACE_WARN_MB: u64 = 1024;

/// Attempts `sync_op_begin` makes to create a prep flag before giving up
/// (tolerates a race with the cleanup sweep).
pub const PREP_CREATE_ATTEMPTS: u32 = 3;

/// Strange-item count after which a replication lane latches its sticky
/// visible error.
pub const STRANGE_ITEM_LIMIT: u32 = 100;
