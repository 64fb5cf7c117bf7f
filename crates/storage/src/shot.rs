//! Shot object
//!
//! A `Shot` aggregates one shot's on-disk directories (main and volatile
//! tier), its per-signal state cache, and delegates reads and writes to
//! the codec/writer/reader modules. Shots are reference-counted by the
//! owning cache; once `detach()` has run the object must never be used
//! again — further access is a logic error that is logged and rejected,
//! not fatal.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use shotdb_core::{
    ChangeMonitor, ReadTarget, ShotError, ShotName, ShotResult, SignalId, Tier, WriteOutcome,
};

use crate::codec::shot_header::ShotHeader;
use crate::codec::signal_header::SignalHeader;
use crate::density;
use crate::layout::{self, CONFIG_BLOB_EXT, DATA_EXT, ERASED_EXT, SHOT_HEADER_STEM, TEMP_EXT};
use crate::reader::{self, TraceReader};
use crate::signal_cache::SignalCache;
use crate::writer;

/// Metadata supplied when materializing a new shot.
#[derive(Debug, Clone, Default)]
pub struct NewShotParams {
    /// Acquisition program tag recorded in the shot header
    pub program: String,
    /// Signal ids the originating session intends to write; reads of these
    /// return a wait continuation until the data arrives
    pub expected: Vec<SignalId>,
    /// Optional configuration blob embedded after the shot header
    pub config_blob: Option<Vec<u8>>,
}

/// One entry of a `pack_directory` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Signal id
    pub id: SignalId,
    /// Tier the listed file lives on
    pub tier: Tier,
    /// File size in bytes
    pub size: u64,
}

/// Reference-counted shot object backed by a directory tree.
#[derive(Debug)]
pub struct Shot {
    name: ShotName,
    db_label: String,
    main_dir: PathBuf,
    volatile_dir: PathBuf,
    writable: bool,
    newly_created: bool,
    cache: SignalCache,
    expected: Mutex<HashSet<SignalId>>,
    refcount: AtomicU32,
    last_idle: Mutex<Instant>,
    detached: AtomicBool,
}

impl Shot {
    /// Load an existing shot from disk.
    ///
    /// # Errors
    ///
    /// `NotFound` when the shot directory or its header file is missing.
    pub fn open(
        name: ShotName,
        main_root: &Path,
        volatile_root: &Path,
        db_label: &str,
        writable: bool,
    ) -> ShotResult<Self> {
        let main_dir = layout::shot_dir(main_root, &name);
        if !layout::shot_header_file(&main_dir).exists() {
            return Err(ShotError::NotFound(name.as_str().to_string()));
        }
        let volatile_dir = layout::shot_dir(volatile_root, &name);
        let cache = SignalCache::new();
        cache.populate(&main_dir, &volatile_dir);
        debug!(shot = name.as_str(), "shot loaded from disk");
        Ok(Self {
            name,
            db_label: db_label.to_string(),
            main_dir,
            volatile_dir,
            writable,
            newly_created: false,
            cache,
            expected: Mutex::new(HashSet::new()),
            refcount: AtomicU32::new(0),
            last_idle: Mutex::new(Instant::now()),
            detached: AtomicBool::new(false),
        })
    }

    /// Materialize a new shot: directory plus the zero-signal marker file,
    /// written atomically (temp file + rename).
    ///
    /// # Errors
    ///
    /// `ReadOnly` on a non-writable instance; I/O errors from directory or
    /// header creation.
    pub fn create(
        name: ShotName,
        main_root: &Path,
        volatile_root: &Path,
        db_label: &str,
        writable: bool,
        params: NewShotParams,
    ) -> ShotResult<Self> {
        if !writable {
            return Err(ShotError::ReadOnly(db_label.to_string()));
        }
        let main_dir = layout::shot_dir(main_root, &name);
        std::fs::create_dir_all(&main_dir)?;

        let mut header = ShotHeader::new(&name, unix_now(), &params.program);
        let blob = params.config_blob.as_deref().unwrap_or_default();
        header.config_len = blob.len() as u32;

        let temp = main_dir.join(format!("{SHOT_HEADER_STEM}.{TEMP_EXT}"));
        let final_path = layout::shot_header_file(&main_dir);
        let mut bytes = header.to_bytes();
        bytes.extend_from_slice(blob);
        std::fs::write(&temp, &bytes)?;
        std::fs::rename(&temp, &final_path)?;
        if !blob.is_empty() {
            // Archive copy of the embedded configuration.
            let archive = main_dir.join(format!("{SHOT_HEADER_STEM}.{CONFIG_BLOB_EXT}"));
            std::fs::write(&archive, blob)?;
        }

        debug!(shot = name.as_str(), "shot materialized");
        let volatile_dir = layout::shot_dir(volatile_root, &name);
        Ok(Self {
            name,
            db_label: db_label.to_string(),
            main_dir,
            volatile_dir,
            writable,
            newly_created: true,
            cache: SignalCache::new(),
            expected: Mutex::new(params.expected.into_iter().collect()),
            refcount: AtomicU32::new(0),
            last_idle: Mutex::new(Instant::now()),
            detached: AtomicBool::new(false),
        })
    }

    /// Shot name.
    pub fn name(&self) -> &ShotName {
        &self.name
    }

    /// Main-tier shot directory.
    pub fn main_dir(&self) -> &Path {
        &self.main_dir
    }

    /// Volatile-tier shot directory.
    pub fn volatile_dir(&self) -> &Path {
        &self.volatile_dir
    }

    /// True when this object materialized the shot in this process.
    pub fn is_newly_created(&self) -> bool {
        self.newly_created
    }

    // ------------------------------------------------------------------
    // Reference counting (driven by the owning cache)
    // ------------------------------------------------------------------

    /// Increment the reference count.
    pub fn acquire(&self) {
        self.refcount.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrement the reference count, stamping the idle time at zero.
    pub fn release(&self) {
        let prev = self.refcount.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 {
            *self.last_idle.lock() = Instant::now();
        } else if prev == 0 {
            warn!(shot = self.name.as_str(), "release without matching acquire");
            self.refcount.store(0, Ordering::Release);
        }
    }

    /// Current reference count.
    pub fn refcount(&self) -> u32 {
        self.refcount.load(Ordering::Acquire)
    }

    /// Time since the count last reached zero; `None` while referenced.
    pub fn idle_for(&self) -> Option<Duration> {
        if self.refcount() > 0 {
            None
        } else {
            Some(self.last_idle.lock().elapsed())
        }
    }

    /// Detach from the owning cache. The object must not be used after
    /// this; every operation will fail with `Detached`.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::Release);
        self.cache.clear();
        self.expected.lock().clear();
        debug!(shot = self.name.as_str(), "shot detached");
    }

    /// True once the shot has been detached.
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    fn ensure_attached(&self) -> ShotResult<()> {
        if self.is_detached() {
            warn!(shot = self.name.as_str(), "access to detached shot");
            return Err(ShotError::Detached(self.name.as_str().to_string()));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Trace operations
    // ------------------------------------------------------------------

    /// Write one signal trace.
    ///
    /// The declared payload size in the caller's header must equal the
    /// actual payload length or the write is rejected before any file is
    /// touched. Concurrent writes to the same (signal, tier) are rejected
    /// with a retriable busy error; different signals proceed in parallel.
    ///
    /// # Errors
    ///
    /// `Format` on a size mismatch, `Busy` on a concurrent writer,
    /// `ReadOnly`, I/O errors, and `DataLoss` per the writer protocol.
    pub fn put_trace(
        &self,
        tier: Tier,
        header: &SignalHeader,
        payload: &[u8],
        monitor: &dyn ChangeMonitor,
    ) -> ShotResult<()> {
        self.ensure_attached()?;
        if !self.writable {
            return Err(ShotError::ReadOnly(self.db_label.clone()));
        }
        let id = SignalId::new(header.signal)?;
        if header.payload_size != payload.len() as u64 {
            return Err(ShotError::Format(format!(
                "header declares {} payload bytes but {} were supplied",
                header.payload_size,
                payload.len()
            )));
        }
        header.validate_identity(&self.name, id)?;

        self.cache.begin_write(self.name.as_str(), id, tier)?;

        let dir = self.tier_dir(tier);
        let result = std::fs::create_dir_all(dir)
            .map_err(ShotError::Io)
            .and_then(|_| {
                writer::write_trace(dir, &self.name, id, header, payload, tier == Tier::Volatile)
            });

        let outcome = match &result {
            Ok(()) => WriteOutcome::Committed,
            Err(ShotError::DataLoss { .. }) => WriteOutcome::LostPrevious,
            Err(_) => WriteOutcome::Failed,
        };
        self.cache.finish_write(id, tier, outcome);

        result?;

        let state = self.cache.state(id);
        if state.main.is_stored() && state.volatile.is_stored() {
            // Tolerated overlap between tiers; warn, do not block.
            warn!(
                shot = self.name.as_str(),
                signal = id.index(),
                "signal stored on both main and volatile tier"
            );
        }

        let was_waiting = self.expected.lock().remove(&id);
        monitor.signal_changed(id, was_waiting, false);
        Ok(())
    }

    /// Return a lazy read continuation for a trace or synthetic target.
    ///
    /// A signal that the originating session declared but has not written
    /// yet yields a wait continuation without opening any file.
    ///
    /// # Errors
    ///
    /// `SignalNotFound`, format errors, and I/O errors from the reader.
    pub fn get_trace_reader(&self, target: ReadTarget) -> ShotResult<TraceReader> {
        self.ensure_attached()?;
        match target {
            ReadTarget::SignalList => Ok(reader::pack_signal_list(&self.signal_ids())),
            ReadTarget::ShotHeader => reader::pack_shot_header(&self.main_dir, &self.name),
            ReadTarget::Trace(id) => {
                let state = self.cache.state(id);
                if self.expected.lock().contains(&id)
                    && !state.main.is_stored()
                    && !state.volatile.is_stored()
                {
                    return Ok(TraceReader::Wait);
                }
                // Prefer the volatile copy: it is the one an in-place
                // overwrite most recently replaced.
                if state.volatile.is_stored() {
                    reader::open_trace(&self.volatile_dir, &self.name, id)
                } else {
                    reader::open_trace(&self.main_dir, &self.name, id)
                }
            }
        }
    }

    /// Delete a volatile-tier trace by renaming it to the erased marker.
    ///
    /// # Errors
    ///
    /// `SignalNotFound` when no volatile data exists; `Busy` while a write
    /// is in flight on the volatile tier.
    pub fn delete_trace(&self, id: SignalId, monitor: &dyn ChangeMonitor) -> ShotResult<()> {
        self.ensure_attached()?;
        if !self.writable {
            return Err(ShotError::ReadOnly(self.db_label.clone()));
        }
        if !self.cache.is_stored(id, Tier::Volatile) {
            return Err(ShotError::SignalNotFound {
                shot: self.name.as_str().to_string(),
                signal: id.index(),
            });
        }
        self.cache.begin_write(self.name.as_str(), id, Tier::Volatile)?;

        let target = layout::signal_file(&self.volatile_dir, id, DATA_EXT);
        let erased = layout::signal_file(&self.volatile_dir, id, ERASED_EXT);
        writer::remove_if_present(&erased);
        let result = std::fs::rename(&target, &erased);

        match result {
            Ok(()) => {
                self.cache.mark_removed(id, Tier::Volatile);
                monitor.signal_changed(id, false, true);
                Ok(())
            }
            Err(e) => {
                self.cache
                    .finish_write(id, Tier::Volatile, WriteOutcome::Failed);
                Err(ShotError::Io(e))
            }
        }
    }

    /// Rewrite a trace's payload in place (density update).
    ///
    /// # Errors
    ///
    /// See [`density`]; additionally `Busy` while a write is in flight.
    pub fn update_density(&self, id: SignalId, new_payload: &[u8]) -> ShotResult<()> {
        self.ensure_attached()?;
        if !self.writable {
            return Err(ShotError::ReadOnly(self.db_label.clone()));
        }
        let tier = if self.cache.is_stored(id, Tier::Volatile) {
            Tier::Volatile
        } else {
            Tier::Main
        };
        self.cache.begin_write(self.name.as_str(), id, tier)?;
        let result = density::update_density(self.tier_dir(tier), &self.name, id, new_payload);
        let outcome = if result.is_ok() {
            WriteOutcome::Committed
        } else {
            WriteOutcome::Failed
        };
        self.cache.finish_write(id, tier, outcome);
        result
    }

    /// Sorted ids of all signals with durable data on either tier.
    pub fn signal_ids(&self) -> Vec<SignalId> {
        self.cache
            .snapshot()
            .into_iter()
            .filter(|(_, s)| s.main.is_stored() || s.volatile.is_stored())
            .map(|(id, _)| id)
            .collect()
    }

    /// Directory listing for UI consumption: one entry per stored file.
    pub fn pack_directory(&self) -> Vec<DirectoryEntry> {
        let mut entries = Vec::new();
        for (id, state) in self.cache.snapshot() {
            for tier in [Tier::Main, Tier::Volatile] {
                if state.tier(tier).is_stored() {
                    let path = layout::signal_file(self.tier_dir(tier), id, DATA_EXT);
                    let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                    entries.push(DirectoryEntry { id, tier, size });
                }
            }
        }
        entries
    }

    fn tier_dir(&self, tier: Tier) -> &Path {
        match tier {
            Tier::Main => &self.main_dir,
            Tier::Volatile => &self.volatile_dir,
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shotdb_core::NoopObserver;
    use tempfile::TempDir;

    fn sid(n: u16) -> SignalId {
        SignalId::new(n).unwrap()
    }

    fn name() -> ShotName {
        ShotName::parse("240115E01").unwrap()
    }

    fn create_shot(main: &TempDir, vol: &TempDir, params: NewShotParams) -> Shot {
        Shot::create(name(), main.path(), vol.path(), "test", true, params).unwrap()
    }

    fn header_for(shot: &Shot, id: SignalId, len: u64) -> SignalHeader {
        SignalHeader::new(shot.name(), id, len, 100)
    }

    #[test]
    fn test_create_materializes_marker() {
        let (main, vol) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let shot = create_shot(&main, &vol, NewShotParams::default());
        assert!(shot.is_newly_created());
        assert!(layout::shot_header_file(shot.main_dir()).exists());
        // Re-opening finds it.
        let reopened = Shot::open(name(), main.path(), vol.path(), "test", true).unwrap();
        assert!(!reopened.is_newly_created());
    }

    #[test]
    fn test_put_then_get_roundtrip() {
        let (main, vol) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let shot = create_shot(&main, &vol, NewShotParams::default());
        let payload = vec![7u8; 100];
        let header = header_for(&shot, sid(12), 100);
        shot.put_trace(Tier::Main, &header, &payload, &NoopObserver)
            .unwrap();

        let mut reader = shot
            .get_trace_reader(ReadTarget::Trace(sid(12)))
            .unwrap();
        let bytes = reader.read_to_end().unwrap();
        assert_eq!(&bytes[bytes.len() - 100..], &payload[..]);
    }

    #[test]
    fn test_put_rejects_size_mismatch_before_files() {
        let (main, vol) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let shot = create_shot(&main, &vol, NewShotParams::default());
        let header = header_for(&shot, sid(12), 50);
        let err = shot
            .put_trace(Tier::Main, &header, &[0u8; 40], &NoopObserver)
            .unwrap_err();
        assert!(matches!(err, ShotError::Format(_)));
        // No file was created and the cache state is untouched.
        assert!(!layout::signal_file(shot.main_dir(), sid(12), DATA_EXT).exists());
        assert!(!layout::signal_file(shot.main_dir(), sid(12), TEMP_EXT).exists());
        assert!(shot.signal_ids().is_empty());
    }

    #[test]
    fn test_expected_signal_waits_then_serves() {
        let (main, vol) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let params = NewShotParams {
            expected: vec![sid(12)],
            ..Default::default()
        };
        let shot = create_shot(&main, &vol, params);

        let reader = shot.get_trace_reader(ReadTarget::Trace(sid(12))).unwrap();
        assert!(reader.is_wait());

        let header = header_for(&shot, sid(12), 3);
        shot.put_trace(Tier::Main, &header, b"abc", &NoopObserver)
            .unwrap();
        let reader = shot.get_trace_reader(ReadTarget::Trace(sid(12))).unwrap();
        assert!(!reader.is_wait());
    }

    #[test]
    fn test_monitor_sees_waiting_flag() {
        use std::sync::Mutex as StdMutex;

        #[derive(Default)]
        struct Recording(StdMutex<Vec<(u16, bool, bool)>>);
        impl ChangeMonitor for Recording {
            fn signal_changed(&self, signal: SignalId, was_waiting: bool, was_removed: bool) {
                self.0
                    .lock()
                    .unwrap()
                    .push((signal.index(), was_waiting, was_removed));
            }
        }

        let (main, vol) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let params = NewShotParams {
            expected: vec![sid(5)],
            ..Default::default()
        };
        let shot = create_shot(&main, &vol, params);
        let monitor = Recording::default();

        let header = header_for(&shot, sid(5), 1);
        shot.put_trace(Tier::Main, &header, b"x", &monitor).unwrap();
        let header = header_for(&shot, sid(6), 1);
        shot.put_trace(Tier::Main, &header, b"y", &monitor).unwrap();

        let events = monitor.0.lock().unwrap().clone();
        assert_eq!(events, vec![(5, true, false), (6, false, false)]);
    }

    #[test]
    fn test_delete_trace_volatile_only() {
        let (main, vol) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let shot = create_shot(&main, &vol, NewShotParams::default());
        let header = header_for(&shot, sid(9), 4);
        shot.put_trace(Tier::Volatile, &header, b"data", &NoopObserver)
            .unwrap();

        shot.delete_trace(sid(9), &NoopObserver).unwrap();
        assert!(!layout::signal_file(shot.volatile_dir(), sid(9), DATA_EXT).exists());
        assert!(layout::signal_file(shot.volatile_dir(), sid(9), ERASED_EXT).exists());
        assert!(shot.signal_ids().is_empty());

        let err = shot.delete_trace(sid(9), &NoopObserver).unwrap_err();
        assert!(matches!(err, ShotError::SignalNotFound { .. }));
    }

    #[test]
    fn test_detached_shot_rejects_everything() {
        let (main, vol) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let shot = create_shot(&main, &vol, NewShotParams::default());
        shot.detach();
        let header = SignalHeader::new(&name(), sid(1), 0, 0);
        let err = shot
            .put_trace(Tier::Main, &header, b"", &NoopObserver)
            .unwrap_err();
        assert!(matches!(err, ShotError::Detached(_)));
        assert!(shot
            .get_trace_reader(ReadTarget::Trace(sid(1)))
            .is_err());
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let (main, vol) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        create_shot(&main, &vol, NewShotParams::default());
        let shot = Shot::open(name(), main.path(), vol.path(), "replica", false).unwrap();
        let header = SignalHeader::new(&name(), sid(1), 1, 0);
        let err = shot
            .put_trace(Tier::Main, &header, b"x", &NoopObserver)
            .unwrap_err();
        assert!(matches!(err, ShotError::ReadOnly(_)));
    }

    #[test]
    fn test_pack_directory_lists_both_tiers() {
        let (main, vol) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let shot = create_shot(&main, &vol, NewShotParams::default());
        let header = header_for(&shot, sid(1), 2);
        shot.put_trace(Tier::Main, &header, b"ab", &NoopObserver)
            .unwrap();
        let header = header_for(&shot, sid(2), 3);
        shot.put_trace(Tier::Volatile, &header, b"abc", &NoopObserver)
            .unwrap();

        let entries = shot.pack_directory();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].tier, Tier::Main);
        assert_eq!(entries[1].tier, Tier::Volatile);
        assert!(entries.iter().all(|e| e.size > 0));
    }

    #[test]
    fn test_refcount_and_idle() {
        let (main, vol) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let shot = create_shot(&main, &vol, NewShotParams::default());
        shot.acquire();
        shot.acquire();
        assert_eq!(shot.refcount(), 2);
        assert!(shot.idle_for().is_none());
        shot.release();
        shot.release();
        assert_eq!(shot.refcount(), 0);
        assert!(shot.idle_for().is_some());
    }

    #[test]
    fn test_signal_list_synthetic_read() {
        let (main, vol) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let shot = create_shot(&main, &vol, NewShotParams::default());
        for n in [3u16, 12, 700] {
            let header = header_for(&shot, sid(n), 1);
            shot.put_trace(Tier::Main, &header, b"z", &NoopObserver)
                .unwrap();
        }
        let mut reader = shot.get_trace_reader(ReadTarget::SignalList).unwrap();
        let bytes = reader.read_to_end().unwrap();
        assert_eq!(bytes.len(), 4 + 3 * 2);
    }

    #[test]
    fn test_shot_header_synthetic_read() {
        let (main, vol) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let shot = create_shot(
            &main,
            &vol,
            NewShotParams {
                program: "daq-main".into(),
                ..Default::default()
            },
        );
        let mut reader = shot.get_trace_reader(ReadTarget::ShotHeader).unwrap();
        let bytes = reader.read_to_end().unwrap();
        let header = ShotHeader::read_from(&mut &bytes[..]).unwrap();
        assert_eq!(header.program, "daq-main");
        assert_eq!(header.shot, "240115E01");
    }
}
