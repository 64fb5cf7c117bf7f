//! Shot cache
//!
//! Maps shot names to live [`Shot`] objects for one database instance. The
//! top-level map lock is held for pointer manipulation only, never across
//! file I/O: a caller that must construct a shot inserts a placeholder,
//! drops the lock, does the disk work, then fills the placeholder in.
//! Other callers requesting the same name wait on a condition variable
//! that is notified exactly when construction completes (or fails), with a
//! bounded wait slice so shutdown is never missed.
//!
//! Eviction never touches a shot with a positive reference count,
//! regardless of idle time or cache pressure.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use shotdb_core::{ShotError, ShotName, ShotResult};
use shotdb_storage::{layout, NewShotParams, Shot};

/// Wait slice while another caller constructs the same shot.
const BUILD_WAIT_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug)]
enum Slot {
    /// A caller is constructing this shot; wait for the fill-in.
    Building,
    Ready(Arc<Shot>),
}

/// Reference-counted handle to a cached shot.
///
/// The shot's count was incremented when the handle was created and is
/// decremented when the handle drops; hold it only as long as the access
/// lasts so the shot becomes evictable again.
#[derive(Debug)]
pub struct ShotHandle {
    shot: Arc<Shot>,
}

impl Deref for ShotHandle {
    type Target = Shot;

    fn deref(&self) -> &Shot {
        &self.shot
    }
}

impl Drop for ShotHandle {
    fn drop(&mut self) {
        self.shot.release();
    }
}

/// Shot cache of one database instance.
#[derive(Debug)]
pub struct ShotCache {
    label: String,
    root: PathBuf,
    volatile_root: PathBuf,
    writable: bool,
    max_open: usize,
    dispose_delay: Duration,
    map: Mutex<HashMap<String, Slot>>,
    built: Condvar,
    shutdown: Arc<AtomicBool>,
}

impl ShotCache {
    /// Create an empty cache.
    pub fn new(
        label: &str,
        root: PathBuf,
        volatile_root: PathBuf,
        writable: bool,
        max_open: usize,
        dispose_delay: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            label: label.to_string(),
            root,
            volatile_root,
            writable,
            max_open,
            dispose_delay,
            map: Mutex::new(HashMap::new()),
            built: Condvar::new(),
            shutdown,
        }
    }

    /// Open a cached shot, load it from disk, or materialize a new one.
    ///
    /// Repeated calls for the same name return handles to the same
    /// underlying object. While another caller is constructing the shot,
    /// this call waits for the construction to finish instead of racing a
    /// duplicate.
    ///
    /// # Errors
    ///
    /// `NameInUse` when `create` targets an existing shot, `NotFound` when
    /// opening an absent one, `ReadOnly`, `ShuttingDown`, and I/O errors
    /// from construction.
    pub fn open_or_create(
        &self,
        name: &ShotName,
        create: bool,
        params: NewShotParams,
    ) -> ShotResult<ShotHandle> {
        let mut map = self.map.lock();
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return Err(ShotError::ShuttingDown);
            }
            match map.get(name.as_str()) {
                Some(Slot::Ready(shot)) => {
                    if create {
                        return Err(ShotError::NameInUse(name.as_str().to_string()));
                    }
                    shot.acquire();
                    return Ok(ShotHandle { shot: shot.clone() });
                }
                Some(Slot::Building) => {
                    self.built.wait_for(&mut map, BUILD_WAIT_SLICE);
                }
                None => break,
            }
        }
        map.insert(name.as_str().to_string(), Slot::Building);
        drop(map);

        // Disk work happens outside the map lock.
        let result = self.construct(name, create, params);

        let mut map = self.map.lock();
        let outcome = match result {
            Ok(shot) => {
                let shot = Arc::new(shot);
                shot.acquire();
                map.insert(name.as_str().to_string(), Slot::Ready(shot.clone()));
                Ok(ShotHandle { shot })
            }
            Err(e) => {
                map.remove(name.as_str());
                Err(e)
            }
        };
        self.built.notify_all();
        outcome
    }

    fn construct(&self, name: &ShotName, create: bool, params: NewShotParams) -> ShotResult<Shot> {
        let exists = layout::shot_header_file(&layout::shot_dir(&self.root, name)).exists();
        match (create, exists) {
            (true, true) => Err(ShotError::NameInUse(name.as_str().to_string())),
            (true, false) => Shot::create(
                name.clone(),
                &self.root,
                &self.volatile_root,
                &self.label,
                self.writable,
                params,
            ),
            (false, true) => Shot::open(
                name.clone(),
                &self.root,
                &self.volatile_root,
                &self.label,
                self.writable,
            ),
            (false, false) => Err(ShotError::NotFound(name.as_str().to_string())),
        }
    }

    /// True when the shot is currently cached and ready.
    pub fn contains(&self, name: &ShotName) -> bool {
        matches!(self.map.lock().get(name.as_str()), Some(Slot::Ready(_)))
    }

    /// Number of ready shots in the cache.
    pub fn open_count(&self) -> usize {
        self.map
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    /// Periodic eviction sweep.
    ///
    /// Evicts refcount-zero shots that are idle past the disposal delay,
    /// or (oldest-idle first) enough of them to get back under the
    /// max-open limit. With `force_all`, every refcount-zero shot goes.
    /// Referenced shots are never evicted.
    pub fn evict(&self, force_all: bool) {
        let mut closing: Vec<Arc<Shot>> = Vec::new();
        {
            let mut map = self.map.lock();
            let mut idle: Vec<(String, Duration)> = map
                .iter()
                .filter_map(|(name, slot)| match slot {
                    Slot::Ready(shot) => shot.idle_for().map(|d| (name.clone(), d)),
                    Slot::Building => None,
                })
                .collect();
            // Oldest idle first.
            idle.sort_by(|a, b| b.1.cmp(&a.1));

            let open = map
                .values()
                .filter(|slot| matches!(slot, Slot::Ready(_)))
                .count();
            let mut over_limit = open.saturating_sub(self.max_open);

            for (name, idle_for) in idle {
                let expired = idle_for >= self.dispose_delay;
                let for_pressure = over_limit > 0;
                if !(force_all || expired || for_pressure) {
                    continue;
                }
                if let Some(Slot::Ready(shot)) = map.remove(&name) {
                    // Guard against an acquire that raced the sweep.
                    if shot.refcount() > 0 {
                        map.insert(name, Slot::Ready(shot));
                        continue;
                    }
                    if !expired && !force_all {
                        over_limit = over_limit.saturating_sub(1);
                    }
                    closing.push(shot);
                }
            }
        }
        for shot in closing {
            debug!(db = %self.label, shot = shot.name().as_str(), "evicting idle shot");
            shot.detach();
        }
    }

    /// Force-evict everything idle and log what remains (shutdown path).
    pub fn close_all(&self) {
        self.evict(true);
        let remaining = self.open_count();
        if remaining > 0 {
            info!(db = %self.label, remaining, "shots still referenced at close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn name(raw: &str) -> ShotName {
        ShotName::parse(raw).unwrap()
    }

    fn cache(dir: &TempDir, max_open: usize, dispose_delay: Duration) -> ShotCache {
        ShotCache::new(
            "test",
            dir.path().join("data"),
            dir.path().join("vol"),
            true,
            max_open,
            dispose_delay,
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[test]
    fn test_create_then_open_same_object() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 64, Duration::from_secs(300));
        let a = cache
            .open_or_create(&name("240115E01"), true, NewShotParams::default())
            .unwrap();
        let b = cache
            .open_or_create(&name("240115E01"), false, NewShotParams::default())
            .unwrap();
        assert!(Arc::ptr_eq(&a.shot, &b.shot), "one object per name");
        assert_eq!(a.refcount(), 2);
        drop(b);
        assert_eq!(a.refcount(), 1);
    }

    #[test]
    fn test_create_collision() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 64, Duration::from_secs(300));
        let _a = cache
            .open_or_create(&name("240115E01"), true, NewShotParams::default())
            .unwrap();
        let err = cache
            .open_or_create(&name("240115E01"), true, NewShotParams::default())
            .unwrap_err();
        assert!(matches!(err, ShotError::NameInUse(_)));
    }

    #[test]
    fn test_open_absent_shot() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 64, Duration::from_secs(300));
        let err = cache
            .open_or_create(&name("240115E01"), false, NewShotParams::default())
            .unwrap_err();
        assert!(matches!(err, ShotError::NotFound(_)));
        assert_eq!(cache.open_count(), 0, "failed construction leaves no slot");
    }

    #[test]
    fn test_referenced_shot_never_evicted() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 0, Duration::from_secs(0));
        let handle = cache
            .open_or_create(&name("240115E01"), true, NewShotParams::default())
            .unwrap();
        // Zero idle delay, zero capacity, even force_all: still referenced.
        cache.evict(true);
        assert!(cache.contains(&name("240115E01")));
        assert!(!handle.is_detached());
    }

    #[test]
    fn test_idle_shot_evicted_after_delay() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 64, Duration::from_secs(0));
        let handle = cache
            .open_or_create(&name("240115E01"), true, NewShotParams::default())
            .unwrap();
        drop(handle);
        cache.evict(false);
        assert!(!cache.contains(&name("240115E01")));
    }

    #[test]
    fn test_pressure_evicts_oldest_idle_first() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 1, Duration::from_secs(3600));
        let a = cache
            .open_or_create(&name("240115E01"), true, NewShotParams::default())
            .unwrap();
        drop(a);
        std::thread::sleep(Duration::from_millis(20));
        let b = cache
            .open_or_create(&name("240115E02"), true, NewShotParams::default())
            .unwrap();
        drop(b);

        cache.evict(false);
        assert!(!cache.contains(&name("240115E01")), "oldest idle evicted");
        assert!(cache.contains(&name("240115E02")));
    }

    #[test]
    fn test_eviction_reload_from_disk() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, 64, Duration::from_secs(0));
        drop(
            cache
                .open_or_create(&name("240115E01"), true, NewShotParams::default())
                .unwrap(),
        );
        cache.evict(true);
        // The data survived; a fresh open loads it from disk.
        let handle = cache
            .open_or_create(&name("240115E01"), false, NewShotParams::default())
            .unwrap();
        assert!(!handle.is_newly_created());
    }

    #[test]
    fn test_concurrent_construction_waits() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(cache(&dir, 64, Duration::from_secs(300)));
        let mut threads = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            threads.push(std::thread::spawn(move || {
                cache.open_or_create(
                    &name("240115E01"),
                    false,
                    NewShotParams::default(),
                )
            }));
        }
        // Exactly one object regardless of who created it first.
        let _creator = cache
            .open_or_create(&name("240115E01"), true, NewShotParams::default())
            .unwrap();
        let mut ok = 0;
        for t in threads {
            if t.join().unwrap().is_ok() {
                ok += 1;
            }
        }
        // Openers that ran before the create see NotFound; the rest share
        // the one cached object.
        assert!(ok <= 4);
        assert_eq!(cache.open_count(), 1);
    }

    #[test]
    fn test_shutdown_rejects_open() {
        let dir = TempDir::new().unwrap();
        let shutdown = Arc::new(AtomicBool::new(true));
        let cache = ShotCache::new(
            "test",
            dir.path().join("data"),
            dir.path().join("vol"),
            true,
            64,
            Duration::from_secs(300),
            shutdown,
        );
        let err = cache
            .open_or_create(&name("240115E01"), true, NewShotParams::default())
            .unwrap_err();
        assert!(matches!(err, ShotError::ShuttingDown));
    }
}
