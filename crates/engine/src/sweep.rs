//! Background sweep thread
//!
//! One sweep thread runs per database instance. Each wake it evicts idle
//! shots and refreshes the operator status line. The sleep is sliced so a
//! stop request takes effect within a fraction of a second rather than a
//! full interval; an eviction pass already underway finishes normally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info};

use crate::database::DbInstance;

/// Sleep slice granularity of the sweep loop.
const SLEEP_SLICE: Duration = Duration::from_millis(250);

/// Handle owning one running sweep thread.
#[derive(Debug)]
pub struct Sweeper {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl Sweeper {
    /// Spawn the sweep thread for one instance.
    pub fn start(db: Arc<DbInstance>, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let name = format!("sweep-{}", db.name());
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                debug!(db = db.name(), "sweep thread started");
                loop {
                    let mut slept = Duration::ZERO;
                    while slept < interval {
                        if thread_stop.load(Ordering::Acquire) || db.is_shutting_down() {
                            debug!(db = db.name(), "sweep thread exiting");
                            return;
                        }
                        let slice = SLEEP_SLICE.min(interval - slept);
                        std::thread::sleep(slice);
                        slept += slice;
                    }
                    db.evict_tick();
                    db.refresh_status();
                }
            })
            .ok();
        if handle.is_none() {
            info!(thread = %name, "sweep thread could not be spawned");
        }
        Self { handle, stop }
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.stop_inner();
    }

    fn stop_inner(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop_inner();
    }
}
