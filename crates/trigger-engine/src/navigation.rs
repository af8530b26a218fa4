//! Process-wide navigation observer
//!
//! Observing programmatic navigation means intercepting the platform's history
//! push operation, which is a process-wide side effect. All engines share one
//! interception per platform through reference-counted leases:
//!
//! ```text
//! first lease   -> platform.intercept_push(hook)
//! more leases   -> sink registered
//! hook(path)    -> every leased sink
//! last release  -> platform.restore_push()
//! ```
//!
//! Repeated engine create/destroy cycles therefore never double-wrap the push
//! operation and always leave the platform as they found it.

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, trace};

/// Called by the platform with the destination path of every programmatic push
pub type PushHook = Arc<dyn Fn(String) + Send + Sync>;

/// Per-lease receiver of observed push paths
pub type NavigationSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Host history capability
pub trait HistoryPlatform: Send + Sync {
    /// Start forwarding programmatic pushes to `on_push`
    ///
    /// Must not call `on_push` before returning.
    fn intercept_push(&self, on_push: PushHook);

    /// Put the original push operation back and drop the hook
    fn restore_push(&self);
}

struct Interception {
    platform: Arc<dyn HistoryPlatform>,
    sinks: HashMap<u64, NavigationSink>,
}

lazy_static! {
    static ref INTERCEPTIONS: Mutex<HashMap<usize, Interception>> = Mutex::new(HashMap::new());
}

static NEXT_LEASE_ID: AtomicU64 = AtomicU64::new(0);

fn platform_key(platform: &Arc<dyn HistoryPlatform>) -> usize {
    Arc::as_ptr(platform) as *const () as usize
}

/// Facade over the process-wide interception registry
pub struct NavigationObserver;

impl NavigationObserver {
    /// Take a lease on the platform's push interception, installing it if needed
    ///
    /// `sink` receives every push path until the lease is released.
    pub fn acquire(platform: Arc<dyn HistoryPlatform>, sink: NavigationSink) -> NavigationLease {
        let key = platform_key(&platform);
        let id = NEXT_LEASE_ID.fetch_add(1, Ordering::Relaxed);
        let mut registry = INTERCEPTIONS.lock().unwrap_or_else(|e| e.into_inner());

        match registry.get_mut(&key) {
            Some(entry) => {
                entry.sinks.insert(id, sink);
                debug!(leases = entry.sinks.len(), "Reusing navigation interception");
            }
            None => {
                platform.intercept_push(Arc::new(move |path: String| Self::notify(key, &path)));
                info!("Installed navigation interception");
                registry.insert(
                    key,
                    Interception {
                        platform,
                        sinks: HashMap::from([(id, sink)]),
                    },
                );
            }
        }

        NavigationLease {
            key,
            id,
            released: false,
        }
    }

    /// Live leases on the platform's interception
    pub fn active_leases(platform: &Arc<dyn HistoryPlatform>) -> usize {
        let registry = INTERCEPTIONS.lock().unwrap_or_else(|e| e.into_inner());
        registry
            .get(&platform_key(platform))
            .map_or(0, |entry| entry.sinks.len())
    }

    fn notify(key: usize, path: &str) {
        // Sinks run outside the registry lock
        let sinks: Vec<NavigationSink> = {
            let registry = INTERCEPTIONS.lock().unwrap_or_else(|e| e.into_inner());
            registry
                .get(&key)
                .map(|entry| entry.sinks.values().cloned().collect())
                .unwrap_or_default()
        };

        trace!(path = %path, sinks = sinks.len(), "Programmatic navigation observed");
        for sink in sinks {
            sink(path);
        }
    }

    fn release(key: usize, id: u64) {
        let mut registry = INTERCEPTIONS.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = registry.get_mut(&key) else {
            return;
        };

        entry.sinks.remove(&id);
        if entry.sinks.is_empty() {
            if let Some(entry) = registry.remove(&key) {
                entry.platform.restore_push();
                info!("Restored original navigation push");
            }
        } else {
            debug!(leases = entry.sinks.len(), "Released navigation lease");
        }
    }
}

/// An engine's claim on the navigation interception; releases on drop
#[derive(Debug)]
pub struct NavigationLease {
    key: usize,
    id: u64,
    released: bool,
}

impl NavigationLease {
    /// Release explicitly; later calls and the drop are no-ops
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            NavigationObserver::release(self.key, self.id);
        }
    }
}

impl Drop for NavigationLease {
    fn drop(&mut self) {
        self.release();
    }
}
