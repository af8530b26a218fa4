//! Shared helpers for engine integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trigger_engine::{HistoryPlatform, PushHook};

/// Callback that counts activations
#[derive(Clone, Default)]
pub struct FireCounter(Arc<AtomicUsize>);

impl FireCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> impl Fn() + Send + Sync + 'static {
        let count = self.0.clone();
        move || {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// History platform that records interception changes
#[derive(Default)]
pub struct RecordingHistory {
    pub intercepts: AtomicUsize,
    pub restores: AtomicUsize,
    hook: Mutex<Option<PushHook>>,
}

impl RecordingHistory {
    /// Simulate a programmatic push; reaches the engines only while intercepted
    pub fn push(&self, path: &str) {
        let hook = self.hook.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook(path.to_string());
        }
    }

    pub fn intercepts(&self) -> usize {
        self.intercepts.load(Ordering::SeqCst)
    }

    pub fn restores(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }
}

impl HistoryPlatform for RecordingHistory {
    fn intercept_push(&self, on_push: PushHook) {
        self.intercepts.fetch_add(1, Ordering::SeqCst);
        *self.hook.lock().unwrap() = Some(on_push);
    }

    fn restore_push(&self) {
        self.restores.fetch_add(1, Ordering::SeqCst);
        *self.hook.lock().unwrap() = None;
    }
}

/// Let detector tasks drain their queues (advances paused time by 1ms)
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
