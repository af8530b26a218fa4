//! Tag-manager polling fallback
//!
//! Some pages route instrumentation through a third-party tag-management
//! runtime instead of (or in addition to) the data layer. When such a runtime
//! is present, data layer detectors poll it as a secondary channel:
//!
//! - **Primary path**: data layer append subscription
//! - **Fallback path**: poll the runtime's event list every interval
//!
//! The fallback is best-effort. Read failures are logged and ignored; they
//! never disable the primary channel.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Floor for the polling interval; a zero interval would spin the detector task
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Third-party tag-management runtime exposed by the host
pub trait TagManagerRuntime: Send + Sync {
    /// Every event the runtime has recorded, oldest first
    fn events(&self) -> anyhow::Result<Vec<Value>>;
}

/// Cursor-based poller; each runtime entry is handed out at most once
pub(crate) struct TagManagerPoller {
    runtime: Arc<dyn TagManagerRuntime>,
    interval: Duration,
    cursor: usize,
    next_poll: Instant,
    failures: u64,
}

impl TagManagerPoller {
    pub(crate) fn new(runtime: Arc<dyn TagManagerRuntime>, interval: Duration, now: Instant) -> Self {
        let interval = interval.max(MIN_POLL_INTERVAL);
        Self {
            runtime,
            interval,
            cursor: 0,
            next_poll: now + interval,
            failures: 0,
        }
    }

    pub(crate) fn next_deadline(&self) -> Instant {
        self.next_poll
    }

    /// Entries recorded since the previous poll
    pub(crate) fn poll(&mut self, now: Instant) -> Vec<Value> {
        self.next_poll = now + self.interval;

        let events = match self.runtime.events() {
            Ok(events) => events,
            Err(e) => {
                self.failures += 1;
                debug!(
                    error = %e,
                    failures = self.failures,
                    "Tag manager poll failed, ignoring"
                );
                return Vec::new();
            }
        };

        if events.len() < self.cursor {
            // Runtime history was reset; skip what it already replayed.
            debug!(
                cursor = self.cursor,
                len = events.len(),
                "Tag manager history shrank, resetting cursor"
            );
            self.cursor = events.len();
            return Vec::new();
        }

        let fresh: Vec<Value> = events.into_iter().skip(self.cursor).collect();
        self.cursor += fresh.len();
        trace!(fresh = fresh.len(), cursor = self.cursor, "Tag manager poll");
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use mockall::Sequence;
    use serde_json::json;

    mock! {
        pub Runtime {}

        impl TagManagerRuntime for Runtime {
            fn events(&self) -> anyhow::Result<Vec<Value>>;
        }
    }

    #[test]
    fn test_cursor_hands_out_each_entry_once() {
        let mut runtime = MockRuntime::new();
        let mut seq = Sequence::new();
        runtime
            .expect_events()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![json!({ "event": "a" })]));
        runtime
            .expect_events()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![json!({ "event": "a" }), json!({ "event": "b" })]));

        let t0 = Instant::now();
        let mut poller = TagManagerPoller::new(Arc::new(runtime), Duration::from_secs(1), t0);
        assert_eq!(poller.next_deadline(), t0 + Duration::from_secs(1));

        assert_eq!(poller.poll(t0 + Duration::from_secs(1)), vec![json!({ "event": "a" })]);
        assert_eq!(poller.poll(t0 + Duration::from_secs(2)), vec![json!({ "event": "b" })]);
        assert_eq!(poller.next_deadline(), t0 + Duration::from_secs(3));
    }

    #[test]
    fn test_errors_are_swallowed() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_events()
            .returning(|| Err(anyhow::anyhow!("runtime not ready")));

        let t0 = Instant::now();
        let mut poller = TagManagerPoller::new(Arc::new(runtime), Duration::from_millis(500), t0);
        assert!(poller.poll(t0).is_empty());
        assert!(poller.poll(t0).is_empty());
        assert_eq!(poller.failures, 2);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let mut runtime = MockRuntime::new();
        runtime.expect_events().returning(|| Ok(Vec::new()));

        let t0 = Instant::now();
        let mut poller = TagManagerPoller::new(Arc::new(runtime), Duration::ZERO, t0);
        assert_eq!(poller.next_deadline(), t0 + Duration::from_millis(1));

        poller.poll(t0 + Duration::from_millis(1));
        assert!(poller.next_deadline() > t0 + Duration::from_millis(1));
    }

    #[test]
    fn test_shrinking_history_resets_cursor() {
        let mut runtime = MockRuntime::new();
        let mut seq = Sequence::new();
        runtime
            .expect_events()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![json!(1), json!(2), json!(3)]));
        runtime
            .expect_events()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![json!(4)]));
        runtime
            .expect_events()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![json!(4), json!(5)]));

        let t0 = Instant::now();
        let mut poller = TagManagerPoller::new(Arc::new(runtime), Duration::from_secs(1), t0);
        assert_eq!(poller.poll(t0).len(), 3);
        assert!(poller.poll(t0).is_empty());
        assert_eq!(poller.poll(t0), vec![json!(5)]);
    }
}
