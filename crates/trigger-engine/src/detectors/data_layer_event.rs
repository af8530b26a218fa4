//! Data layer event detector
//!
//! Fires when an instrumentation event pushed to a data layer matches a
//! declared shape. Observation sources, all funneled into one matcher:
//!
//! 1. Entries already in the collection when the detector activates
//! 2. Every later append (subscription, or `Signal::DataLayerPush`)
//! 3. Best-effort polling of a tag-manager runtime, when one is present
//!
//! Each match restarts a single debounce deadline; the detector fires when the
//! deadline passes without another match, so a burst collapses to one fire.

use serde_json::Value;
use shared::{DataLayerEventConditions, MatchType, TriggerKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::{Detector, Step};
use crate::signal::{Signal, SignalKind};
use crate::tag_manager::{TagManagerPoller, TagManagerRuntime};

pub const DEFAULT_DEBOUNCE_MS: u64 = 1000;

/// Whether an instrumentation entry matches the declared event
///
/// An empty `eventProperties` map is treated as "not declared".
pub fn matches_event(conditions: &DataLayerEventConditions, entry: &Value) -> bool {
    let Some(event) = entry.as_object() else {
        return false;
    };

    if event.get("event").and_then(Value::as_str) != Some(conditions.event_name.as_str()) {
        return false;
    }

    let properties = match &conditions.event_properties {
        Some(properties) if !properties.is_empty() => properties,
        _ => return true,
    };

    match conditions.match_type {
        MatchType::Exact => properties
            .iter()
            .all(|(key, expected)| event.get(key) == Some(expected)),
        MatchType::Partial => properties
            .iter()
            .any(|(key, expected)| event.get(key) == Some(expected)),
        MatchType::Exists => properties.keys().all(|key| event.contains_key(key)),
    }
}

pub struct DataLayerEventDetector {
    conditions: DataLayerEventConditions,
    debounce: Duration,
    pending: Option<Instant>,
    tag_manager: Option<(Arc<dyn TagManagerRuntime>, Duration)>,
    poller: Option<TagManagerPoller>,
}

impl DataLayerEventDetector {
    pub fn new(conditions: DataLayerEventConditions) -> Self {
        let debounce =
            Duration::from_millis(conditions.debounce_time.unwrap_or(DEFAULT_DEBOUNCE_MS));
        Self {
            conditions,
            debounce,
            pending: None,
            tag_manager: None,
            poller: None,
        }
    }

    /// Also poll a tag-manager runtime every `interval`
    pub fn with_tag_manager(mut self, runtime: Arc<dyn TagManagerRuntime>, interval: Duration) -> Self {
        self.tag_manager = Some((runtime, interval));
        self
    }

    /// Debounce deadline of the last match, if any is pending
    pub fn pending_fire(&self) -> Option<Instant> {
        self.pending
    }

    fn observe(&mut self, entry: &Value, at: Instant) {
        if !matches_event(&self.conditions, entry) {
            trace!(event_name = %self.conditions.event_name, "Data layer entry did not match");
            return;
        }

        let deadline = at + self.debounce;
        debug!(
            event_name = %self.conditions.event_name,
            restarted = self.pending.is_some(),
            "Data layer event matched, debouncing"
        );
        self.pending = Some(deadline);
    }
}

impl Detector for DataLayerEventDetector {
    fn kind(&self) -> TriggerKind {
        TriggerKind::DatalayerEvent
    }

    fn interests(&self) -> &'static [SignalKind] {
        &[SignalKind::DataLayerPush]
    }

    fn data_layer(&self) -> Option<&str> {
        Some(self.conditions.object_name())
    }

    fn on_activate(&mut self, now: Instant) -> Step {
        if let Some((runtime, interval)) = self.tag_manager.take() {
            self.poller = Some(TagManagerPoller::new(runtime, interval, now));
        }
        Step::Idle
    }

    fn on_signal(&mut self, signal: &Signal, at: Instant) -> Step {
        if let Signal::DataLayerPush { object_name, entry } = signal {
            if object_name == self.conditions.object_name() {
                self.observe(entry, at);
            }
        }
        Step::Idle
    }

    fn on_data_layer_entry(&mut self, entry: &Value, at: Instant) -> Step {
        self.observe(entry, at);
        Step::Idle
    }

    fn on_timer(&mut self, now: Instant) -> Step {
        let poll_due = self
            .poller
            .as_ref()
            .is_some_and(|p| now >= p.next_deadline());
        if poll_due {
            let fresh = self.poller.as_mut().map(|p| p.poll(now)).unwrap_or_default();
            for entry in &fresh {
                self.observe(entry, now);
            }
        }

        match self.pending {
            Some(deadline) if now >= deadline => {
                self.pending = None;
                Step::Fire
            }
            _ => Step::Idle,
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        let poll = self.poller.as_ref().map(TagManagerPoller::next_deadline);
        match (self.pending, poll) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}
