//! Detector task loop
//!
//! Each active detector runs as one task that owns its state exclusively.
//! The loop waits on, in priority order:
//!
//! 1. Engine cancellation
//! 2. Signals fanned out by the engine (timestamped at dispatch)
//! 3. Appends to the subscribed data layer
//! 4. The detector's next deadline
//!
//! Handlers never await, so every observation runs to completion before the
//! next one is taken.

use serde_json::Value;
use shared::FrequencyPolicy;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::data_layer::DataLayerSubscription;
use crate::detectors::{Detector, Step};
use crate::dispatch::{Dispatcher, TriggerId};
use crate::signal::Signal;

/// A signal stamped with its dispatch instant
pub(crate) type Observation = (Signal, Instant);

enum Wake {
    Cancelled,
    Signal(Option<Observation>),
    Entry(Option<Value>),
    Deadline,
}

pub(crate) struct DetectorTask {
    pub(crate) trigger_id: TriggerId,
    pub(crate) policy: FrequencyPolicy,
    pub(crate) detector: Box<dyn Detector>,
    pub(crate) signals: Option<UnboundedReceiver<Observation>>,
    /// Entries present when the subscription was taken
    pub(crate) backlog: Vec<Value>,
    pub(crate) data_layer: Option<DataLayerSubscription>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) cancel: CancellationToken,
}

impl DetectorTask {
    pub(crate) async fn run(mut self) {
        let kind = self.detector.kind();
        debug!(trigger_id = %self.trigger_id, kind = %kind, "Detector task started");

        if self.activate() {
            self.event_loop().await;
        }

        debug!(trigger_id = %self.trigger_id, kind = %kind, "Detector task stopped");
    }

    /// Returns whether the detector keeps observing
    fn activate(&mut self) -> bool {
        let now = Instant::now();
        let step = self.detector.on_activate(now);
        if !self.apply(step) {
            return false;
        }

        let backlog = std::mem::take(&mut self.backlog);
        if !backlog.is_empty() {
            debug!(
                trigger_id = %self.trigger_id,
                entries = backlog.len(),
                "Processing existing data layer entries"
            );
        }
        for entry in &backlog {
            let step = self.detector.on_data_layer_entry(entry, now);
            if !self.apply(step) {
                return false;
            }
        }
        true
    }

    async fn event_loop(&mut self) {
        loop {
            let deadline = self.detector.next_deadline();
            if self.signals.is_none() && self.data_layer.is_none() && deadline.is_none() {
                debug!(trigger_id = %self.trigger_id, "Detector has nothing left to observe");
                break;
            }

            let wake = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Wake::Cancelled,
                observation = next_signal(&mut self.signals) => Wake::Signal(observation),
                entry = next_entry(&mut self.data_layer) => Wake::Entry(entry),
                _ = sleep_until(deadline) => Wake::Deadline,
            };

            let step = match wake {
                Wake::Cancelled => break,
                Wake::Signal(Some((signal, at))) => self.detector.on_signal(&signal, at),
                Wake::Signal(None) => {
                    // Engine cleared the listener table
                    self.signals = None;
                    continue;
                }
                Wake::Entry(Some(entry)) => self.detector.on_data_layer_entry(&entry, Instant::now()),
                Wake::Entry(None) => {
                    self.data_layer = None;
                    continue;
                }
                Wake::Deadline => self.detector.on_timer(Instant::now()),
            };

            if !self.apply(step) {
                break;
            }
        }
    }

    /// Act on a step; returns whether the detector keeps observing
    fn apply(&self, step: Step) -> bool {
        if self.dispatcher.is_cancelled() {
            return false;
        }

        match step {
            Step::Idle => true,
            Step::Fire => {
                self.fire();
                true
            }
            Step::FireAndStop => {
                self.fire();
                info!(trigger_id = %self.trigger_id, "Detector condition met, removing listeners");
                false
            }
            Step::Stop => false,
        }
    }

    fn fire(&self) {
        self.dispatcher.fire_if_eligible(self.trigger_id, self.policy);
    }
}

async fn next_signal(signals: &mut Option<UnboundedReceiver<Observation>>) -> Option<Observation> {
    match signals {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_entry(subscription: &mut Option<DataLayerSubscription>) -> Option<Value> {
    match subscription {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
