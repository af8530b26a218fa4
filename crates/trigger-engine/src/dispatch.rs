//! Trigger identity and the dispatch path
//!
//! Every detector funnels its fire decisions through [`Dispatcher::fire_if_eligible`]:
//! frequency check, host callback, frequency record, in that order.

use shared::FrequencyPolicy;
use std::fmt;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::frequency::FrequencyStore;

#[cfg(feature = "metrics")]
use metrics::counter;

/// Host sink invoked with no payload when any trigger fires
pub type DispatchCallback = Arc<dyn Fn() + Send + Sync>;

/// Stable trigger identity: ordinal position in the declared trigger list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriggerId(usize);

impl TriggerId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trigger_{}", self.0)
    }
}

/// Shared dispatch state for one engine
#[derive(Clone)]
pub(crate) struct Dispatcher {
    callback: Arc<RwLock<Option<DispatchCallback>>>,
    frequency: Arc<FrequencyStore>,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub(crate) fn new(frequency: Arc<FrequencyStore>, cancel: CancellationToken) -> Self {
        Self {
            callback: Arc::new(RwLock::new(None)),
            frequency,
            cancel,
        }
    }

    /// Install (or replace) the callback for every trigger
    pub(crate) fn set_callback(&self, callback: DispatchCallback) {
        let mut slot = self.callback.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(callback);
    }

    pub(crate) fn clear_callback(&self) {
        let mut slot = self.callback.write().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fire the trigger if its policy allows; returns whether the callback ran
    ///
    /// A suppressed or callback-less fire is dropped silently and writes no
    /// frequency record.
    pub(crate) fn fire_if_eligible(&self, trigger_id: TriggerId, policy: FrequencyPolicy) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        let Some(_guard) = self.frequency.begin(trigger_id, policy) else {
            return false;
        };

        if !self.frequency.may_fire(trigger_id, policy) {
            debug!(trigger_id = %trigger_id, policy = %policy, "Trigger suppressed by frequency policy");
            #[cfg(feature = "metrics")]
            counter!("trigger_suppressed_total", "policy" => policy.to_string()).increment(1);
            return false;
        }

        let callback = {
            let slot = self.callback.read().unwrap_or_else(|e| e.into_inner());
            slot.clone()
        };
        let Some(callback) = callback else {
            debug!(trigger_id = %trigger_id, "No dispatch callback registered, dropping fire");
            return false;
        };

        // Teardown may have raced with the decision above.
        if self.cancel.is_cancelled() {
            return false;
        }

        callback();
        self.frequency.mark_fired(trigger_id, policy);

        #[cfg(feature = "metrics")]
        counter!("trigger_fires_total", "policy" => policy.to_string()).increment(1);

        info!(trigger_id = %trigger_id, policy = %policy, "Trigger fired");
        true
    }
}
