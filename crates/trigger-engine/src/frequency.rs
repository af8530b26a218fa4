//! Frequency store
//!
//! Answers "may trigger X fire under policy P?" and records fires, using the
//! durable tier for `once` and the session tier for `session`. The store, not
//! the detector, is authoritative: two engines built at different times over
//! the same storage share suppression.
//!
//! # Failure behavior
//!
//! An absent tier, or a tier that errors on read, fails open (`may_fire`
//! returns `true`). Write errors are logged and swallowed.
//!
//! # Concurrency
//!
//! On multi-threaded hosts fire decisions are serialized per storage key with
//! a process-wide in-flight marker, scoped by the storage instance the record
//! lives in. Engines sharing storage therefore share the marker. A second
//! attempt on a key that is mid-fire is dropped instead of blocking, so a
//! callback that re-enters the engine cannot deadlock.

use chrono::Utc;
use dashmap::DashSet;
use lazy_static::lazy_static;
use shared::FrequencyPolicy;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::dispatch::TriggerId;
use crate::storage::{KeyValueStorage, StorageTiers};

#[cfg(feature = "metrics")]
use metrics::counter;

/// Prefix of every persisted frequency record
pub const STORAGE_KEY_PREFIX: &str = "feedback_widget_";

/// Storage key for a trigger (`feedback_widget_trigger_<index>`)
pub fn storage_key(trigger_id: TriggerId) -> String {
    format!("{}{}", STORAGE_KEY_PREFIX, trigger_id)
}

lazy_static! {
    /// `(storage scope, key)` pairs with a fire decision in progress
    static ref IN_FLIGHT: DashSet<(usize, String)> = DashSet::new();
}

/// Persisted firing policy enforcement
#[derive(Debug, Default)]
pub struct FrequencyStore {
    tiers: StorageTiers,
}

impl FrequencyStore {
    /// Create a new frequency store over the given tiers
    pub fn new(tiers: StorageTiers) -> Self {
        Self { tiers }
    }

    /// Whether the trigger may fire under the policy
    pub fn may_fire(&self, trigger_id: TriggerId, policy: FrequencyPolicy) -> bool {
        let Some(storage) = self.tier(policy) else {
            // `always`, or capability absent: fail open
            return true;
        };

        let key = storage_key(trigger_id);
        match storage.get(&key) {
            Ok(Some(fired_at)) => {
                debug!(
                    trigger_id = %trigger_id,
                    policy = %policy,
                    fired_at = %fired_at,
                    "Frequency record exists, suppressing"
                );
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!(
                    trigger_id = %trigger_id,
                    policy = %policy,
                    error = %e,
                    "Failed to read frequency record, failing open"
                );
                #[cfg(feature = "metrics")]
                counter!("trigger_storage_errors_total", "operation" => "read").increment(1);
                true
            }
        }
    }

    /// Record that the trigger fired now
    pub fn mark_fired(&self, trigger_id: TriggerId, policy: FrequencyPolicy) {
        let Some(storage) = self.tier(policy) else {
            return;
        };

        let key = storage_key(trigger_id);
        let timestamp = Utc::now().timestamp_millis().to_string();

        match storage.set(&key, &timestamp) {
            Ok(()) => debug!(trigger_id = %trigger_id, policy = %policy, "Frequency record written"),
            Err(e) => {
                warn!(
                    trigger_id = %trigger_id,
                    policy = %policy,
                    error = %e,
                    "Failed to write frequency record"
                );
                #[cfg(feature = "metrics")]
                counter!("trigger_storage_errors_total", "operation" => "write").increment(1);
            }
        }
    }

    /// Claim the trigger's key for one fire decision
    ///
    /// Returns `None` while another decision for the same key in the same
    /// storage is in flight, from this store or any other.
    pub fn begin(&self, trigger_id: TriggerId, policy: FrequencyPolicy) -> Option<FireGuard<'_>> {
        let scope = match self.tier(policy) {
            Some(storage) => Arc::as_ptr(storage) as *const () as usize,
            // Nothing recorded: only this store's own re-entrance matters
            None => self as *const Self as usize,
        };

        let claim = (scope, storage_key(trigger_id));
        if IN_FLIGHT.insert(claim.clone()) {
            Some(FireGuard {
                claim,
                _store: PhantomData,
            })
        } else {
            debug!(trigger_id = %trigger_id, policy = %policy, "Fire already in flight for key, dropping");
            None
        }
    }

    fn tier(&self, policy: FrequencyPolicy) -> Option<&Arc<dyn KeyValueStorage>> {
        match policy {
            FrequencyPolicy::Once => self.tiers.durable.as_ref(),
            FrequencyPolicy::Session => self.tiers.session.as_ref(),
            FrequencyPolicy::Always => None,
        }
    }
}

/// Releases the per-key in-flight marker on drop
pub struct FireGuard<'a> {
    claim: (usize, String),
    _store: PhantomData<&'a FrequencyStore>,
}

impl Drop for FireGuard<'_> {
    fn drop(&mut self) {
        IN_FLIGHT.remove(&self.claim);
    }
}
