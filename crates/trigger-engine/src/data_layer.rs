//! Observable instrumentation collections ("data layers")
//!
//! A [`DataLayer`] is an append-only, externally writable list of JSON events.
//! Engines never mutate or replace it; they attach a subscription to its
//! append operation and detach it on teardown.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;

#[derive(Default)]
struct DataLayerInner {
    entries: Vec<Value>,
    subscribers: Vec<(u64, UnboundedSender<Value>)>,
    next_subscriber_id: u64,
}

/// Cloneable handle to one named collection
#[derive(Clone, Default)]
pub struct DataLayer {
    inner: Arc<Mutex<DataLayerInner>>,
}

impl DataLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and notify every subscriber
    pub fn push(&self, entry: Value) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.push(entry.clone());
        inner
            .subscribers
            .retain(|(_, tx)| tx.send(entry.clone()).is_ok());
        trace!(
            entries = inner.entries.len(),
            subscribers = inner.subscribers.len(),
            "Data layer push"
        );
    }

    /// Snapshot of every entry pushed so far
    pub fn entries(&self) -> Vec<Value> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.clone()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscriber_count(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.subscribers.len()
    }

    /// Existing entries plus a subscription to every later append
    ///
    /// Snapshot and registration happen under one lock, so no push is lost or
    /// seen twice.
    pub fn subscribe(&self) -> (Vec<Value>, DataLayerSubscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        inner.subscribers.push((id, tx));

        let snapshot = inner.entries.clone();
        let subscription = DataLayerSubscription {
            id,
            layer: Arc::downgrade(&self.inner),
            rx,
        };
        (snapshot, subscription)
    }
}

impl std::fmt::Debug for DataLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLayer")
            .field("entries", &self.len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Receiver side of a data layer subscription; detaches on drop
pub struct DataLayerSubscription {
    id: u64,
    layer: Weak<Mutex<DataLayerInner>>,
    rx: UnboundedReceiver<Value>,
}

impl DataLayerSubscription {
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }
}

impl Drop for DataLayerSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.layer.upgrade() {
            let mut inner = inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Named collections available on the page
#[derive(Clone, Default, Debug)]
pub struct DataLayerRegistry {
    layers: Arc<Mutex<HashMap<String, DataLayer>>>,
}

impl DataLayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing collection or a fresh empty one registered under `name`
    pub fn get_or_create(&self, name: &str) -> DataLayer {
        let mut layers = self.layers.lock().unwrap_or_else(|e| e.into_inner());
        layers.entry(name.to_string()).or_default().clone()
    }

    pub fn get(&self, name: &str) -> Option<DataLayer> {
        let layers = self.layers.lock().unwrap_or_else(|e| e.into_inner());
        layers.get(name).cloned()
    }
}
