//! Trigger engine: registry, lifecycle and signal fan-out
//!
//! The engine owns the ordered detector list built from the trigger specs.
//! Each active detector runs as its own task; the engine keeps a listener table
//! of per-detector channels and fans every dispatched [`Signal`] out to the
//! detectors that declared interest in its kind. Programmatic pushes observed
//! through the navigation lease enter the same table as
//! [`NavigationKind::Push`] signals.
//!
//! # Teardown
//!
//! [`TriggerEngine::deactivate_all`] cancels the engine token, clears the
//! listener table and the callback, aborts every task, and releases the
//! navigation lease. After it returns no signal, timer or data layer push can
//! reach the callback. [`TriggerEngine::shutdown`] additionally waits for the
//! tasks to exit. Dropping the engine deactivates it.

use shared::config::EngineConfig;
use shared::TriggerSpec;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::data_layer::DataLayerRegistry;
use crate::detectors::{build_detector, BuildContext};
use crate::dispatch::{DispatchCallback, Dispatcher, TriggerId};
use crate::error::EngineError;
use crate::frequency::FrequencyStore;
use crate::navigation::{HistoryPlatform, NavigationLease, NavigationObserver, NavigationSink};
use crate::runner::{DetectorTask, Observation};
use crate::signal::{NavigationKind, Signal, SignalKind};
use crate::storage::{FileStorage, KeyValueStorage, StorageTiers};
use crate::tag_manager::TagManagerRuntime;

/// Explicit page context handed to an engine at construction
///
/// Everything the engine may touch on the page lives here; there is no hidden
/// process-wide widget state.
pub struct PageContext {
    pub storage: StorageTiers,
    pub history: Option<Arc<dyn HistoryPlatform>>,
    pub data_layers: DataLayerRegistry,
    pub tag_manager: Option<Arc<dyn TagManagerRuntime>>,
    /// Path the page was loaded at
    pub initial_path: String,
    pub engine: EngineConfig,
}

impl PageContext {
    /// Context with in-memory storage and no optional capabilities
    pub fn new(initial_path: impl Into<String>) -> Self {
        Self {
            storage: StorageTiers::in_memory(),
            history: None,
            data_layers: DataLayerRegistry::new(),
            tag_manager: None,
            initial_path: initial_path.into(),
            engine: EngineConfig::default(),
        }
    }

    pub fn with_storage(mut self, storage: StorageTiers) -> Self {
        self.storage = storage;
        self
    }

    /// Durable tier backed by a JSON file; the session tier is kept
    pub fn with_durable_file(mut self, path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let durable: Arc<dyn KeyValueStorage> = Arc::new(FileStorage::open(path)?);
        self.storage.durable = Some(durable);
        Ok(self)
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryPlatform>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_data_layers(mut self, data_layers: DataLayerRegistry) -> Self {
        self.data_layers = data_layers;
        self
    }

    pub fn with_tag_manager(mut self, tag_manager: Arc<dyn TagManagerRuntime>) -> Self {
        self.tag_manager = Some(tag_manager);
        self
    }

    pub fn with_engine_config(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }
}

struct Listener {
    trigger_id: TriggerId,
    interests: &'static [SignalKind],
    tx: UnboundedSender<Observation>,
}

/// Per-detector channels, shared with the navigation sink
#[derive(Clone)]
struct ListenerTable(Arc<Mutex<Vec<Listener>>>);

impl ListenerTable {
    fn new(listeners: Vec<Listener>) -> Self {
        Self(Arc::new(Mutex::new(listeners)))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Listener>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Send the signal to every interested listener, pruning closed ones
    fn fan_out(&self, signal: Signal) {
        let at = Instant::now();
        let kind = signal.kind();
        let mut listeners = self.lock();

        listeners.retain(|l| !l.tx.is_closed());
        let mut delivered = 0usize;
        for listener in listeners.iter().filter(|l| l.interests.contains(&kind)) {
            if listener.tx.send((signal.clone(), at)).is_ok() {
                delivered += 1;
            } else {
                trace!(trigger_id = %listener.trigger_id, "Listener closed during dispatch");
            }
        }

        trace!(kind = ?kind, delivered = delivered, "Signal dispatched");
    }

    fn clear(&self) {
        self.lock().clear();
    }

    fn live(&self) -> usize {
        self.lock().iter().filter(|l| !l.tx.is_closed()).count()
    }
}

/// The trigger detection engine for one page
pub struct TriggerEngine {
    specs: Vec<TriggerSpec>,
    dispatcher: Dispatcher,
    listeners: ListenerTable,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    navigation: Mutex<Option<NavigationLease>>,
    cancel: CancellationToken,
}

impl TriggerEngine {
    /// Build and activate one detector per spec
    ///
    /// A spec with a configuration defect only disables its own detector.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoRuntime`] when called outside a tokio runtime.
    pub fn start(specs: Vec<TriggerSpec>, ctx: PageContext) -> Result<Self, EngineError> {
        Self::build(specs, ctx, None)
    }

    /// Like [`TriggerEngine::start`], with the callback installed before any
    /// detector activates (so an immediate `page` match is not dropped)
    pub fn start_with_callback<F>(
        specs: Vec<TriggerSpec>,
        ctx: PageContext,
        callback: F,
    ) -> Result<Self, EngineError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(specs, ctx, Some(Arc::new(callback)))
    }

    fn build(
        specs: Vec<TriggerSpec>,
        ctx: PageContext,
        callback: Option<DispatchCallback>,
    ) -> Result<Self, EngineError> {
        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;

        let cancel = CancellationToken::new();
        let frequency = Arc::new(FrequencyStore::new(ctx.storage));
        let dispatcher = Dispatcher::new(frequency, cancel.clone());
        if let Some(callback) = callback {
            dispatcher.set_callback(callback);
        }

        let build_ctx = BuildContext {
            initial_path: &ctx.initial_path,
            tag_manager: ctx.tag_manager.clone(),
            tag_manager_poll_interval: ctx.engine.tag_manager_poll_interval(),
        };

        let mut listeners = Vec::new();
        let mut tasks = Vec::new();
        let mut needs_navigation = false;

        for (index, spec) in specs.iter().enumerate() {
            let trigger_id = TriggerId::new(index);

            let detector = match build_detector(trigger_id, spec, &build_ctx) {
                Ok(Some(detector)) => detector,
                Ok(None) => {
                    debug!(trigger_id = %trigger_id, kind = %spec.kind, "Trigger fires manually only");
                    continue;
                }
                Err(e) => {
                    warn!(
                        trigger_id = %trigger_id,
                        kind = %spec.kind,
                        error = %e,
                        "Trigger not activated"
                    );
                    continue;
                }
            };

            needs_navigation |= spec.kind.observes_navigation();

            let interests = detector.interests();
            let signals = if interests.is_empty() {
                None
            } else {
                let (tx, rx) = mpsc::unbounded_channel();
                listeners.push(Listener {
                    trigger_id,
                    interests,
                    tx,
                });
                Some(rx)
            };

            let (backlog, data_layer) = match detector.data_layer() {
                Some(name) => {
                    let (backlog, subscription) = ctx.data_layers.get_or_create(name).subscribe();
                    (backlog, Some(subscription))
                }
                None => (Vec::new(), None),
            };

            info!(trigger_id = %trigger_id, kind = %spec.kind, policy = %spec.frequency(), "Trigger activated");

            let task = DetectorTask {
                trigger_id,
                policy: spec.frequency(),
                detector,
                signals,
                backlog,
                data_layer,
                dispatcher: dispatcher.clone(),
                cancel: cancel.clone(),
            };
            tasks.push(runtime.spawn(task.run()));
        }

        let listeners = ListenerTable::new(listeners);

        let navigation = match (&ctx.history, needs_navigation) {
            (Some(history), true) => {
                let table = listeners.clone();
                let token = cancel.clone();
                let sink: NavigationSink = Arc::new(move |path: &str| {
                    if !token.is_cancelled() {
                        table.fan_out(Signal::navigation(path, NavigationKind::Push));
                    }
                });
                Some(NavigationObserver::acquire(history.clone(), sink))
            }
            _ => None,
        };

        info!(
            triggers = specs.len(),
            detectors = tasks.len(),
            observes_navigation = navigation.is_some(),
            "Trigger engine started"
        );

        Ok(Self {
            specs,
            dispatcher,
            listeners,
            tasks: Mutex::new(tasks),
            navigation: Mutex::new(navigation),
            cancel,
        })
    }

    /// Install (or replace) the callback invoked when any trigger fires
    pub fn register_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.cancel.is_cancelled() {
            debug!("Engine deactivated, ignoring callback registration");
            return;
        }
        self.dispatcher.set_callback(Arc::new(callback));
    }

    /// Fire a trigger by index, bypassing its detection condition
    ///
    /// The frequency policy still applies. Returns whether the callback ran;
    /// an out-of-range index is a no-op.
    pub fn fire_manually(&self, index: usize) -> bool {
        let Some(spec) = self.specs.get(index) else {
            debug!(index = index, triggers = self.specs.len(), "Manual fire for unknown trigger ignored");
            return false;
        };

        self.dispatcher
            .fire_if_eligible(TriggerId::new(index), spec.frequency())
    }

    /// Hand a host signal to every interested detector
    pub fn dispatch(&self, signal: Signal) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.listeners.fan_out(signal);
    }

    /// Stop every detector and release every host resource; idempotent
    pub fn deactivate_all(&self) {
        if self.cancel.is_cancelled() {
            return;
        }

        self.cancel.cancel();
        self.dispatcher.clear_callback();

        self.listeners.clear();

        let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        for task in tasks.iter() {
            task.abort();
        }
        drop(tasks);

        if let Some(mut lease) = self
            .navigation
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            lease.release();
        }

        info!(triggers = self.specs.len(), "Trigger engine deactivated");
    }

    /// Deactivate and wait for every detector task to exit
    pub async fn shutdown(&self) {
        self.deactivate_all();

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for task in tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Detector task failed");
                }
            }
        }
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Identities of every declared trigger, active or not
    pub fn trigger_ids(&self) -> Vec<TriggerId> {
        (0..self.specs.len()).map(TriggerId::new).collect()
    }

    pub fn specs(&self) -> &[TriggerSpec] {
        &self.specs
    }

    /// Listener table entries whose detector is still receiving
    pub fn live_listener_count(&self) -> usize {
        self.listeners.live()
    }

    /// Detector tasks that have not exited yet
    pub fn live_detector_count(&self) -> usize {
        let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.iter().filter(|t| !t.is_finished()).count()
    }
}

impl Drop for TriggerEngine {
    fn drop(&mut self) {
        self.deactivate_all();
    }
}
