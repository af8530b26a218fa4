//! Trigger Detection Engine
//!
//! Observes a live stream of user-interaction signals and decides, per
//! declared trigger, when a feedback prompt should be activated. Each trigger
//! fires at most as often as its frequency policy allows.
//!
//! # Architecture
//!
//! ```text
//! host signals ───► TriggerEngine::dispatch ──┐
//!                                             ├──► listener table ──► detector tasks
//! history pushes ─► NavigationObserver ───────┘                          │
//!                                                                        │
//! data layers ────► subscriptions ───────────────────────────────────────┤
//!                                                                        ▼
//!                                   FrequencyStore ◄── Dispatcher ──► host callback
//! ```
//!
//! # Example
//!
//! ```no_run
//! use shared::{TriggerKind, TriggerSpec};
//! use trigger_engine::{PageContext, Signal, TriggerEngine};
//!
//! # async fn demo() -> Result<(), trigger_engine::EngineError> {
//! let specs = vec![TriggerSpec::new(TriggerKind::Scroll)];
//! let engine = TriggerEngine::start(specs, PageContext::new("/pricing"))?;
//! engine.register_callback(|| println!("show feedback prompt"));
//!
//! engine.dispatch(Signal::scroll(1200.0, 3000.0, 900.0));
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod data_layer;
pub mod detectors;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod frequency;
pub mod navigation;
pub mod selector;
pub mod signal;
pub mod storage;
pub mod tag_manager;

mod runner;

pub use data_layer::{DataLayer, DataLayerRegistry, DataLayerSubscription};
pub use dispatch::{DispatchCallback, TriggerId};
pub use engine::{PageContext, TriggerEngine};
pub use error::EngineError;
pub use frequency::{storage_key, FrequencyStore};
pub use navigation::{
    HistoryPlatform, NavigationLease, NavigationObserver, NavigationSink, PushHook,
};
pub use selector::{Selector, SelectorError};
pub use signal::{ElementSnapshot, NavigationKind, Signal, SignalKind};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError, StorageTiers};
pub use tag_manager::TagManagerRuntime;
