//! Teardown leaves nothing behind

mod common;

use common::{advance, settle, FireCounter, RecordingHistory};
use serde_json::json;
use shared::{FrequencyPolicy, TriggerSpec};
use std::sync::Arc;
use trigger_engine::{
    DataLayerRegistry, ElementSnapshot, HistoryPlatform, NavigationKind, NavigationObserver,
    PageContext, Signal, TriggerEngine,
};

fn every_kind() -> Vec<TriggerSpec> {
    let specs: Vec<TriggerSpec> = serde_json::from_value(json!([
        { "type": "page", "conditions": { "pages": ["/checkout*"] } },
        { "type": "time", "conditions": { "timeDelay": 100 } },
        { "type": "scroll" },
        { "type": "exit-intent" },
        { "type": "element-click", "conditions": { "elementSelector": "button" } },
        { "type": "manual" },
        { "type": "rage-click" },
        { "type": "confused-navigation" },
        { "type": "datalayer-event", "conditions": { "dataLayerEvent": { "eventName": "cart_abandon", "debounceTime": 50 } } }
    ]))
    .unwrap();

    specs
        .into_iter()
        .map(|s| s.with_frequency(FrequencyPolicy::Always))
        .collect()
}

fn provoke(engine: &TriggerEngine) {
    let button = ElementSnapshot::new(1, "button");
    for _ in 0..3 {
        engine.dispatch(Signal::click(button.clone(), 0.0, 0.0));
    }
    engine.dispatch(Signal::scroll(5000.0, 5000.0, 1000.0));
    engine.dispatch(Signal::PointerLeave { client_y: 0.0 });
    for kind in [NavigationKind::Pop, NavigationKind::Push, NavigationKind::Pop, NavigationKind::Push] {
        engine.dispatch(Signal::navigation("/checkout", kind));
    }
}

#[tokio::test(start_paused = true)]
async fn test_nothing_fires_after_deactivate_all() {
    let registry = DataLayerRegistry::new();
    let layer = registry.get_or_create("dataLayer");
    let history = Arc::new(RecordingHistory::default());
    let platform: Arc<dyn HistoryPlatform> = history.clone();
    let fires = FireCounter::new();

    let engine = TriggerEngine::start_with_callback(
        every_kind(),
        PageContext::new("/")
            .with_data_layers(registry)
            .with_history(platform.clone()),
        fires.callback(),
    )
    .unwrap();
    assert!(engine.is_active());
    assert_eq!(engine.live_detector_count(), 8);
    assert_eq!(NavigationObserver::active_leases(&platform), 1);

    engine.deactivate_all();

    assert!(!engine.is_active());
    assert_eq!(engine.live_listener_count(), 0);
    assert_eq!(NavigationObserver::active_leases(&platform), 0);
    assert_eq!(history.restores(), 1);

    provoke(&engine);
    layer.push(json!({ "event": "cart_abandon" }));
    assert!(!engine.fire_manually(5));
    advance(60_000).await;

    assert_eq!(fires.count(), 0);
    assert_eq!(engine.live_detector_count(), 0);
    assert_eq!(layer.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_awaits_every_task() {
    let registry = DataLayerRegistry::new();
    let layer = registry.get_or_create("dataLayer");
    let engine = TriggerEngine::start(every_kind(), PageContext::new("/").with_data_layers(registry))
        .unwrap();
    settle().await;

    engine.shutdown().await;

    assert_eq!(engine.live_detector_count(), 0);
    assert_eq!(engine.live_listener_count(), 0);
    assert_eq!(layer.subscriber_count(), 0);

    // Idempotent
    engine.deactivate_all();
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_drop_releases_everything() {
    let registry = DataLayerRegistry::new();
    let layer = registry.get_or_create("dataLayer");
    let history = Arc::new(RecordingHistory::default());
    let fires = FireCounter::new();

    let engine = TriggerEngine::start_with_callback(
        every_kind(),
        PageContext::new("/")
            .with_data_layers(registry)
            .with_history(history.clone()),
        fires.callback(),
    )
    .unwrap();
    drop(engine);

    layer.push(json!({ "event": "cart_abandon" }));
    advance(60_000).await;

    assert_eq!(fires.count(), 0);
    assert_eq!(history.restores(), 1);
    assert_eq!(layer.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_cycles_leave_no_listeners() {
    let registry = DataLayerRegistry::new();
    let layer = registry.get_or_create("dataLayer");
    let history = Arc::new(RecordingHistory::default());

    for _ in 0..5 {
        let engine = TriggerEngine::start(
            every_kind(),
            PageContext::new("/")
                .with_data_layers(registry.clone())
                .with_history(history.clone()),
        )
        .unwrap();
        engine.dispatch(Signal::scroll(10.0, 5000.0, 1000.0));
        settle().await;
        engine.shutdown().await;
    }

    assert_eq!(history.intercepts(), 5);
    assert_eq!(history.restores(), 5);
    assert_eq!(layer.subscriber_count(), 0);
    assert!(layer.is_empty());
}
