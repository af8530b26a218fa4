//! Engine-level behavior of the single-condition triggers

mod common;

use common::{advance, settle, FireCounter, RecordingHistory};
use shared::{FrequencyPolicy, TriggerConditions, TriggerKind, TriggerSpec};
use std::sync::Arc;
use trigger_engine::{
    ElementSnapshot, HistoryPlatform, NavigationKind, PageContext, Signal, TriggerEngine,
};

fn spec(kind: TriggerKind, conditions: TriggerConditions) -> TriggerSpec {
    TriggerSpec::new(kind)
        .with_conditions(conditions)
        .with_frequency(FrequencyPolicy::Always)
}

// ============================================================================
// Time
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_time_trigger_fires_once_after_delay() {
    let fires = FireCounter::new();
    let engine = TriggerEngine::start_with_callback(
        vec![spec(
            TriggerKind::Time,
            TriggerConditions {
                time_delay: Some(100),
                ..Default::default()
            },
        )],
        PageContext::new("/"),
        fires.callback(),
    )
    .unwrap();

    advance(99).await;
    assert_eq!(fires.count(), 0, "fired before the delay elapsed");

    advance(2).await;
    assert_eq!(fires.count(), 1);

    advance(10_000).await;
    assert_eq!(fires.count(), 1);
    assert_eq!(engine.live_detector_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_default_time_delay_is_five_seconds() {
    let fires = FireCounter::new();
    let _engine = TriggerEngine::start_with_callback(
        vec![TriggerSpec::new(TriggerKind::Time)],
        PageContext::new("/"),
        fires.callback(),
    )
    .unwrap();

    advance(4_990).await;
    assert_eq!(fires.count(), 0);
    advance(20).await;
    assert_eq!(fires.count(), 1);
}

// ============================================================================
// Scroll and exit intent
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_scroll_trigger_stops_listening_after_fire() {
    let fires = FireCounter::new();
    let engine = TriggerEngine::start_with_callback(
        vec![spec(
            TriggerKind::Scroll,
            TriggerConditions {
                scroll_percentage: Some(75.0),
                ..Default::default()
            },
        )],
        PageContext::new("/"),
        fires.callback(),
    )
    .unwrap();
    assert_eq!(engine.live_listener_count(), 1);

    engine.dispatch(Signal::scroll(500.0, 2000.0, 1000.0));
    settle().await;
    assert_eq!(fires.count(), 0);

    engine.dispatch(Signal::scroll(800.0, 2000.0, 1000.0));
    settle().await;
    assert_eq!(fires.count(), 1);

    engine.dispatch(Signal::scroll(1000.0, 2000.0, 1000.0));
    settle().await;
    assert_eq!(fires.count(), 1);
    assert_eq!(engine.live_listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_exit_intent_fires_on_top_exit_only() {
    let fires = FireCounter::new();
    let engine = TriggerEngine::start_with_callback(
        vec![spec(TriggerKind::ExitIntent, TriggerConditions::default())],
        PageContext::new("/"),
        fires.callback(),
    )
    .unwrap();

    engine.dispatch(Signal::PointerLeave { client_y: 420.0 });
    settle().await;
    assert_eq!(fires.count(), 0);

    engine.dispatch(Signal::PointerLeave { client_y: 0.0 });
    engine.dispatch(Signal::PointerLeave { client_y: -10.0 });
    settle().await;
    assert_eq!(fires.count(), 1);
}

// ============================================================================
// Element click
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_element_click_fires_for_each_matching_click() {
    let fires = FireCounter::new();
    let engine = TriggerEngine::start_with_callback(
        vec![spec(
            TriggerKind::ElementClick,
            TriggerConditions {
                element_selector: Some("button.feedback, #help".to_string()),
                ..Default::default()
            },
        )],
        PageContext::new("/"),
        fires.callback(),
    )
    .unwrap();

    let feedback = ElementSnapshot::new(1, "button").with_class("feedback");
    let help = ElementSnapshot::new(2, "a").with_id("help");
    let other = ElementSnapshot::new(3, "button");

    engine.dispatch(Signal::click(feedback, 0.0, 0.0));
    engine.dispatch(Signal::click(other, 0.0, 0.0));
    engine.dispatch(Signal::click(help, 0.0, 0.0));
    settle().await;

    assert_eq!(fires.count(), 2);
}

// ============================================================================
// Page
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_page_trigger_checks_load_and_navigation() {
    let fires = FireCounter::new();
    let history = Arc::new(RecordingHistory::default());
    let engine = TriggerEngine::start_with_callback(
        vec![spec(
            TriggerKind::Page,
            TriggerConditions {
                pages: Some(vec!["/checkout*".to_string(), "/help".to_string()]),
                ..Default::default()
            },
        )],
        PageContext::new("/help").with_history(history.clone()),
        fires.callback(),
    )
    .unwrap();

    settle().await;
    assert_eq!(fires.count(), 1, "load check");
    assert_eq!(history.intercepts(), 1);

    engine.dispatch(Signal::navigation("/catalog", NavigationKind::Push));
    engine.dispatch(Signal::navigation("/checkout/payment", NavigationKind::Push));
    engine.dispatch(Signal::navigation("/help", NavigationKind::Pop));
    settle().await;
    assert_eq!(fires.count(), 3);

    engine.shutdown().await;
    assert_eq!(history.restores(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_platform_push_alone_rechecks_page_trigger() {
    let fires = FireCounter::new();
    let history = Arc::new(RecordingHistory::default());
    let engine = TriggerEngine::start_with_callback(
        vec![spec(
            TriggerKind::Page,
            TriggerConditions {
                pages: Some(vec!["/checkout*".to_string()]),
                ..Default::default()
            },
        )],
        PageContext::new("/").with_history(history.clone()),
        fires.callback(),
    )
    .unwrap();
    settle().await;
    assert_eq!(fires.count(), 0);

    // No host dispatch: only the intercepted push
    history.push("/catalog");
    history.push("/checkout/payment");
    settle().await;
    assert_eq!(fires.count(), 1);

    engine.shutdown().await;
    history.push("/checkout/review");
    settle().await;
    assert_eq!(fires.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_platform_push_feeds_confused_navigation() {
    let fires = FireCounter::new();
    let history = Arc::new(RecordingHistory::default());
    let engine = TriggerEngine::start_with_callback(
        vec![spec(TriggerKind::ConfusedNavigation, TriggerConditions::default())],
        PageContext::new("/").with_history(history.clone()),
        fires.callback(),
    )
    .unwrap();
    settle().await;

    // Pushes from the platform interleaved with host back navigations
    engine.dispatch(Signal::navigation("/a", NavigationKind::Pop));
    history.push("/b");
    engine.dispatch(Signal::navigation("/a", NavigationKind::Pop));
    history.push("/b");
    settle().await;

    assert_eq!(fires.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_page_trigger_follows_forwarded_navigation_without_history() {
    let fires = FireCounter::new();
    let engine = TriggerEngine::start_with_callback(
        vec![spec(
            TriggerKind::Page,
            TriggerConditions {
                pages: Some(vec!["/help".to_string()]),
                ..Default::default()
            },
        )],
        PageContext::new("/"),
        fires.callback(),
    )
    .unwrap();

    settle().await;
    assert_eq!(fires.count(), 0);
    assert_eq!(engine.live_listener_count(), 1);

    engine.dispatch(Signal::navigation("/help", NavigationKind::Pop));
    settle().await;
    assert_eq!(fires.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_page_glob_matches_anywhere_in_path() {
    let fires = FireCounter::new();
    let _engine = TriggerEngine::start_with_callback(
        vec![spec(
            TriggerKind::Page,
            TriggerConditions {
                pages: Some(vec!["/blog*".to_string()]),
                ..Default::default()
            },
        )],
        PageContext::new("/en/blog/post"),
        fires.callback(),
    )
    .unwrap();

    settle().await;
    assert_eq!(fires.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_engines_share_one_navigation_interception() {
    let history = Arc::new(RecordingHistory::default());
    let platform: Arc<dyn HistoryPlatform> = history.clone();
    let page = vec![TriggerSpec::new(TriggerKind::Page)];

    let first = TriggerEngine::start(page.clone(), PageContext::new("/").with_history(platform.clone()))
        .unwrap();
    let second = TriggerEngine::start(page, PageContext::new("/").with_history(platform.clone()))
        .unwrap();
    assert_eq!(history.intercepts(), 1);

    drop(first);
    assert_eq!(history.restores(), 0);
    drop(second);
    assert_eq!(history.restores(), 1);

    // Engines without navigation-observing triggers take no lease
    let _time_only = TriggerEngine::start(
        vec![TriggerSpec::new(TriggerKind::Time)],
        PageContext::new("/").with_history(platform),
    )
    .unwrap();
    assert_eq!(history.intercepts(), 1);
}

// ============================================================================
// Manual
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_manual_fire_respects_frequency_and_bounds() {
    let fires = FireCounter::new();
    let engine = TriggerEngine::start(
        vec![
            TriggerSpec::new(TriggerKind::Manual).with_frequency(FrequencyPolicy::Session),
            TriggerSpec::new(TriggerKind::ElementClick).with_frequency(FrequencyPolicy::Always),
        ],
        PageContext::new("/"),
    )
    .unwrap();

    // No callback yet: dropped, nothing recorded
    assert!(!engine.fire_manually(0));

    engine.register_callback(fires.callback());
    assert!(engine.fire_manually(0));
    assert!(!engine.fire_manually(0));

    // Detector failed to activate (no selector) but the trigger still has an identity
    assert!(engine.fire_manually(1));
    assert!(engine.fire_manually(1));

    assert!(!engine.fire_manually(2));
    assert_eq!(fires.count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_reregistering_replaces_callback() {
    let first = FireCounter::new();
    let second = FireCounter::new();
    let engine = TriggerEngine::start(
        vec![TriggerSpec::new(TriggerKind::Manual).with_frequency(FrequencyPolicy::Always)],
        PageContext::new("/"),
    )
    .unwrap();

    engine.register_callback(first.callback());
    engine.fire_manually(0);
    engine.register_callback(second.callback());
    engine.fire_manually(0);

    assert_eq!(first.count(), 1);
    assert_eq!(second.count(), 1);
}
