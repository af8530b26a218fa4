//! Trigger detectors
//!
//! One detector per declared trigger, polymorphic over [`TriggerKind`]:
//! - Simple: page, time, scroll, exit-intent, element-click
//! - Rage click: repeated clicks clustered by element or position
//! - Confused navigation: weak signals accumulated into a confusion score
//! - Data layer event: debounced matching of instrumentation pushes
//!
//! Detectors are plain state machines. They never dispatch, sleep or touch
//! storage themselves; the runner feeds them timestamped observations and acts
//! on the returned [`Step`]. This keeps every algorithm testable with explicit
//! instants.

pub mod confused_navigation;
pub mod data_layer_event;
pub mod rage_click;
pub mod simple;

use serde_json::Value;
use shared::{TriggerKind, TriggerSpec};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::dispatch::TriggerId;
use crate::error::EngineError;
use crate::selector::Selector;
use crate::signal::{Signal, SignalKind};
use crate::tag_manager::TagManagerRuntime;

pub use confused_navigation::ConfusedNavigationDetector;
pub use data_layer_event::DataLayerEventDetector;
pub use rage_click::RageClickDetector;
pub use simple::{
    ElementClickDetector, ExitIntentDetector, PageDetector, ScrollDetector, TimeDetector,
};

/// What the runner should do after an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep observing
    Idle,
    /// Attempt a fire and keep observing
    Fire,
    /// Attempt a fire, then stop (remove listeners)
    FireAndStop,
    /// Stop without firing
    Stop,
}

/// Common detector contract
pub trait Detector: Send {
    fn kind(&self) -> TriggerKind;

    /// Signal kinds this detector listens to
    fn interests(&self) -> &'static [SignalKind];

    /// Data layer collection this detector subscribes to, if any
    fn data_layer(&self) -> Option<&str> {
        None
    }

    fn on_activate(&mut self, _now: Instant) -> Step {
        Step::Idle
    }

    fn on_signal(&mut self, signal: &Signal, at: Instant) -> Step;

    /// An entry appended to the subscribed data layer
    fn on_data_layer_entry(&mut self, _entry: &Value, _at: Instant) -> Step {
        Step::Idle
    }

    /// Called once the instant returned by [`Detector::next_deadline`] passes
    fn on_timer(&mut self, _now: Instant) -> Step {
        Step::Idle
    }

    /// Earliest pending timer, interval tick or debounce
    fn next_deadline(&self) -> Option<Instant> {
        None
    }
}

/// Page capabilities the factory needs to pick a detector's behavior
pub struct BuildContext<'a> {
    pub initial_path: &'a str,
    pub tag_manager: Option<Arc<dyn TagManagerRuntime>>,
    pub tag_manager_poll_interval: Duration,
}

/// Build the detector for one spec
///
/// Returns `Ok(None)` for kinds that never observe anything (`manual`), and an
/// error when the trigger has a configuration defect.
pub fn build_detector(
    trigger_id: TriggerId,
    spec: &TriggerSpec,
    ctx: &BuildContext<'_>,
) -> Result<Option<Box<dyn Detector>>, EngineError> {
    if let Some(defect) = spec.defects().into_iter().next() {
        return Err(EngineError::invalid_spec(trigger_id, spec.kind, defect));
    }

    let c = &spec.conditions;
    let detector: Box<dyn Detector> = match spec.kind {
        TriggerKind::Manual => return Ok(None),
        TriggerKind::Time => Box::new(TimeDetector::new(Duration::from_millis(c.time_delay_ms()))),
        TriggerKind::Scroll => Box::new(ScrollDetector::new(c.scroll_percentage())),
        TriggerKind::ExitIntent => Box::new(ExitIntentDetector::new()),
        TriggerKind::ElementClick => {
            let selector = parse_selector(c.element_selector.as_deref().unwrap_or_default())?;
            Box::new(ElementClickDetector::new(selector))
        }
        TriggerKind::Page => {
            let detector = PageDetector::new(c.pages(), ctx.initial_path)
                .map_err(|e| {
                    EngineError::invalid_spec(trigger_id, spec.kind, format!("Invalid page pattern: {}", e))
                })?;
            Box::new(detector)
        }
        TriggerKind::RageClick => {
            let conditions = c.rage_click.clone().unwrap_or_default();
            let target = conditions
                .element_selector
                .as_deref()
                .map(parse_selector)
                .transpose()?;
            let excludes = conditions
                .exclude_selectors
                .iter()
                .map(|s| parse_selector(s))
                .collect::<Result<Vec<_>, _>>()?;
            Box::new(RageClickDetector::new(&conditions, target, excludes))
        }
        TriggerKind::ConfusedNavigation => {
            let conditions = c.confused_navigation.clone().unwrap_or_default();
            Box::new(ConfusedNavigationDetector::new(&conditions))
        }
        TriggerKind::DatalayerEvent => {
            let conditions = c.data_layer_event.clone().ok_or_else(|| {
                EngineError::invalid_spec(trigger_id, spec.kind, "dataLayerEvent is required")
            })?;
            let mut detector = DataLayerEventDetector::new(conditions);
            if let Some(runtime) = &ctx.tag_manager {
                detector = detector.with_tag_manager(runtime.clone(), ctx.tag_manager_poll_interval);
            }
            Box::new(detector)
        }
    };

    Ok(Some(detector))
}

fn parse_selector(source: &str) -> Result<Selector, EngineError> {
    Selector::parse(source).map_err(|e| EngineError::Selector {
        selector: source.to_string(),
        source: e,
    })
}
