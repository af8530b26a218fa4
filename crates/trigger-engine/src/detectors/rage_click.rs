//! Rage-click detector
//!
//! Detects repeated, frustrated clicking on one spot.
//!
//! # Algorithm
//!
//! Maintains a sliding window of recent click samples. On every qualifying
//! click, samples older than the window are pruned and the click is appended.
//! Once the window holds at least `clickThreshold` samples, two groupings are
//! measured against the current click:
//!
//! - samples on the identical element
//! - samples within a 50px radius
//!
//! If either group reaches the threshold the detector fires and the window is
//! cleared, so one burst produces one fire.
//!
//! # Example
//!
//! ```json
//! {
//!   "type": "rage-click",
//!   "conditions": {
//!     "rageClick": {
//!       "clickThreshold": 3,
//!       "timeWindow": 2000,
//!       "excludeSelectors": [".carousel-next"]
//!     }
//!   }
//! }
//! ```

use shared::{RageClickConditions, TriggerKind};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::{Detector, Step};
use crate::selector::Selector;
use crate::signal::{ElementSnapshot, Signal, SignalKind};

pub const DEFAULT_CLICK_THRESHOLD: usize = 3;
pub const DEFAULT_TIME_WINDOW_MS: u64 = 2000;
/// Radius (px) within which clicks count as the same spot
pub const CLUSTER_RADIUS_PX: f64 = 50.0;

/// Tags treated as interactive when no element selector is configured
const INTERACTIVE_TAGS: &[&str] = &[
    "a", "button", "input", "select", "textarea", "label", "summary",
];

/// Whether an element looks clickable
pub fn is_interactive(element: &ElementSnapshot) -> bool {
    let tag = element.tag.to_ascii_lowercase();
    INTERACTIVE_TAGS.contains(&tag.as_str())
        || element.attributes.contains_key("onclick")
        || element.attributes.contains_key("role")
        || element.cursor.as_deref() == Some("pointer")
}

#[derive(Debug, Clone, Copy)]
struct ClickSample {
    node_id: u64,
    at: Instant,
    x: f64,
    y: f64,
}

impl ClickSample {
    fn distance_to(&self, x: f64, y: f64) -> f64 {
        ((self.x - x).powi(2) + (self.y - y).powi(2)).sqrt()
    }
}

pub struct RageClickDetector {
    threshold: usize,
    window: Duration,
    target: Option<Selector>,
    excludes: Vec<Selector>,
    samples: VecDeque<ClickSample>,
}

impl RageClickDetector {
    pub fn new(
        conditions: &RageClickConditions,
        target: Option<Selector>,
        excludes: Vec<Selector>,
    ) -> Self {
        Self {
            threshold: conditions.click_threshold.unwrap_or(DEFAULT_CLICK_THRESHOLD),
            window: Duration::from_millis(conditions.time_window.unwrap_or(DEFAULT_TIME_WINDOW_MS)),
            target,
            excludes,
            samples: VecDeque::new(),
        }
    }

    /// Samples currently in the window
    pub fn window_len(&self) -> usize {
        self.samples.len()
    }

    /// Element the click counts against, or `None` if the click is ignored
    fn resolve<'a>(&self, clicked: &'a ElementSnapshot) -> Option<&'a ElementSnapshot> {
        if self.excludes.iter().any(|s| s.closest(clicked).is_some()) {
            return None;
        }

        match &self.target {
            Some(selector) => selector.closest(clicked),
            None => std::iter::once(clicked)
                .chain(clicked.ancestors())
                .find(|e| is_interactive(e)),
        }
    }

    fn observe(&mut self, clicked: &ElementSnapshot, x: f64, y: f64, at: Instant) -> Step {
        let Some(element) = self.resolve(clicked) else {
            trace!(node_id = clicked.node_id, "Click ignored by rage-click filter");
            return Step::Idle;
        };
        let node_id = element.node_id;

        let before = self.samples.len();
        let window = self.window;
        self.samples
            .retain(|s| at.saturating_duration_since(s.at) <= window);
        let pruned = before - self.samples.len();
        if pruned > 0 {
            trace!(pruned = pruned, "Pruned old click samples");
        }

        self.samples.push_back(ClickSample { node_id, at, x, y });

        if self.samples.len() < self.threshold {
            return Step::Idle;
        }

        let same_element = self.samples.iter().filter(|s| s.node_id == node_id).count();
        let nearby = self
            .samples
            .iter()
            .filter(|s| s.distance_to(x, y) <= CLUSTER_RADIUS_PX)
            .count();

        debug!(
            samples = self.samples.len(),
            same_element = same_element,
            nearby = nearby,
            threshold = self.threshold,
            "Rage-click evaluation"
        );

        if same_element >= self.threshold || nearby >= self.threshold {
            self.samples.clear();
            Step::Fire
        } else {
            Step::Idle
        }
    }
}

impl Detector for RageClickDetector {
    fn kind(&self) -> TriggerKind {
        TriggerKind::RageClick
    }

    fn interests(&self) -> &'static [SignalKind] {
        &[SignalKind::Click]
    }

    fn on_signal(&mut self, signal: &Signal, at: Instant) -> Step {
        match signal {
            Signal::Click { target, x, y } => self.observe(target, *x, *y, at),
            _ => Step::Idle,
        }
    }
}
