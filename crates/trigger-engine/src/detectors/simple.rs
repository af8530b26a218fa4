//! Single-condition detectors: page, time, scroll, exit-intent, element-click

use regex::Regex;
use shared::TriggerKind;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::{Detector, Step};
use crate::selector::Selector;
use crate::signal::{Signal, SignalKind};

// ============================================================================
// Time
// ============================================================================

/// Fires once after a fixed delay from activation
pub struct TimeDetector {
    delay: Duration,
    deadline: Option<Instant>,
}

impl TimeDetector {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }
}

impl Detector for TimeDetector {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Time
    }

    fn interests(&self) -> &'static [SignalKind] {
        &[]
    }

    fn on_activate(&mut self, now: Instant) -> Step {
        self.deadline = Some(now + self.delay);
        Step::Idle
    }

    fn on_signal(&mut self, _signal: &Signal, _at: Instant) -> Step {
        Step::Idle
    }

    fn on_timer(&mut self, now: Instant) -> Step {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                Step::FireAndStop
            }
            _ => Step::Idle,
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

// ============================================================================
// Scroll
// ============================================================================

/// Scroll depth in percent, `None` when the document cannot scroll
pub fn scroll_depth(scroll_top: f64, scroll_height: f64, viewport_height: f64) -> Option<f64> {
    let scrollable = scroll_height - viewport_height;
    if scrollable <= 0.0 {
        return None;
    }
    Some(scroll_top / scrollable * 100.0)
}

/// Fires once when scroll depth reaches the threshold, then stops listening
pub struct ScrollDetector {
    threshold: f64,
}

impl ScrollDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Detector for ScrollDetector {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Scroll
    }

    fn interests(&self) -> &'static [SignalKind] {
        &[SignalKind::Scroll]
    }

    fn on_signal(&mut self, signal: &Signal, _at: Instant) -> Step {
        let Signal::Scroll {
            scroll_top,
            scroll_height,
            viewport_height,
        } = signal
        else {
            return Step::Idle;
        };

        match scroll_depth(*scroll_top, *scroll_height, *viewport_height) {
            Some(depth) if depth >= self.threshold => {
                debug!(depth = depth, threshold = self.threshold, "Scroll threshold reached");
                Step::FireAndStop
            }
            _ => Step::Idle,
        }
    }
}

// ============================================================================
// Exit intent
// ============================================================================

/// Fires once when the pointer leaves through the top edge of the viewport
#[derive(Default)]
pub struct ExitIntentDetector;

impl ExitIntentDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Detector for ExitIntentDetector {
    fn kind(&self) -> TriggerKind {
        TriggerKind::ExitIntent
    }

    fn interests(&self) -> &'static [SignalKind] {
        &[SignalKind::PointerLeave]
    }

    fn on_signal(&mut self, signal: &Signal, _at: Instant) -> Step {
        match signal {
            Signal::PointerLeave { client_y } if *client_y <= 0.0 => Step::FireAndStop,
            _ => Step::Idle,
        }
    }
}

// ============================================================================
// Element click
// ============================================================================

/// Fires on every click whose target matches the selector
pub struct ElementClickDetector {
    selector: Selector,
}

impl ElementClickDetector {
    pub fn new(selector: Selector) -> Self {
        Self { selector }
    }
}

impl Detector for ElementClickDetector {
    fn kind(&self) -> TriggerKind {
        TriggerKind::ElementClick
    }

    fn interests(&self) -> &'static [SignalKind] {
        &[SignalKind::Click]
    }

    fn on_signal(&mut self, signal: &Signal, _at: Instant) -> Step {
        match signal {
            Signal::Click { target, .. } if self.selector.matches(target) => {
                trace!(selector = %self.selector, node_id = target.node_id, "Element click matched");
                Step::Fire
            }
            _ => Step::Idle,
        }
    }
}

// ============================================================================
// Page
// ============================================================================

/// One entry of a `pages` list
#[derive(Debug, Clone)]
pub enum PagePattern {
    /// No wildcard: the path must be equal
    Exact(String),
    /// `*` matches any run of characters; the pattern may match anywhere in the path
    Glob(Regex),
}

impl PagePattern {
    pub fn parse(pattern: &str) -> Result<Self, regex::Error> {
        if !pattern.contains('*') {
            return Ok(Self::Exact(pattern.to_string()));
        }

        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        Ok(Self::Glob(Regex::new(&body)?))
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == path,
            Self::Glob(regex) => regex.is_match(path),
        }
    }
}

/// Fires when the current path matches; re-checked on every navigation
///
/// Back/forward navigations arrive as host-dispatched signals. Programmatic
/// pushes arrive through the navigation observer when the page context has
/// a history platform.
pub struct PageDetector {
    patterns: Vec<PagePattern>,
    initial_path: String,
}

impl PageDetector {
    pub fn new(pages: &[String], initial_path: &str) -> Result<Self, regex::Error> {
        let patterns = pages
            .iter()
            .map(|p| PagePattern::parse(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            initial_path: initial_path.to_string(),
        })
    }

    /// Empty pattern list matches every path
    pub fn matches(&self, path: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.matches(path))
    }
}

impl Detector for PageDetector {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Page
    }

    fn interests(&self) -> &'static [SignalKind] {
        &[SignalKind::Navigation]
    }

    fn on_activate(&mut self, _now: Instant) -> Step {
        let matched = self.matches(&self.initial_path);
        debug!(path = %self.initial_path, matched = matched, "Page check on load");

        if matched {
            Step::Fire
        } else {
            Step::Idle
        }
    }

    fn on_signal(&mut self, signal: &Signal, _at: Instant) -> Step {
        let Signal::Navigation { path, kind } = signal else {
            return Step::Idle;
        };

        let matched = self.matches(path);
        debug!(path = %path, kind = ?kind, matched = matched, "Page check on navigation");
        if matched {
            Step::Fire
        } else {
            Step::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{ElementSnapshot, NavigationKind};

    // ========================================================================
    // Time
    // ========================================================================

    #[test]
    fn test_time_fires_once_at_deadline() {
        let t0 = Instant::now();
        let mut detector = TimeDetector::new(Duration::from_millis(100));

        assert_eq!(detector.next_deadline(), None);
        assert_eq!(detector.on_activate(t0), Step::Idle);
        assert_eq!(detector.next_deadline(), Some(t0 + Duration::from_millis(100)));

        assert_eq!(detector.on_timer(t0 + Duration::from_millis(99)), Step::Idle);
        assert_eq!(detector.on_timer(t0 + Duration::from_millis(100)), Step::FireAndStop);
        assert_eq!(detector.next_deadline(), None);
    }

    // ========================================================================
    // Scroll
    // ========================================================================

    #[test]
    fn test_scroll_depth() {
        assert_eq!(scroll_depth(500.0, 2000.0, 1000.0), Some(50.0));
        assert_eq!(scroll_depth(0.0, 800.0, 1000.0), None);
    }

    #[test]
    fn test_scroll_fires_at_threshold() {
        let t0 = Instant::now();
        let mut detector = ScrollDetector::new(50.0);

        assert_eq!(detector.on_signal(&Signal::scroll(400.0, 2000.0, 1000.0), t0), Step::Idle);
        assert_eq!(
            detector.on_signal(&Signal::scroll(500.0, 2000.0, 1000.0), t0),
            Step::FireAndStop
        );
    }

    // ========================================================================
    // Exit intent
    // ========================================================================

    #[test]
    fn test_exit_intent_requires_top_edge() {
        let t0 = Instant::now();
        let mut detector = ExitIntentDetector::new();

        assert_eq!(detector.on_signal(&Signal::PointerLeave { client_y: 300.0 }, t0), Step::Idle);
        assert_eq!(
            detector.on_signal(&Signal::PointerLeave { client_y: -4.0 }, t0),
            Step::FireAndStop
        );
    }

    // ========================================================================
    // Element click
    // ========================================================================

    #[test]
    fn test_element_click_fires_on_every_match() {
        let t0 = Instant::now();
        let mut detector = ElementClickDetector::new(Selector::parse("#help").unwrap());
        let help = ElementSnapshot::new(1, "button").with_id("help");
        let other = ElementSnapshot::new(2, "button").with_id("buy");

        assert_eq!(detector.on_signal(&Signal::click(help.clone(), 0.0, 0.0), t0), Step::Fire);
        assert_eq!(detector.on_signal(&Signal::click(other, 0.0, 0.0), t0), Step::Idle);
        assert_eq!(detector.on_signal(&Signal::click(help, 0.0, 0.0), t0), Step::Fire);
    }

    #[test]
    fn test_element_click_matches_target_only() {
        let t0 = Instant::now();
        let mut detector = ElementClickDetector::new(Selector::parse("button").unwrap());
        let icon = ElementSnapshot::new(2, "svg").with_parent(ElementSnapshot::new(1, "button"));

        assert_eq!(detector.on_signal(&Signal::click(icon, 0.0, 0.0), t0), Step::Idle);
    }

    // ========================================================================
    // Page
    // ========================================================================

    #[test]
    fn test_page_patterns() {
        let exact = PagePattern::parse("/pricing").unwrap();
        assert!(exact.matches("/pricing"));
        assert!(!exact.matches("/pricing/team"));

        let glob = PagePattern::parse("/products/*").unwrap();
        assert!(glob.matches("/products/42"));
        assert!(glob.matches("/products/"));
        assert!(!glob.matches("/products"));

        // Globs match anywhere in the path
        let blog = PagePattern::parse("/blog*").unwrap();
        assert!(blog.matches("/blog"));
        assert!(blog.matches("/en/blog/post"));
        assert!(!blog.matches("/news"));

        // Regex metacharacters are literal
        let dotted = PagePattern::parse("/docs/v1.2/*").unwrap();
        assert!(dotted.matches("/docs/v1.2/intro"));
        assert!(!dotted.matches("/docs/v1x2/intro"));
    }

    #[test]
    fn test_page_empty_list_matches_everything() {
        let t0 = Instant::now();
        let mut detector = PageDetector::new(&[], "/anything").unwrap();
        assert_eq!(detector.on_activate(t0), Step::Fire);
    }

    #[test]
    fn test_page_rechecks_on_navigation() {
        let t0 = Instant::now();
        let mut detector = PageDetector::new(&["/checkout*".to_string()], "/").unwrap();

        assert_eq!(detector.interests(), &[SignalKind::Navigation]);
        assert_eq!(detector.on_activate(t0), Step::Idle);
        assert_eq!(
            detector.on_signal(&Signal::navigation("/checkout/pay", NavigationKind::Push), t0),
            Step::Fire
        );
        assert_eq!(
            detector.on_signal(&Signal::navigation("/", NavigationKind::Pop), t0),
            Step::Idle
        );
    }

    #[test]
    fn test_page_keeps_observing_after_load_match() {
        let t0 = Instant::now();
        let mut detector = PageDetector::new(&["/".to_string()], "/").unwrap();

        assert_eq!(detector.on_activate(t0), Step::Fire);
        assert_eq!(
            detector.on_signal(&Signal::navigation("/", NavigationKind::Pop), t0),
            Step::Fire
        );
    }
}
