//! Confused-navigation detector
//!
//! Combines several weak behavioral signals into one confusion score and fires
//! once the score reaches [`CONFUSION_THRESHOLD`].
//!
//! # Algorithm
//!
//! Each signal keeps its own pruned log and contributes to the score:
//!
//! | Signal | Log window | Contribution |
//! |---|---|---|
//! | Back/forward navigation | `timeWindow` | +2 when the last `backAndForthThreshold` entries flip direction in at least half of consecutive pairs |
//! | Scroll jumps | 5 s | +1 when at least half of the last `scrollJumpThreshold` samples jumped more than 500px |
//! | Erratic pointer | 3 s | +1 when path length exceeds 5x the straight-line distance over at least `mouseMovementThreshold` samples |
//! | Inactivity | - | +1 per check (every `inactivityThreshold / 2`) that finds no scroll or navigation for longer than `inactivityThreshold` |
//!
//! The score is checked after every contribution. Crossing the threshold fires
//! and resets the score and all three logs.
//!
//! # Example
//!
//! ```json
//! {
//!   "type": "confused-navigation",
//!   "conditions": {
//!     "confusedNavigation": {
//!       "backAndForthThreshold": 3,
//!       "timeWindow": 30000,
//!       "inactivityThreshold": 10000
//!     }
//!   }
//! }
//! ```

use shared::{ConfusedNavigationConditions, TriggerKind};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::{Detector, Step};
use crate::signal::{NavigationKind, Signal, SignalKind};

/// Score at which the detector fires
pub const CONFUSION_THRESHOLD: u32 = 3;

pub const DEFAULT_BACK_AND_FORTH_THRESHOLD: usize = 3;
pub const DEFAULT_TIME_WINDOW_MS: u64 = 30_000;
pub const DEFAULT_SCROLL_JUMP_THRESHOLD: usize = 5;
pub const DEFAULT_MOUSE_MOVEMENT_THRESHOLD: usize = 100;
pub const DEFAULT_INACTIVITY_THRESHOLD_MS: u64 = 10_000;

const SCROLL_WINDOW: Duration = Duration::from_secs(5);
const POINTER_WINDOW: Duration = Duration::from_secs(3);
const SCROLL_JUMP_PX: f64 = 500.0;
const ERRATIC_PATH_RATIO: f64 = 5.0;

const NAVIGATION_WEIGHT: u32 = 2;
const SCROLL_WEIGHT: u32 = 1;
const POINTER_WEIGHT: u32 = 1;
const INACTIVITY_WEIGHT: u32 = 1;

/// Direction of a navigation entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Programmatic navigation
    Forward,
    /// Browser back/forward
    Back,
}

impl From<NavigationKind> for Direction {
    fn from(kind: NavigationKind) -> Self {
        match kind {
            NavigationKind::Push => Direction::Forward,
            NavigationKind::Pop => Direction::Back,
        }
    }
}

#[derive(Debug, Clone)]
struct NavigationEntry {
    path: String,
    at: Instant,
    direction: Direction,
}

#[derive(Debug, Clone, Copy)]
struct ScrollSample {
    position: f64,
    at: Instant,
}

#[derive(Debug, Clone, Copy)]
struct PointerSample {
    x: f64,
    y: f64,
    at: Instant,
}

fn prune<T>(log: &mut VecDeque<T>, now: Instant, window: Duration, at: impl Fn(&T) -> Instant) {
    while let Some(front) = log.front() {
        if now.saturating_duration_since(at(front)) > window {
            log.pop_front();
        } else {
            break;
        }
    }
}

pub struct ConfusedNavigationDetector {
    back_and_forth_threshold: usize,
    time_window: Duration,
    scroll_jump_threshold: usize,
    mouse_movement_threshold: usize,
    inactivity_threshold: Duration,

    navigation: VecDeque<NavigationEntry>,
    scrolls: VecDeque<ScrollSample>,
    pointer: VecDeque<PointerSample>,
    score: u32,
    last_activity: Option<Instant>,
    next_inactivity_check: Option<Instant>,
}

impl ConfusedNavigationDetector {
    pub fn new(conditions: &ConfusedNavigationConditions) -> Self {
        Self {
            back_and_forth_threshold: conditions
                .back_and_forth_threshold
                .unwrap_or(DEFAULT_BACK_AND_FORTH_THRESHOLD)
                .max(1),
            time_window: Duration::from_millis(
                conditions.time_window.unwrap_or(DEFAULT_TIME_WINDOW_MS),
            ),
            scroll_jump_threshold: conditions
                .scroll_jump_threshold
                .unwrap_or(DEFAULT_SCROLL_JUMP_THRESHOLD)
                .max(2),
            mouse_movement_threshold: conditions
                .mouse_movement_threshold
                .unwrap_or(DEFAULT_MOUSE_MOVEMENT_THRESHOLD)
                .max(2),
            inactivity_threshold: Duration::from_millis(
                conditions
                    .inactivity_threshold
                    .unwrap_or(DEFAULT_INACTIVITY_THRESHOLD_MS),
            ),
            navigation: VecDeque::new(),
            scrolls: VecDeque::new(),
            pointer: VecDeque::new(),
            score: 0,
            last_activity: None,
            next_inactivity_check: None,
        }
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    /// Lengths of the navigation, scroll and pointer logs
    pub fn history_lens(&self) -> (usize, usize, usize) {
        (self.navigation.len(), self.scrolls.len(), self.pointer.len())
    }

    fn inactivity_interval(&self) -> Duration {
        (self.inactivity_threshold / 2).max(Duration::from_millis(1))
    }

    fn observe_navigation(&mut self, path: &str, kind: NavigationKind, at: Instant) {
        self.last_activity = Some(at);
        prune(&mut self.navigation, at, self.time_window, |e| e.at);
        self.navigation.push_back(NavigationEntry {
            path: path.to_string(),
            at,
            direction: kind.into(),
        });

        let n = self.back_and_forth_threshold;
        if self.navigation.len() < n {
            return;
        }

        let recent: Vec<&NavigationEntry> = self.navigation.iter().skip(self.navigation.len() - n).collect();
        let flips = recent
            .windows(2)
            .filter(|pair| pair[0].direction != pair[1].direction)
            .count();

        if flips * 2 >= n - 1 {
            self.score += NAVIGATION_WEIGHT;
            debug!(
                flips = flips,
                entries = n,
                last_path = %recent[n - 1].path,
                score = self.score,
                "Back-and-forth navigation detected"
            );
        }
    }

    fn observe_scroll(&mut self, position: f64, at: Instant) {
        self.last_activity = Some(at);
        prune(&mut self.scrolls, at, SCROLL_WINDOW, |s| s.at);
        self.scrolls.push_back(ScrollSample { position, at });

        let k = self.scroll_jump_threshold;
        if self.scrolls.len() < k {
            return;
        }

        let recent: Vec<f64> = self
            .scrolls
            .iter()
            .skip(self.scrolls.len() - k)
            .map(|s| s.position)
            .collect();
        let jumps = recent
            .windows(2)
            .filter(|pair| (pair[1] - pair[0]).abs() > SCROLL_JUMP_PX)
            .count();

        if jumps * 2 >= k {
            self.score += SCROLL_WEIGHT;
            debug!(jumps = jumps, samples = k, score = self.score, "Scroll jumps detected");
        }
    }

    fn observe_pointer(&mut self, x: f64, y: f64, at: Instant) {
        let before = self.pointer.len();
        prune(&mut self.pointer, at, POINTER_WINDOW, |p| p.at);
        if self.pointer.len() < before {
            trace!(pruned = before - self.pointer.len(), "Pruned pointer samples");
        }
        self.pointer.push_back(PointerSample { x, y, at });

        if self.pointer.len() < self.mouse_movement_threshold {
            return;
        }

        let path: f64 = self
            .pointer
            .iter()
            .zip(self.pointer.iter().skip(1))
            .map(|(a, b)| ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt())
            .sum();
        let (Some(first), Some(last)) = (self.pointer.front(), self.pointer.back()) else {
            return;
        };
        let straight = ((last.x - first.x).powi(2) + (last.y - first.y).powi(2)).sqrt();
        let ratio = path / straight.max(1.0);

        if ratio > ERRATIC_PATH_RATIO {
            self.score += POINTER_WEIGHT;
            debug!(ratio = ratio, samples = self.pointer.len(), score = self.score, "Erratic pointer movement detected");
        }
    }

    fn check_inactivity(&mut self, now: Instant) {
        let Some(last_activity) = self.last_activity else {
            return;
        };

        let idle = now.saturating_duration_since(last_activity);
        if idle > self.inactivity_threshold {
            self.score += INACTIVITY_WEIGHT;
            self.last_activity = Some(now);
            debug!(idle_ms = idle.as_millis() as u64, score = self.score, "Inactivity detected");
        }
    }

    /// Fire and reset if the score crossed the threshold
    fn settle(&mut self) -> Step {
        if self.score < CONFUSION_THRESHOLD {
            return Step::Idle;
        }

        debug!(score = self.score, "Confusion threshold reached");
        self.score = 0;
        self.navigation.clear();
        self.scrolls.clear();
        self.pointer.clear();
        Step::Fire
    }
}

impl Detector for ConfusedNavigationDetector {
    fn kind(&self) -> TriggerKind {
        TriggerKind::ConfusedNavigation
    }

    fn interests(&self) -> &'static [SignalKind] {
        &[SignalKind::Navigation, SignalKind::Scroll, SignalKind::PointerMove]
    }

    fn on_activate(&mut self, now: Instant) -> Step {
        self.last_activity = Some(now);
        self.next_inactivity_check = Some(now + self.inactivity_interval());
        Step::Idle
    }

    fn on_signal(&mut self, signal: &Signal, at: Instant) -> Step {
        match signal {
            Signal::Navigation { path, kind } => self.observe_navigation(path, *kind, at),
            Signal::Scroll { scroll_top, .. } => self.observe_scroll(*scroll_top, at),
            Signal::PointerMove { x, y } => self.observe_pointer(*x, *y, at),
            _ => return Step::Idle,
        }
        self.settle()
    }

    fn on_timer(&mut self, now: Instant) -> Step {
        match self.next_inactivity_check {
            Some(check) if now >= check => {
                self.next_inactivity_check = Some(now + self.inactivity_interval());
                self.check_inactivity(now);
                self.settle()
            }
            _ => Step::Idle,
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.next_inactivity_check
    }
}
