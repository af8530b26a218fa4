//! Trigger specification models
//!
//! These mirror the JSON shape page owners write in their widget configuration:
//!
//! ```json
//! {
//!   "type": "rage-click",
//!   "conditions": {
//!     "frequency": "session",
//!     "rageClick": { "clickThreshold": 4, "timeWindow": 1500 }
//!   }
//! }
//! ```
//!
//! A spec list is immutable once handed to an engine; the ordinal position of
//! each spec is its identity (`trigger_<index>`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{Error, Result};

/// Default delay for `time` triggers (ms)
pub const DEFAULT_TIME_DELAY_MS: u64 = 5000;
/// Default scroll depth for `scroll` triggers (percent)
pub const DEFAULT_SCROLL_PERCENTAGE: f64 = 50.0;
/// Default data layer object name
pub const DEFAULT_DATA_LAYER_OBJECT: &str = "dataLayer";

/// Trigger kind tag
///
/// Unknown tags fail deserialization, so a malformed kind is rejected when the
/// configuration is parsed instead of being silently ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerKind {
    Page,
    Time,
    Scroll,
    ExitIntent,
    ElementClick,
    Manual,
    RageClick,
    ConfusedNavigation,
    DatalayerEvent,
}

impl TriggerKind {
    /// Configuration tag for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Page => "page",
            TriggerKind::Time => "time",
            TriggerKind::Scroll => "scroll",
            TriggerKind::ExitIntent => "exit-intent",
            TriggerKind::ElementClick => "element-click",
            TriggerKind::Manual => "manual",
            TriggerKind::RageClick => "rage-click",
            TriggerKind::ConfusedNavigation => "confused-navigation",
            TriggerKind::DatalayerEvent => "datalayer-event",
        }
    }

    /// Whether detectors of this kind observe navigation
    pub fn observes_navigation(&self) -> bool {
        matches!(self, TriggerKind::Page | TriggerKind::ConfusedNavigation)
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How often a satisfied trigger may actually fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyPolicy {
    /// Never again for this browser profile (durable tier)
    #[default]
    Once,
    /// Never again in this browsing session (session tier)
    Session,
    /// No suppression
    Always,
}

impl std::fmt::Display for FrequencyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrequencyPolicy::Once => write!(f, "once"),
            FrequencyPolicy::Session => write!(f, "session"),
            FrequencyPolicy::Always => write!(f, "always"),
        }
    }
}

/// Property matching mode for data layer events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Every declared property must be equal
    Exact,
    /// At least one declared property must be equal
    Partial,
    /// Every declared property key must be present
    #[default]
    Exists,
}

/// One declared trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
    #[serde(rename = "type")]
    pub kind: TriggerKind,
    #[serde(default)]
    pub conditions: TriggerConditions,
}

impl TriggerSpec {
    /// Create a spec with default conditions
    pub fn new(kind: TriggerKind) -> Self {
        Self {
            kind,
            conditions: TriggerConditions::default(),
        }
    }

    /// Builder-style frequency override
    pub fn with_frequency(mut self, frequency: FrequencyPolicy) -> Self {
        self.conditions.frequency = Some(frequency);
        self
    }

    /// Builder-style conditions override
    pub fn with_conditions(mut self, conditions: TriggerConditions) -> Self {
        self.conditions = conditions;
        self
    }

    /// Effective frequency policy (default `once`)
    pub fn frequency(&self) -> FrequencyPolicy {
        self.conditions.frequency.unwrap_or_default()
    }

    /// Configuration defects for this spec, empty when it can activate
    pub fn defects(&self) -> Vec<String> {
        let c = &self.conditions;
        let mut defects = Vec::new();

        match self.kind {
            TriggerKind::ElementClick => {
                if c.element_selector.as_deref().map_or(true, |s| s.trim().is_empty()) {
                    defects.push("elementSelector is required for element-click".to_string());
                }
            }
            TriggerKind::DatalayerEvent => match &c.data_layer_event {
                None => defects.push("dataLayerEvent is required for datalayer-event".to_string()),
                Some(dl) if dl.event_name.trim().is_empty() => {
                    defects.push("dataLayerEvent.eventName must not be empty".to_string())
                }
                Some(_) => {}
            },
            TriggerKind::Scroll => {
                if let Some(p) = c.scroll_percentage {
                    if !(0.0..=100.0).contains(&p) {
                        defects.push(format!("scrollPercentage must be within 0..=100, got {}", p));
                    }
                }
            }
            TriggerKind::RageClick => {
                if let Some(rc) = &c.rage_click {
                    if rc.click_threshold == Some(0) {
                        defects.push("rageClick.clickThreshold must be greater than 0".to_string());
                    }
                }
            }
            TriggerKind::ConfusedNavigation => {
                if let Some(cn) = &c.confused_navigation {
                    if cn.inactivity_threshold == Some(0) {
                        defects.push(
                            "confusedNavigation.inactivityThreshold must be greater than 0"
                                .to_string(),
                        );
                    }
                }
            }
            TriggerKind::Page | TriggerKind::Time | TriggerKind::ExitIntent | TriggerKind::Manual => {}
        }

        defects
    }
}

/// Validate an ordered trigger list
///
/// Returns human-readable messages (`Trigger N: ...`, 1-based); empty means valid.
pub fn validate_triggers(specs: &[TriggerSpec]) -> Vec<String> {
    if specs.is_empty() {
        return vec!["At least one trigger is required".to_string()];
    }

    specs
        .iter()
        .enumerate()
        .flat_map(|(index, spec)| {
            spec.defects()
                .into_iter()
                .map(move |defect| format!("Trigger {}: {}", index + 1, defect))
        })
        .collect()
}

/// Parse a JSON array of trigger specs
pub fn parse_triggers(json: &str) -> Result<Vec<TriggerSpec>> {
    Ok(serde_json::from_str(json)?)
}

/// Load a JSON array of trigger specs from disk
pub fn load_triggers(path: impl AsRef<Path>) -> Result<Vec<TriggerSpec>> {
    let raw = std::fs::read_to_string(path)?;
    parse_triggers(&raw)
}

/// Like [`validate_triggers`], folding every defect into one error
pub fn ensure_valid(specs: &[TriggerSpec]) -> Result<()> {
    let defects = validate_triggers(specs);
    if defects.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(defects.join("; ")))
    }
}

/// Kind-specific conditions; only the fields relevant to the kind are read
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<String>>,
    /// Delay in ms for `time`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_delay: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<FrequencyPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rage_click: Option<RageClickConditions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confused_navigation: Option<ConfusedNavigationConditions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_layer_event: Option<DataLayerEventConditions>,
}

impl TriggerConditions {
    pub fn time_delay_ms(&self) -> u64 {
        self.time_delay.unwrap_or(DEFAULT_TIME_DELAY_MS)
    }

    pub fn scroll_percentage(&self) -> f64 {
        self.scroll_percentage.unwrap_or(DEFAULT_SCROLL_PERCENTAGE)
    }

    pub fn pages(&self) -> &[String] {
        self.pages.as_deref().unwrap_or(&[])
    }
}

/// Rage-click parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RageClickConditions {
    /// Clicks needed within the window (default 3)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_threshold: Option<usize>,
    /// Window in ms (default 2000)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<u64>,
    /// Restrict detection to targets inside this selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_selectors: Vec<String>,
}

/// Confused-navigation parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfusedNavigationConditions {
    /// Navigation entries inspected for direction flips (default 3)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_and_forth_threshold: Option<usize>,
    /// Navigation history window in ms (default 30000)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<u64>,
    /// Scroll samples inspected for jumps (default 5)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_jump_threshold: Option<usize>,
    /// Pointer samples needed before path analysis (default 100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mouse_movement_threshold: Option<usize>,
    /// Idle time in ms that counts as confusion (default 10000)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inactivity_threshold: Option<u64>,
}

/// Data layer event parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataLayerEventConditions {
    #[serde(default)]
    pub event_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_properties: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,
    #[serde(default)]
    pub match_type: MatchType,
    /// Debounce in ms (default 1000)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_time: Option<u64>,
}

impl DataLayerEventConditions {
    pub fn object_name(&self) -> &str {
        self.object_name.as_deref().unwrap_or(DEFAULT_DATA_LAYER_OBJECT)
    }
}
