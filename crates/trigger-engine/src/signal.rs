//! Host interaction signals
//!
//! The engine owns no DOM. Hosts translate browser events into [`Signal`]s and
//! hand them to [`TriggerEngine::dispatch`](crate::TriggerEngine::dispatch).
//! Signals are serializable so recorded sessions can be replayed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// How a navigation happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationKind {
    /// Programmatic history push (forward)
    Push,
    /// Browser back/forward
    Pop,
}

/// A user-interaction signal observed on the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Signal {
    Click {
        target: ElementSnapshot,
        x: f64,
        y: f64,
    },
    Scroll {
        scroll_top: f64,
        scroll_height: f64,
        viewport_height: f64,
    },
    PointerMove {
        x: f64,
        y: f64,
    },
    PointerLeave {
        client_y: f64,
    },
    Navigation {
        path: String,
        kind: NavigationKind,
    },
    /// Append to a named instrumentation collection, for hosts that forward
    /// pushes instead of sharing a [`DataLayer`](crate::DataLayer) handle
    DataLayerPush {
        object_name: String,
        entry: Value,
    },
}

/// Discriminant used for listener interest filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Click,
    Scroll,
    PointerMove,
    PointerLeave,
    Navigation,
    DataLayerPush,
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::Click { .. } => SignalKind::Click,
            Signal::Scroll { .. } => SignalKind::Scroll,
            Signal::PointerMove { .. } => SignalKind::PointerMove,
            Signal::PointerLeave { .. } => SignalKind::PointerLeave,
            Signal::Navigation { .. } => SignalKind::Navigation,
            Signal::DataLayerPush { .. } => SignalKind::DataLayerPush,
        }
    }

    /// Convenience constructor for a scroll sample
    pub fn scroll(scroll_top: f64, scroll_height: f64, viewport_height: f64) -> Self {
        Signal::Scroll {
            scroll_top,
            scroll_height,
            viewport_height,
        }
    }

    /// Convenience constructor for a click
    pub fn click(target: ElementSnapshot, x: f64, y: f64) -> Self {
        Signal::Click { target, x, y }
    }

    /// Convenience constructor for a navigation
    pub fn navigation(path: impl Into<String>, kind: NavigationKind) -> Self {
        Signal::Navigation {
            path: path.into(),
            kind,
        }
    }
}

/// Snapshot of a DOM element as seen by the host at event time
///
/// `node_id` is the host-assigned identity of the live element; two snapshots
/// with the same `node_id` refer to the same element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    pub node_id: u64,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    /// Computed `cursor` style
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<ElementSnapshot>>,
}

impl ElementSnapshot {
    pub fn new(node_id: u64, tag: impl Into<String>) -> Self {
        Self {
            node_id,
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn with_parent(mut self, parent: ElementSnapshot) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Attribute lookup; `id` and `class` resolve to the dedicated fields
    pub fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "id" => self.id.clone(),
            "class" if !self.classes.is_empty() => Some(self.classes.join(" ")),
            _ => self.attributes.get(name).cloned(),
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// Ancestors from the nearest parent outwards
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors {
            next: self.parent.as_deref(),
        }
    }
}

/// Iterator over an element's parent chain
pub struct Ancestors<'a> {
    next: Option<&'a ElementSnapshot>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a ElementSnapshot;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent.as_deref();
        Some(current)
    }
}
