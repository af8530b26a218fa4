//! Shared library for the feedback widget trigger services
//!
//! This crate provides common functionality used by the trigger engine and its hosts:
//! - Trigger specification models (kinds, conditions, frequency policies)
//! - Error handling types
//! - Configuration management
//! - Logging infrastructure

pub mod config;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use models::{
    ensure_valid, load_triggers, parse_triggers, validate_triggers, ConfusedNavigationConditions,
    DataLayerEventConditions, FrequencyPolicy, MatchType, RageClickConditions, TriggerConditions,
    TriggerKind, TriggerSpec,
};

/// Initialize tracing subscriber for structured logging
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shared=debug,trigger_engine=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
