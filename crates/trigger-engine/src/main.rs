//! Trigger replay tool
//!
//! Replays a recorded interaction script against the configured triggers and
//! logs every prompt activation. The durable tier is file-backed, so `once`
//! triggers stay suppressed across runs.
//!
//! Usage: `trigger-replay <script.jsonl> [initial-path]`
//!
//! Each script line is `{ "at_ms": <offset>, "signal": <Signal> }`.

use anyhow::{Context, Result};
use serde::Deserialize;
use shared::{ensure_valid, load_triggers, Config};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::time::Instant;
use trigger_engine::{
    KeyValueStorage, MemoryStorage, PageContext, Signal, StorageTiers, TriggerEngine,
};

/// Time allowed for pending timers and debounces after the last entry
const GRACE_PERIOD: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct ScriptEntry {
    at_ms: u64,
    signal: Signal,
}

fn load_script(path: &Path) -> Result<Vec<ScriptEntry>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;

    let mut entries = raw
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str::<ScriptEntry>(line)
                .with_context(|| format!("Invalid script entry on line {}", number + 1))
        })
        .collect::<Result<Vec<_>>>()?;

    entries.sort_by_key(|e| e.at_ms);
    Ok(entries)
}

async fn replay(engine: &TriggerEngine, script: Vec<ScriptEntry>) {
    let started = Instant::now();
    let total = script.len();

    for entry in script {
        tokio::time::sleep_until(started + Duration::from_millis(entry.at_ms)).await;
        tracing::debug!(at_ms = entry.at_ms, kind = ?entry.signal.kind(), "Replaying signal");
        engine.dispatch(entry.signal);
    }

    tracing::info!(entries = total, "Script finished, waiting for pending timers");
    tokio::time::sleep(GRACE_PERIOD).await;
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    shared::init_tracing();

    let mut args = std::env::args().skip(1);
    let script_path = args
        .next()
        .context("Usage: trigger-replay <script.jsonl> [initial-path]")?;
    let initial_path = args.next().unwrap_or_else(|| "/".to_string());

    tracing::info!(script = %script_path, path = %initial_path, "Starting trigger replay...");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    let specs = load_triggers(&config.triggers.file).with_context(|| {
        format!("Failed to load triggers from {}", config.triggers.file.display())
    })?;
    if let Err(e) = ensure_valid(&specs) {
        tracing::warn!(error = %e, "Some triggers will not activate");
    }

    let script = load_script(Path::new(&script_path))?;

    let session: Option<Arc<dyn KeyValueStorage>> = if config.storage.session_enabled {
        Some(Arc::new(MemoryStorage::new()))
    } else {
        None
    };
    let ctx = PageContext::new(initial_path)
        .with_storage(StorageTiers::new(None, session))
        .with_durable_file(&config.storage.durable_path)
        .context("Failed to open durable trigger storage")?
        .with_engine_config(config.engine.clone());

    let fires = Arc::new(AtomicUsize::new(0));
    let counter = fires.clone();
    let engine = TriggerEngine::start_with_callback(specs, ctx, move || {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(activations = n, "Feedback prompt activated");
    })
    .context("Failed to start trigger engine")?;

    // Replay until done OR shutdown signal
    tokio::select! {
        result = signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            tracing::info!("Shutdown signal received, stopping replay...");
        }
        _ = replay(&engine, script) => {}
    }

    engine.shutdown().await;

    tracing::info!(
        activations = fires.load(Ordering::SeqCst),
        "Trigger replay complete"
    );

    Ok(())
}
