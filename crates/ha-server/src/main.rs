//! Home Assistant Rust Server
//!
//! Loads `configuration.yaml` and the persisted config entries from the
//! config directory, sets up the Lyric integration and runs until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use ha_helpers::HomeAssistant;
use ha_lyric::LyricIntegration;
use serde_yaml::Value;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_CONFIG_DIR: &str = "config";

fn config_dir() -> PathBuf {
    std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR))
}

/// Top-level domains named in the configuration
fn configured_domains(config: &Value) -> Vec<String> {
    config
        .as_mapping()
        .map(|map| {
            map.keys()
                .filter_map(|k| k.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

async fn start(hass: &Arc<HomeAssistant>) -> Result<()> {
    hass.config_entries
        .load()
        .await
        .context("loading config entries")?;
    info!(count = hass.config_entries.len(), "Loaded config entries");

    let config = hass.config().clone();
    for domain in configured_domains(&config) {
        if let Err(e) = hass.setup_component(&domain, &config).await {
            // Domains without a registered integration are skipped
            warn!(%domain, error = %e, "Could not set up integration");
        }
    }

    for entry_id in hass.config_entries.entry_ids() {
        if let Err(e) = hass.setup_config_entry(&entry_id).await {
            error!(%entry_id, error = %e, "Config entry setup failed");
        }
    }

    hass.block_till_done().await;
    Ok(())
}

async fn stop(hass: &Arc<HomeAssistant>) {
    for entry_id in hass.config_entries.entry_ids() {
        match hass.unload_config_entry(&entry_id).await {
            Ok(true) => {}
            Ok(false) => warn!(%entry_id, "Config entry did not unload"),
            Err(e) => error!(%entry_id, error = %e, "Config entry unload failed"),
        }
    }

    if let Err(e) = hass.config_entries.save().await {
        error!(error = %e, "Failed to save config entries");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_dir = config_dir();
    info!(?config_dir, "Starting Home Assistant (Rust)");

    let config = ha_config::load_configuration(&config_dir)
        .with_context(|| format!("loading configuration from {}", config_dir.display()))?;

    let hass = HomeAssistant::new(&config_dir, config);
    hass.register_integration(Arc::new(LyricIntegration::new()));

    start(&hass).await?;
    info!("Home Assistant is running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    stop(&hass).await;

    Ok(())
}
