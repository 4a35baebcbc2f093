use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::SoulHealConfig;

pub const TEMPLATE_DIR_ENV: &str = "SOULHEAL_TEMPLATE_DIR";
pub const TRACE_FILE_ENV: &str = "SOULHEAL_TRACE_FILE";

pub fn init_logging(level: &str, debug: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    // stdout carries command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}

#[derive(Debug)]
pub struct LoadedConfig {
    pub config: SoulHealConfig,
    pub path: PathBuf,
}

pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let config_path = match config_path {
        Some(path) => path.clone(),
        None => {
            // Priority: ./config/soulheal.yaml > ~/.config/soulheal/config.yaml
            let local_config = PathBuf::from("config/soulheal.yaml");
            if local_config.exists() {
                local_config
            } else {
                let mut path = dirs::config_dir().context("Failed to get config directory")?;
                path.push("soulheal");
                path.push("config.yaml");
                path
            }
        }
    };

    if config_path.exists() {
        let content = fs::read_to_string(&config_path)
            .await
            .context("Failed to read config file")?;

        let config: SoulHealConfig =
            serde_yaml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded configuration from: {}", config_path.display());
        Ok(LoadedConfig {
            config,
            path: config_path,
        })
    } else {
        warn!(
            "Config file not found, using defaults: {}",
            config_path.display()
        );
        Ok(LoadedConfig {
            config: SoulHealConfig::default(),
            path: config_path,
        })
    }
}

/// Environment variables take precedence over the config file
pub fn apply_env_overrides(config: &mut SoulHealConfig) {
    if let Some(dir) = non_empty_var(TEMPLATE_DIR_ENV) {
        info!("Using template directory from {}: {}", TEMPLATE_DIR_ENV, dir);
        config.template_dir = PathBuf::from(dir);
    }

    if let Some(file) = non_empty_var(TRACE_FILE_ENV) {
        info!("Writing attempt trace from {}: {}", TRACE_FILE_ENV, file);
        config.trace.enabled = true;
        config.trace.file = Some(PathBuf::from(file));
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
