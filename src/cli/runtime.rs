use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pagekeeper::{resolve_config_path, Config};

pub fn init_logging(level: &str, debug: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}

pub struct LoadedConfig {
    pub config: Config,
    /// None when no candidate location could be determined.
    pub path: Option<PathBuf>,
}

pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let cwd = env::current_dir().context("Failed to read working directory")?;
    let config_dir = dirs::config_dir();
    let path = resolve_config_path(config_path.map(PathBuf::as_path), &cwd, config_dir.as_deref());

    match path {
        Some(path) if path.exists() => {
            let config = Config::load(&path).await?;
            info!("Loaded configuration from: {}", path.display());
            Ok(LoadedConfig {
                config,
                path: Some(path),
            })
        }
        Some(path) if config_path.is_some() => {
            anyhow::bail!("Config file not found: {}", path.display())
        }
        other => {
            match &other {
                Some(path) => warn!("Config file not found, using defaults: {}", path.display()),
                None => warn!("No config directory available, using defaults"),
            }
            Ok(LoadedConfig {
                config: Config::default(),
                path: other,
            })
        }
    }
}
