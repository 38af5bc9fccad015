//! Configuration management
//!
//! One YAML document with a section per component. Every field has a
//! default, so a partial file (or none at all) is valid.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pagekeeper_core_types::Viewport;
use pagekeeper_layout::LayoutPolicy;
use pagekeeper_preserver::PreserverPolicy;
use pagekeeper_workflow::WorkflowPolicy;

use crate::orchestrator::DEFAULT_EVENT_CAPACITY;

pub const LOCAL_CONFIG_PATH: &str = "config/pagekeeper.yaml";
pub const APP_DIR: &str = "pagekeeper";
pub const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub layout: LayoutPolicy,
    pub preserver: PreserverPolicy,
    pub workflow: WorkflowPolicy,
    pub automation: AutomationSettings,
    pub demo: DemoPage,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationSettings {
    /// Capacity of the outcome event bus.
    pub event_capacity: usize,
    /// Capacity of the command bus fed to the listener.
    pub command_capacity: usize,
    /// Simulated duration of the agent's own work, in milliseconds.
    pub agent_task_delay_ms: u64,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            command_capacity: 16,
            agent_task_delay_ms: 0,
        }
    }
}

/// Page the CLI builds when no live page is attached.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoPage {
    pub url: String,
    pub viewport: Viewport,
}

impl Default for DemoPage {
    fn default() -> Self {
        Self {
            url: "https://portal.example.gov/index.html".into(),
            viewport: Viewport::new(390, 844),
        }
    }
}

impl Config {
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document parses as unit, not as an empty map.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Where configuration is read from.
///
/// Priority: explicit path > `<cwd>/config/pagekeeper.yaml` >
/// `<config_dir>/pagekeeper/config.yaml`. The returned path may not exist.
pub fn resolve_config_path(
    explicit: Option<&Path>,
    cwd: &Path,
    config_dir: Option<&Path>,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = cwd.join(LOCAL_CONFIG_PATH);
    if local.exists() {
        return Some(local);
    }
    config_dir.map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}
