use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use pagekeeper::{demo_page, AppContext, Collaborators, Config};
use pagekeeper_core_types::Viewport;

pub struct CliContext {
    config: Config,
    config_path: Option<PathBuf>,
}

impl CliContext {
    pub fn new(config: Config, config_path: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Configuration with the demo page's URL and viewport overridden.
    pub fn page_config(&self, url: Option<String>, width: Option<u32>, height: Option<u32>) -> Config {
        let mut config = self.config.clone();
        if let Some(url) = url {
            config.demo.url = url;
        }
        let current = config.demo.viewport;
        config.demo.viewport = Viewport::new(
            width.unwrap_or(current.width),
            height.unwrap_or(current.height),
        );
        config
    }

    /// Wires every component against the demo page, with per-command overrides applied.
    pub fn app_context(&self, config: Config) -> Result<AppContext> {
        let page = demo_page(&config).context("Failed to build demo page")?;
        let collaborators = Collaborators::local(&config);
        AppContext::new(config, page, collaborators).context("Failed to wire components")
    }

    pub fn default_app_context(&self) -> Result<Arc<AppContext>> {
        self.app_context(self.config.clone()).map(Arc::new)
    }
}
