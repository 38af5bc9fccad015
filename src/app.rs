//! Component wiring
//!
//! Builds every component from a [`Config`] in dependency order and hands the
//! handles to the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use pagekeeper_event_bus::InMemoryBus;
use pagekeeper_layout::LayoutController;
use pagekeeper_page_port::{InMemoryPage, PageError, PagePort};
use pagekeeper_preserver::UiPreserver;
use pagekeeper_workflow::{
    AgentTaskRunner, CacheProvider, DataSync, DefaultCatalog, DefaultWorkflowEngine,
    EchoTaskRunner, LocalDataSync, StaticCacheProvider, WorkflowEngine,
};

use crate::config::Config;
use crate::errors::AutomationError;
use crate::orchestrator::{AutomationCommand, AutomationOrchestrator};

/// External services the default workflows call out to.
#[derive(Clone)]
pub struct Collaborators {
    pub sync: Arc<dyn DataSync>,
    pub cache: Arc<dyn CacheProvider>,
    pub runner: Arc<dyn AgentTaskRunner>,
}

impl Collaborators {
    /// In-process stand-ins: local sync, a healthy cache, an echoing agent.
    pub fn local(config: &Config) -> Self {
        Self {
            sync: Arc::new(LocalDataSync::default()),
            cache: Arc::new(StaticCacheProvider::healthy()),
            runner: Arc::new(EchoTaskRunner::new(Duration::from_millis(
                config.automation.agent_task_delay_ms,
            ))),
        }
    }
}

pub struct AppContext {
    pub config: Arc<Config>,
    pub page: Arc<dyn PagePort>,
    pub layout: Arc<LayoutController>,
    pub preserver: Arc<UiPreserver>,
    pub engine: Arc<DefaultWorkflowEngine>,
    pub orchestrator: Arc<AutomationOrchestrator>,
    pub commands: Arc<InMemoryBus<AutomationCommand>>,
}

impl AppContext {
    pub fn new(
        config: Config,
        page: Arc<dyn PagePort>,
        collaborators: Collaborators,
    ) -> Result<Self, AutomationError> {
        let layout = Arc::new(LayoutController::new(
            Arc::clone(&page),
            config.layout.clone(),
        ));
        let preserver = UiPreserver::new(Arc::clone(&page), config.preserver.clone())?;
        let engine = Arc::new(DefaultWorkflowEngine::new(config.workflow.clone()));
        DefaultCatalog::new(
            Arc::clone(&page),
            Arc::clone(&layout),
            collaborators.sync,
            collaborators.cache,
            collaborators.runner,
            &config.workflow,
        )
        .register(engine.as_ref());

        let orchestrator = AutomationOrchestrator::builder()
            .layout(Arc::clone(&layout))
            .preserver(Arc::clone(&preserver))
            .engine(Arc::clone(&engine) as Arc<dyn WorkflowEngine>)
            .events(InMemoryBus::new(config.automation.event_capacity))
            .build()?;
        let commands = InMemoryBus::new(config.automation.command_capacity);
        info!(path = %page.location_path(), viewport = %page.viewport(), "application context ready");

        Ok(Self {
            config: Arc::new(config),
            page,
            layout,
            preserver,
            engine,
            orchestrator,
            commands,
        })
    }
}

/// Builds the bundled tax-portal page described by `config.demo`.
pub fn demo_page(config: &Config) -> Result<Arc<InMemoryPage>, PageError> {
    InMemoryPage::tax_portal_demo(&config.demo.url, config.demo.viewport)
}
