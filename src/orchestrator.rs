//! Automation orchestrator
//!
//! Ties the layout controller, the UI preserver and the workflow engine into
//! one single-flight automation session. Components are handed in through
//! [`OrchestratorBuilder`]; nothing is looked up at run time.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pagekeeper_core_types::{AutomationTask, SessionId, TaskKind};
use pagekeeper_event_bus::InMemoryBus;
use pagekeeper_layout::{LayoutController, LayoutInfo, LayoutSnapshot};
use pagekeeper_preserver::{PreserverStatus, UiPreserver};
use pagekeeper_workflow::{
    WorkflowEngine, WorkflowReport, WorkflowStatus, CROSS_DEVICE_SYNC, MOBILE_FIRST_DEVELOPMENT,
    PWA_MAINTENANCE, UI_LAYOUT_PRESERVATION,
};

use crate::errors::AutomationError;

pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Commands accepted by [`AutomationOrchestrator::listen`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum AutomationCommand {
    Start { task: AutomationTask },
    Stop,
}

/// Session outcomes published on the orchestrator's event bus.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum AutomationEvent {
    Started {
        task: AutomationTask,
        workflow: String,
    },
    Completed {
        task: AutomationTask,
        report: Box<AutomationReport>,
    },
    /// A workflow step failed, timed out or the run was stopped.
    Failed {
        task: AutomationTask,
        error: String,
    },
    /// Anything else went wrong while setting up or running the session.
    Error {
        task: AutomationTask,
        error: String,
    },
    Stopped {
        task: AutomationTask,
    },
}

/// Result of a successful session.
#[derive(Clone, Debug, Serialize)]
pub struct AutomationReport {
    pub session_id: SessionId,
    pub task: AutomationTask,
    pub layout: LayoutSnapshot,
    pub workflow: WorkflowReport,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AutomationStatus {
    pub initialized: bool,
    pub running: bool,
    pub session_id: Option<SessionId>,
    pub current_task: Option<AutomationTask>,
    pub workflow: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Orchestrator summary with every component's own status nested under it.
#[derive(Clone, Debug, Serialize)]
pub struct DetailedStatus {
    #[serde(flatten)]
    pub summary: AutomationStatus,
    pub layout: LayoutInfo,
    pub workflow: WorkflowStatus,
    pub preserver: PreserverStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickTaskOptions {
    /// Wrap the task in a preservation session.
    pub preserve_ui: bool,
}

impl Default for QuickTaskOptions {
    fn default() -> Self {
        Self { preserve_ui: true }
    }
}

/// Workflow each task kind runs under.
pub fn workflow_for(kind: &TaskKind) -> &'static str {
    match kind {
        TaskKind::UiDevelopment(_) => UI_LAYOUT_PRESERVATION,
        TaskKind::MobileDevelopment(_) => MOBILE_FIRST_DEVELOPMENT,
        TaskKind::SyncOperation(_) => CROSS_DEVICE_SYNC,
        TaskKind::PwaMaintenance(_) => PWA_MAINTENANCE,
        TaskKind::General(_) => UI_LAYOUT_PRESERVATION,
    }
}

struct Session {
    id: SessionId,
    task: AutomationTask,
    workflow: &'static str,
    started_at: DateTime<Utc>,
    generation: u64,
}

#[derive(Default)]
struct OrchestratorState {
    session: Option<Session>,
    generation: u64,
}

#[derive(Default)]
pub struct OrchestratorBuilder {
    layout: Option<Arc<LayoutController>>,
    preserver: Option<Arc<UiPreserver>>,
    engine: Option<Arc<dyn WorkflowEngine>>,
    events: Option<Arc<InMemoryBus<AutomationEvent>>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layout(mut self, layout: Arc<LayoutController>) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn preserver(mut self, preserver: Arc<UiPreserver>) -> Self {
        self.preserver = Some(preserver);
        self
    }

    pub fn engine(mut self, engine: Arc<dyn WorkflowEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Defaults to a private bus of [`DEFAULT_EVENT_CAPACITY`].
    pub fn events(mut self, events: Arc<InMemoryBus<AutomationEvent>>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<Arc<AutomationOrchestrator>, AutomationError> {
        let layout = self
            .layout
            .ok_or(AutomationError::NotReady("layout controller"))?;
        let preserver = self
            .preserver
            .ok_or(AutomationError::NotReady("ui preserver"))?;
        let engine = self
            .engine
            .ok_or(AutomationError::NotReady("workflow engine"))?;
        let events = self
            .events
            .unwrap_or_else(|| InMemoryBus::new(DEFAULT_EVENT_CAPACITY));
        info!("automation orchestrator ready");
        Ok(Arc::new(AutomationOrchestrator {
            layout,
            preserver,
            engine,
            events,
            state: Mutex::new(OrchestratorState::default()),
        }))
    }
}

pub struct AutomationOrchestrator {
    layout: Arc<LayoutController>,
    preserver: Arc<UiPreserver>,
    engine: Arc<dyn WorkflowEngine>,
    events: Arc<InMemoryBus<AutomationEvent>>,
    state: Mutex<OrchestratorState>,
}

impl AutomationOrchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn events(&self) -> Arc<InMemoryBus<AutomationEvent>> {
        Arc::clone(&self.events)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AutomationEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().session.is_some()
    }

    /// Runs `task` under preservation and agent mode through its workflow.
    pub async fn start_automation(
        &self,
        task: AutomationTask,
    ) -> Result<AutomationReport, AutomationError> {
        let workflow = workflow_for(&task.kind);
        let (session_id, generation) = self.admit(&task, workflow)?;
        info!(
            session = %session_id.0,
            task = %task.id,
            kind = task.kind.label(),
            workflow,
            "Starting automation"
        );
        self.events.emit(AutomationEvent::Started {
            task: task.clone(),
            workflow: workflow.to_string(),
        });

        let outcome = self.run_session(&task, workflow).await;
        let current = self.is_current(generation);
        let outcome = match outcome {
            Ok((layout, report)) => {
                let report = AutomationReport {
                    session_id,
                    task: task.clone(),
                    layout,
                    workflow: report,
                };
                if current {
                    info!(workflow, latency_ms = report.workflow.latency_ms, "Automation completed");
                    self.events.emit(AutomationEvent::Completed {
                        task: task.clone(),
                        report: Box::new(report.clone()),
                    });
                }
                Ok(report)
            }
            Err(err) => {
                if current {
                    self.handle_error(&task, &err);
                } else {
                    debug!(error = %err, "session ended after stop; recovery already done");
                }
                Err(err)
            }
        };

        if current {
            self.release_page();
        }
        self.finish_session(generation);
        outcome
    }

    /// Stops the running session. Returns false when idle.
    pub fn stop_automation(&self) -> bool {
        let session = self.state.lock().session.take();
        let Some(session) = session else {
            warn!("no automation session is running");
            return false;
        };
        info!(session = %session.id.0, workflow = session.workflow, "Stopping automation");
        if !self.engine.stop_workflow() {
            debug!("no workflow was running");
        }
        self.release_page();
        self.events.emit(AutomationEvent::Stopped { task: session.task });
        true
    }

    /// Best-effort recovery after a failed session, then publishes the failure.
    ///
    /// Runs whether or not preservation and agent mode are active; recovery
    /// problems are logged and never replace `err`.
    pub fn handle_error(&self, task: &AutomationTask, err: &AutomationError) {
        error!(task = %task.id, error = %err, "Handling automation error");
        if let Err(restore_err) = self.preserver.force_restore() {
            warn!(error = %restore_err, "UI restore during recovery failed");
        }
        self.layout.disable_agent_mode();

        let event = if err.is_workflow_failure() {
            AutomationEvent::Failed {
                task: task.clone(),
                error: err.to_string(),
            }
        } else {
            AutomationEvent::Error {
                task: task.clone(),
                error: err.to_string(),
            }
        };
        self.events.emit(event);
    }

    pub fn status(&self) -> AutomationStatus {
        let state = self.state.lock();
        match &state.session {
            Some(session) => AutomationStatus {
                initialized: true,
                running: true,
                session_id: Some(session.id.clone()),
                current_task: Some(session.task.clone()),
                workflow: Some(session.workflow.to_string()),
                started_at: Some(session.started_at),
            },
            None => AutomationStatus {
                initialized: true,
                ..AutomationStatus::default()
            },
        }
    }

    pub fn detailed_status(&self) -> DetailedStatus {
        DetailedStatus {
            summary: self.status(),
            layout: self.layout.layout_info(),
            workflow: self.engine.status(),
            preserver: self.preserver.status(),
        }
    }

    /// Runs a one-off task outside the workflow engine, optionally preserved.
    ///
    /// Only a preservation session started here is ended here.
    pub async fn execute_quick_task<F, Fut, T>(
        &self,
        task: F,
        options: QuickTaskOptions,
    ) -> Result<T, AutomationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        info!(preserve_ui = options.preserve_ui, "Executing quick task");
        let started = Utc::now();
        let owns_preservation = options.preserve_ui && self.preserver.start_preservation();

        let result = task().await;

        if owns_preservation {
            self.preserver.end_preservation();
        }
        let elapsed_ms = (Utc::now() - started).num_milliseconds().max(0);
        match result {
            Ok(value) => {
                info!(elapsed_ms, "Quick task completed");
                Ok(value)
            }
            Err(err) => {
                warn!(elapsed_ms, error = %err, "Quick task failed");
                Err(AutomationError::QuickTask(format!("{err:#}")))
            }
        }
    }

    /// Consumes commands until the channel closes or `shutdown` fires.
    ///
    /// Each start runs on its own task so a later stop can interleave.
    pub fn listen(
        self: &Arc<Self>,
        mut commands: broadcast::Receiver<AutomationCommand>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let command = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    command = commands.recv() => command,
                };
                match command {
                    Ok(AutomationCommand::Start { task }) => {
                        let runner = Arc::clone(&this);
                        tokio::spawn(async move {
                            if let Err(err) = runner.start_automation(task).await {
                                debug!(error = %err, "automation command finished with error");
                            }
                        });
                    }
                    Ok(AutomationCommand::Stop) => {
                        this.stop_automation();
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "automation command listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("automation command listener stopped");
        })
    }

    fn admit(
        &self,
        task: &AutomationTask,
        workflow: &'static str,
    ) -> Result<(SessionId, u64), AutomationError> {
        let mut state = self.state.lock();
        if state.session.is_some() {
            warn!(task = %task.id, "automation already running");
            return Err(AutomationError::AlreadyRunning);
        }
        state.generation += 1;
        let generation = state.generation;
        let id = SessionId::new();
        state.session = Some(Session {
            id: id.clone(),
            task: task.clone(),
            workflow,
            started_at: Utc::now(),
            generation,
        });
        Ok((id, generation))
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state
            .lock()
            .session
            .as_ref()
            .is_some_and(|session| session.generation == generation)
    }

    fn finish_session(&self, generation: u64) {
        let mut state = self.state.lock();
        if state
            .session
            .as_ref()
            .is_some_and(|session| session.generation == generation)
        {
            state.session = None;
        }
    }

    async fn run_session(
        &self,
        task: &AutomationTask,
        workflow: &str,
    ) -> Result<(LayoutSnapshot, WorkflowReport), AutomationError> {
        if !self.preserver.start_preservation() {
            debug!("preservation already active");
        }
        let snapshot = self.layout.detect_current_layout();
        self.layout.enable_agent_mode();
        self.layout.apply_layout(&snapshot.preset)?;
        let report = self
            .engine
            .start_workflow(workflow, Some(Arc::new(task.clone())))
            .await?;
        Ok((snapshot, report))
    }

    /// Agent mode goes first: its restore would otherwise re-add protection tags.
    fn release_page(&self) {
        if self.layout.is_agent_mode() {
            self.layout.disable_agent_mode();
        }
        if self.preserver.is_active() {
            self.preserver.end_preservation();
        }
    }
}
