use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use pagekeeper::{AutomationCommand, AutomationEvent, DetailedStatus};
use pagekeeper_core_types::{
    AutomationTask, GeneralTask, MobileTask, PwaTask, SyncTask, TaskId, TaskKind, UiTask,
};
use pagekeeper_event_bus::to_mpsc;

use super::context::CliContext;
use super::output::{emit, OutputFormat};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum TaskArg {
    Ui,
    Mobile,
    Sync,
    Pwa,
    General,
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Kind of task to run
    #[arg(long, value_enum, default_value = "ui")]
    pub task: TaskArg,

    /// Page URL the demo page reports
    #[arg(long)]
    pub url: Option<String>,

    /// Viewport width in CSS pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Viewport height in CSS pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Instructions or description carried by the task
    #[arg(long)]
    pub note: Option<String>,

    /// Seconds to wait for the session outcome
    #[arg(long, default_value_t = 120)]
    pub wait_secs: u64,
}

#[derive(Serialize)]
struct RunOutput {
    outcome: AutomationEvent,
    status: DetailedStatus,
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let config = ctx.page_config(args.url.clone(), args.width, args.height);
    let app = ctx.app_context(config)?;
    let task = build_task(&args);

    let shutdown = CancellationToken::new();
    let listener = app
        .orchestrator
        .listen(app.commands.subscribe(), shutdown.clone());
    let mut events = to_mpsc(&app.orchestrator.events(), app.config.automation.event_capacity);
    app.commands.emit(AutomationCommand::Start { task: task.clone() });

    let waited = tokio::time::timeout(Duration::from_secs(args.wait_secs), async {
        tokio::select! {
            outcome = wait_for_outcome(&mut events, &task.id) => outcome,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted; stopping automation");
                app.commands.emit(AutomationCommand::Stop);
                wait_for_outcome(&mut events, &task.id).await
            }
        }
    })
    .await;

    shutdown.cancel();
    if let Err(err) = listener.await {
        debug!(error = %err, "command listener ended abnormally");
    }

    let outcome = waited.context("Timed out waiting for the automation outcome")??;
    let failure = match &outcome {
        AutomationEvent::Failed { error, .. } | AutomationEvent::Error { error, .. } => {
            Some(error.clone())
        }
        _ => None,
    };

    let result = RunOutput {
        outcome,
        status: app.orchestrator.detailed_status(),
    };
    emit(&output, &result, render_run)?;

    if let Some(error) = failure {
        bail!("Automation failed: {}", error);
    }
    Ok(())
}

fn build_task(args: &RunArgs) -> AutomationTask {
    let note = args.note.clone().unwrap_or_default();
    let kind = match args.task {
        TaskArg::Ui => TaskKind::UiDevelopment(UiTask { instructions: note }),
        TaskArg::Mobile => TaskKind::MobileDevelopment(MobileTask::default()),
        TaskArg::Sync => TaskKind::SyncOperation(SyncTask {
            record: json!({ "note": note }),
            ..SyncTask::default()
        }),
        TaskArg::Pwa => TaskKind::PwaMaintenance(PwaTask::default()),
        TaskArg::General => TaskKind::General(GeneralTask { description: note }),
    };
    AutomationTask::new(kind).with_label("cli")
}

/// Waits for the terminal event of `task`.
async fn wait_for_outcome(
    events: &mut mpsc::Receiver<AutomationEvent>,
    task_id: &TaskId,
) -> Result<AutomationEvent> {
    while let Some(event) = events.recv().await {
        let (owner, terminal) = match &event {
            AutomationEvent::Started { task, .. } => (&task.id, false),
            AutomationEvent::Completed { task, .. }
            | AutomationEvent::Failed { task, .. }
            | AutomationEvent::Error { task, .. }
            | AutomationEvent::Stopped { task } => (&task.id, true),
        };
        if owner == task_id && terminal {
            return Ok(event);
        }
        debug!(?event, "automation event");
    }
    bail!("Automation event stream closed")
}

fn render_run(result: &RunOutput) -> String {
    let mut out = String::new();
    match &result.outcome {
        AutomationEvent::Completed { report, .. } => {
            out.push_str(&format!(
                "Automation completed: {} ({}) in {}ms\n",
                report.workflow.workflow_id, report.layout.category, report.workflow.latency_ms
            ));
            for step in &report.workflow.steps {
                let mark = if step.success { "ok" } else { "failed" };
                out.push_str(&format!("  {:<28} {:>6} {:>5}ms\n", step.step, mark, step.latency_ms));
            }
        }
        AutomationEvent::Failed { error, .. } => {
            out.push_str(&format!("Automation failed: {error}\n"));
        }
        AutomationEvent::Error { error, .. } => {
            out.push_str(&format!("Automation error: {error}\n"));
        }
        AutomationEvent::Stopped { task } => {
            out.push_str(&format!("Automation stopped: task {}\n", task.id));
        }
        AutomationEvent::Started { workflow, .. } => {
            out.push_str(&format!("Automation started: {workflow}\n"));
        }
    }
    let status = &result.status;
    out.push_str(&format!(
        "Agent mode: {}  Preservation: {}  UI backups: {}  Layout backups: {}",
        if status.layout.agent_mode { "on" } else { "off" },
        if status.preserver.active { "active" } else { "inactive" },
        status.preserver.backups,
        status.layout.backups,
    ));
    out
}
