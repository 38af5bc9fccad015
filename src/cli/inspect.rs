use anyhow::Result;
use clap::Args;

use pagekeeper_layout::LayoutSnapshot;
use pagekeeper_workflow::{WorkflowEngine, WorkflowInfo};

use super::context::CliContext;
use super::output::{emit, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct DetectArgs {
    /// Page URL to classify
    #[arg(long)]
    pub url: Option<String>,

    /// Viewport width in CSS pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Viewport height in CSS pixels
    #[arg(long)]
    pub height: Option<u32>,
}

pub fn cmd_detect(args: DetectArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let config = ctx.page_config(args.url, args.width, args.height);
    let app = ctx.app_context(config)?;
    let snapshot = app.layout.detect_current_layout();
    emit(&output, &snapshot, render_snapshot)
}

pub fn cmd_workflows(ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let app = ctx.default_app_context()?;
    let workflows = app.engine.workflows();
    emit(&output, &workflows, |list| render_workflows(list))
}

fn render_snapshot(snapshot: &LayoutSnapshot) -> String {
    format!(
        "Viewport:   {}\nCategory:   {}\nMode:       {}\nTheme:      {}\nStylesheet: {}\nBreakpoints: {:?}",
        snapshot.viewport,
        snapshot.category,
        snapshot
            .preset
            .mode
            .map(|mode| mode.to_string())
            .unwrap_or_else(|| "-".into()),
        snapshot.preset.theme,
        snapshot.preset.css_href(),
        snapshot.preset.breakpoints,
    )
}

fn render_workflows(workflows: &[WorkflowInfo]) -> String {
    let mut out = String::new();
    for workflow in workflows {
        out.push_str(&format!(
            "{} ({})\n  {}\n",
            workflow.id, workflow.name, workflow.description
        ));
        for (index, step) in workflow.steps.iter().enumerate() {
            out.push_str(&format!(
                "  {:>2}. {:<28} {:>6}ms\n",
                index + 1,
                step.name,
                step.timeout_ms
            ));
        }
    }
    out.trim_end().to_string()
}
