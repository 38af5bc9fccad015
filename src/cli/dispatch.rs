use anyhow::Result;

use super::config::cmd_config;
use super::context::CliContext;
use super::env::CliArgs;
use super::inspect::{cmd_detect, cmd_workflows};
use super::run::cmd_run;
use crate::cli::commands::Commands;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    let output = cli.output.clone();
    match cli.command.clone() {
        Commands::Run(args) => cmd_run(args, ctx, output).await,
        Commands::Detect(args) => cmd_detect(args, ctx, output),
        Commands::Workflows => cmd_workflows(ctx, output),
        Commands::Config(args) => cmd_config(args, ctx, output),
    }
}
