use anyhow::Result;
use clap::{Args, Subcommand};

use super::context::CliContext;
use super::output::{emit, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Print the configuration file location
    Path,
}

pub fn cmd_config(args: ConfigArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let config = ctx.config();
            let rendered = config.to_yaml()?;
            emit(&output, config, |_| match ctx.config_path() {
                Some(path) => format!("Current configuration ({}):\n{}", path.display(), rendered),
                None => format!("Current configuration (defaults):\n{}", rendered),
            })
        }
        ConfigAction::Path => {
            let path = ctx.config_path().map(|p| p.display().to_string());
            emit(&output, &path, |path| {
                path.clone()
                    .unwrap_or_else(|| "no configuration path available".to_string())
            })
        }
    }
}
