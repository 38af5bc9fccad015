use clap::Subcommand;

use super::config::ConfigArgs;
use super::inspect::DetectArgs;
use super::run::RunArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run an automation task against the demo page
    Run(RunArgs),

    /// Detect the page layout and matching preset
    Detect(DetectArgs),

    /// List the registered workflows and their steps
    Workflows,

    /// Inspect pagekeeper configuration
    Config(ConfigArgs),
}
