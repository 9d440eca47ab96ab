use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use config_core::{ExportFormat, ManagerConfig};

mod commands;

#[cfg(test)]
mod tests;

#[derive(Parser, Debug)]
#[command(author, version, about = "Configuration dump host tool")]
pub struct Cli {
    /// JSON file with manager limits. Built-in defaults apply when omitted.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List every record of a dump with its type and encryption flag.
    Inspect(InspectArgs),
    /// Re-encode a dump into another format. Sealed records stay sealed.
    Convert(ConvertArgs),
    /// Import a dump in strict mode and report the record count.
    Validate(ValidateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Dump to read.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
    /// Dump format (json or binary). Detected from the content when omitted.
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<ExportFormat>,
}

#[derive(Args, Debug, Clone)]
pub struct ConvertArgs {
    /// Dump to read.
    #[arg(value_name = "IN")]
    pub input: PathBuf,
    /// Destination file, overwritten if present.
    #[arg(value_name = "OUT")]
    pub output: PathBuf,
    /// Format of the input dump. Detected from the content when omitted.
    #[arg(long, value_name = "FORMAT")]
    pub from: Option<ExportFormat>,
    /// Format of the output dump.
    #[arg(long, value_name = "FORMAT")]
    pub to: ExportFormat,
    /// Indent JSON output.
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Dump to check.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
    /// Dump format (json or binary). Detected from the content when omitted.
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<ExportFormat>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ManagerConfig::from_json_file(path)
            .with_context(|| format!("failed to load manager config '{}'", path.display()))?,
        None => ManagerConfig::default(),
    };
    log::debug!("manager limits: {config:?}");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    commands::run(cli.command, config, &mut out)
}
