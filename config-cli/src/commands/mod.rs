use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use config_core::codec::binary;
use config_core::{ConfigManager, ExportFormat, ImportFlags, ImportReport, ManagerConfig};

use crate::Command;

pub mod convert;
pub mod inspect;
pub mod validate;

pub fn run<W>(command: Command, config: ManagerConfig, out: &mut W) -> Result<()>
where
    W: Write + ?Sized,
{
    match command {
        Command::Inspect(args) => inspect::run(&args, config, out),
        Command::Convert(args) => convert::run(&args, config, out),
        Command::Validate(args) => validate::run(&args, config, out),
    }
}

/// A dump read from disk and imported into a scratch manager.
pub(crate) struct LoadedDump {
    pub manager: ConfigManager,
    pub format: ExportFormat,
    pub report: ImportReport,
}

pub(crate) fn load_dump(
    path: &Path,
    format: Option<ExportFormat>,
    config: ManagerConfig,
) -> Result<LoadedDump> {
    let data = fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
    let format = format.unwrap_or_else(|| detect_format(&data));
    log::debug!("reading '{}' as {format} ({} bytes)", path.display(), data.len());

    let manager = ConfigManager::with_config(config)?;
    let report = manager
        .import(format, ImportFlags::empty(), &data)
        .with_context(|| format!("'{}' is not a valid {format} dump", path.display()))?;

    Ok(LoadedDump {
        manager,
        format,
        report,
    })
}

/// Binary dumps open with a fixed magic; anything else is treated as JSON.
pub(crate) fn detect_format(data: &[u8]) -> ExportFormat {
    if data.starts_with(&binary::MAGIC) {
        ExportFormat::Binary
    } else {
        ExportFormat::Json
    }
}
