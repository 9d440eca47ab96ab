use std::fs;
use std::io::Write;

use anyhow::{Context, Result};
use config_core::{ExportFlags, ManagerConfig};

use super::load_dump;
use crate::ConvertArgs;

pub fn run<W>(args: &ConvertArgs, config: ManagerConfig, out: &mut W) -> Result<()>
where
    W: Write + ?Sized,
{
    let dump = load_dump(&args.input, args.from, config)?;

    // Without DECRYPT sealed records are written out as ciphertext.
    let flags = if args.pretty {
        ExportFlags::PRETTY
    } else {
        ExportFlags::empty()
    };
    let bytes = dump.manager.export_to_vec(args.to, flags)?;
    fs::write(&args.output, &bytes)
        .with_context(|| format!("failed to write '{}'", args.output.display()))?;

    log::info!(
        "converted '{}' ({}) to '{}' ({})",
        args.input.display(),
        dump.format,
        args.output.display(),
        args.to
    );
    writeln!(
        out,
        "Wrote {} records to '{}' ({} bytes)",
        dump.report.applied,
        args.output.display(),
        bytes.len()
    )?;
    Ok(())
}
