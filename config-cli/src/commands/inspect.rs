use std::io::Write;
use std::ops::ControlFlow;

use anyhow::Result;
use config_core::ManagerConfig;

use super::load_dump;
use crate::InspectArgs;

pub fn run<W>(args: &InspectArgs, config: ManagerConfig, out: &mut W) -> Result<()>
where
    W: Write + ?Sized,
{
    let dump = load_dump(&args.file, args.format, config)?;

    let mut rows = Vec::new();
    dump.manager.iterate(|entry| {
        rows.push((entry.key.clone(), entry.value_type, entry.encrypted));
        ControlFlow::Continue(())
    })?;

    let width = rows.iter().map(|(key, _, _)| key.len()).max().unwrap_or(0);
    writeln!(
        out,
        "{} ({} dump, {} records)",
        args.file.display(),
        dump.format,
        rows.len()
    )?;
    for (key, value_type, encrypted) in rows {
        let marker = if encrypted { "  encrypted" } else { "" };
        writeln!(out, "  {key:<width$}  {value_type:<6}{marker}")?;
    }
    Ok(())
}
