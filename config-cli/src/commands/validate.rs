use std::io::Write;

use anyhow::Result;
use config_core::ManagerConfig;

use super::load_dump;
use crate::ValidateArgs;

pub fn run<W>(args: &ValidateArgs, config: ManagerConfig, out: &mut W) -> Result<()>
where
    W: Write + ?Sized,
{
    let dump = load_dump(&args.file, args.format, config)?;
    let encrypted = dump
        .manager
        .keys()?
        .iter()
        .filter(|key| dump.manager.is_encrypted(key).unwrap_or(false))
        .count();

    writeln!(
        out,
        "{}: valid {} dump, {} records ({} encrypted)",
        args.file.display(),
        dump.format,
        dump.report.applied,
        encrypted
    )?;
    Ok(())
}
