use std::fs;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser};
use config_core::{
    CipherAlgorithm, ConfigManager, ExportFlags, ExportFormat, ImportFlags, ManagerConfig,
};
use tempfile::TempDir;

use crate::commands::{self, detect_format};
use crate::{Cli, Command, ConvertArgs, InspectArgs, ValidateArgs};

const KEY: [u8; 16] = [0x5A; 16];

fn sample_manager() -> ConfigManager {
    let manager = ConfigManager::with_config(ManagerConfig::default()).expect("init");
    manager
        .set_encryption_key(&KEY, CipherAlgorithm::Aes128)
        .expect("key");
    manager.set_str("wifi.ssid", "home").expect("set");
    manager.set_u32("boot.count", 7).expect("set");
    manager
        .set_str_encrypted("wifi.pass", "hunter2")
        .expect("set sealed");
    manager
}

fn write_dump(dir: &Path, name: &str, format: ExportFormat) -> PathBuf {
    let bytes = sample_manager()
        .export_to_vec(format, ExportFlags::empty())
        .expect("export");
    let path = dir.join(name);
    fs::write(&path, bytes).expect("write dump");
    path
}

fn run_to_string(command: Command) -> anyhow::Result<String> {
    let mut out = Vec::new();
    commands::run(command, ManagerConfig::default(), &mut out)?;
    Ok(String::from_utf8(out).expect("utf-8 output"))
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn parses_formats_and_global_config() {
    let cli = Cli::try_parse_from([
        "config-cli",
        "convert",
        "in.bin",
        "out.json",
        "--from",
        "bin",
        "--to",
        "json",
        "--pretty",
        "--config",
        "limits.json",
    ])
    .expect("arguments parse");

    assert_eq!(cli.config.as_deref(), Some(Path::new("limits.json")));
    match cli.command {
        Command::Convert(args) => {
            assert_eq!(args.from, Some(ExportFormat::Binary));
            assert_eq!(args.to, ExportFormat::Json);
            assert!(args.pretty);
        }
        other => panic!("unexpected command {other:?}"),
    }

    assert!(Cli::try_parse_from(["config-cli", "inspect", "f", "--format", "yaml"]).is_err());
}

#[test]
fn format_detection_uses_binary_magic() {
    let binary = sample_manager()
        .export_to_vec(ExportFormat::Binary, ExportFlags::empty())
        .expect("export");
    assert_eq!(detect_format(&binary), ExportFormat::Binary);
    assert_eq!(detect_format(b"{}"), ExportFormat::Json);
    assert_eq!(detect_format(b""), ExportFormat::Json);
}

#[test]
fn inspect_lists_records_in_key_order() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_dump(dir.path(), "dump.bin", ExportFormat::Binary);

    let output = run_to_string(Command::Inspect(InspectArgs {
        file: path,
        format: None,
    }))
    .expect("inspect succeeds");

    let lines: Vec<&str> = output.lines().collect();
    assert!(lines[0].ends_with("(binary dump, 3 records)"));
    assert!(lines[1].contains("boot.count") && lines[1].contains("u32"));
    assert!(lines[2].contains("wifi.pass") && lines[2].ends_with("encrypted"));
    assert!(lines[3].contains("wifi.ssid") && !lines[3].ends_with("encrypted"));
    assert!(!output.contains("hunter2"));
}

#[test]
fn convert_keeps_sealed_records_sealed() {
    let dir = TempDir::new().expect("temp dir");
    let input = write_dump(dir.path(), "dump.bin", ExportFormat::Binary);
    let output = dir.path().join("dump.json");

    let summary = run_to_string(Command::Convert(ConvertArgs {
        input,
        output: output.clone(),
        from: Some(ExportFormat::Binary),
        to: ExportFormat::Json,
        pretty: true,
    }))
    .expect("convert succeeds");
    assert!(summary.starts_with("Wrote 3 records"));

    let text = fs::read_to_string(&output).expect("read converted dump");
    let json: serde_json::Value = serde_json::from_str(&text).expect("valid json");
    assert_eq!(json["wifi.pass"]["encrypted"], serde_json::Value::Bool(true));
    assert!(!text.contains("hunter2"));

    let target = ConfigManager::with_config(ManagerConfig::default()).expect("init");
    target
        .set_encryption_key(&KEY, CipherAlgorithm::Aes128)
        .expect("key");
    target
        .import(ExportFormat::Json, ImportFlags::empty(), text.as_bytes())
        .expect("import converted dump");
    assert_eq!(target.get_str("wifi.pass", "").expect("decrypt"), "hunter2");
    assert_eq!(target.get_u32("boot.count", 0).expect("read"), 7);
}

#[test]
fn validate_reports_counts_and_rejects_damage() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_dump(dir.path(), "dump.json", ExportFormat::Json);

    let output = run_to_string(Command::Validate(ValidateArgs {
        file: path.clone(),
        format: Some(ExportFormat::Json),
    }))
    .expect("validate succeeds");
    assert!(output.ends_with("valid json dump, 3 records (1 encrypted)\n"));

    let mut damaged = fs::read(&path).expect("read dump");
    damaged.truncate(damaged.len() / 2);
    fs::write(&path, damaged).expect("write damaged dump");

    let err = run_to_string(Command::Validate(ValidateArgs {
        file: path,
        format: None,
    }))
    .unwrap_err();
    assert!(err.to_string().contains("is not a valid json dump"));
}

#[test]
fn missing_input_is_reported() {
    let dir = TempDir::new().expect("temp dir");
    let err = run_to_string(Command::Inspect(InspectArgs {
        file: dir.path().join("absent.bin"),
        format: None,
    }))
    .unwrap_err();
    assert!(err.to_string().starts_with("failed to read"));
}

#[test]
fn limits_from_config_file_apply() {
    let dir = TempDir::new().expect("temp dir");
    let dump = write_dump(dir.path(), "dump.json", ExportFormat::Json);
    let limits = dir.path().join("limits.json");
    fs::write(&limits, r#"{ "max_key_len": 16 }"#).expect("write limits");

    let long_key = "a.rather.long.key.name";
    let manager = ConfigManager::with_config(ManagerConfig::default()).expect("init");
    manager.set_bool(long_key, true).expect("set");
    let bytes = manager
        .export_to_vec(ExportFormat::Json, ExportFlags::empty())
        .expect("export");
    let long = dir.path().join("long.json");
    fs::write(&long, bytes).expect("write dump");

    let config = ManagerConfig::from_json_file(&limits).expect("limits parse");
    let mut out = Vec::new();
    commands::run(
        Command::Validate(ValidateArgs {
            file: dump,
            format: None,
        }),
        config.clone(),
        &mut out,
    )
    .expect("short keys fit");
    assert!(
        commands::run(
            Command::Validate(ValidateArgs {
                file: long,
                format: None,
            }),
            config,
            &mut out,
        )
        .is_err()
    );
}
