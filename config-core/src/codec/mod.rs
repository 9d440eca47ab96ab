//! Export and import codecs.
//!
//! Both formats carry a flat list of [`Record`]s. Encrypted records travel as the
//! sealed bytes unless the manager opened them before encoding. Decoding separates
//! structural damage, which always aborts, from malformed individual records, which
//! [`ImportFlags::SKIP_ERRORS`] turns into skips.

pub mod binary;
pub mod json;

use core::fmt;
use core::str::FromStr;

use bitflags::bitflags;

use crate::crypto::SEAL_OVERHEAD;
use crate::error::{ConfigError, Result};
use crate::store::{Payload, Record};

/// Wire formats understood by export and import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Binary,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => f.write_str("json"),
            ExportFormat::Binary => f.write_str("binary"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(ExportFormat::Json),
            "binary" | "bin" => Ok(ExportFormat::Binary),
            _ => Err(ConfigError::InvalidParam("unknown export format")),
        }
    }
}

bitflags! {
    /// Export options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ExportFlags: u32 {
        /// Indent JSON output. Ignored by the binary format.
        const PRETTY = 0b0001;
        /// Emit plaintext for encrypted entries using the active key.
        const DECRYPT = 0b0010;
    }
}

bitflags! {
    /// Import options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ImportFlags: u32 {
        /// Drop every entry of the target partition before applying records.
        const CLEAR = 0b0001;
        /// Skip malformed records instead of aborting the import.
        const SKIP_ERRORS = 0b0010;
    }
}

/// Outcome of a successful import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub applied: usize,
    pub skipped: usize,
}

/// Key and value bounds a decoded record must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_key_len: usize,
    pub max_value_size: usize,
}

impl Limits {
    pub(crate) fn check(&self, record: &Record) -> core::result::Result<(), &'static str> {
        if record.key.is_empty() {
            return Err("key is empty");
        }
        if record.key.len() > self.max_key_len {
            return Err("key exceeds the configured length");
        }
        match &record.payload {
            Payload::Plain(value) => {
                if value.value_type() != record.value_type {
                    return Err("value does not match its declared type");
                }
                if value.payload_len() > self.max_value_size {
                    return Err("value exceeds the configured size");
                }
            }
            Payload::Sealed(sealed) => {
                if !record.value_type.is_sealable() {
                    return Err("only string and blob values can be encrypted");
                }
                if sealed.len() < SEAL_OVERHEAD {
                    return Err("sealed value is truncated");
                }
                if sealed.len() - SEAL_OVERHEAD > self.max_value_size {
                    return Err("value exceeds the configured size");
                }
            }
        }
        Ok(())
    }
}

/// Records recovered from an import buffer.
#[derive(Debug, Default)]
pub struct Decoded {
    pub records: Vec<Record>,
    pub skipped: usize,
}

impl Decoded {
    /// Keep a record that parsed and passed `limits`, or account for a bad one.
    pub(crate) fn accept(
        &mut self,
        key: &str,
        parsed: core::result::Result<Record, &'static str>,
        limits: &Limits,
        skip_errors: bool,
    ) -> Result<()> {
        let reason = match parsed {
            Ok(record) => match limits.check(&record) {
                Ok(()) => {
                    self.records.push(record);
                    return Ok(());
                }
                Err(reason) => reason,
            },
            Err(reason) => reason,
        };

        if skip_errors {
            log::warn!("skipping malformed record '{key}': {reason}");
            self.skipped += 1;
            Ok(())
        } else {
            Err(ConfigError::format(format!("record '{key}': {reason}")))
        }
    }
}

/// Encode records in the requested format.
pub fn encode(format: ExportFormat, records: &[Record], pretty: bool) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Json => json::encode(records, pretty),
        ExportFormat::Binary => binary::encode(records),
    }
}

/// Decode an import buffer.
pub fn decode(
    format: ExportFormat,
    bytes: &[u8],
    limits: &Limits,
    skip_errors: bool,
) -> Result<Decoded> {
    match format {
        ExportFormat::Json => json::decode(bytes, limits, skip_errors),
        ExportFormat::Binary => binary::decode(bytes, limits, skip_errors),
    }
}
