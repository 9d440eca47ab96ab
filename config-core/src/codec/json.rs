//! JSON dump format.
//!
//! ```text
//! { "<key>": { "type": "i32|u32|i64|float|bool|string|blob", "value": .. }, .. }
//! ```
//!
//! Keys are sorted. Blobs are standard base64. A sealed record adds
//! `"encrypted": true` and carries base64 of `nonce | ciphertext | tag` as its value.
//! Non-finite floats are written as `"NaN"`, `"inf"` and `"-inf"`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64;
use serde_json::{Map, Number, Value as Json};

use crate::error::{ConfigError, Result};
use crate::store::{Payload, Record};
use crate::value::{Value, ValueType};

use super::{Decoded, Limits};

const NAN: &str = "NaN";
const INFINITY: &str = "inf";
const NEG_INFINITY: &str = "-inf";

/// Render records as `{ "<key>": { "type": .., "value": .. } }` with keys sorted.
pub fn encode(records: &[Record], pretty: bool) -> Result<Vec<u8>> {
    let mut root = Map::new();
    for record in records {
        let mut entry = Map::new();
        entry.insert("type".into(), Json::from(record.value_type.as_str()));
        match &record.payload {
            Payload::Plain(value) => {
                entry.insert("value".into(), to_json(value));
            }
            Payload::Sealed(sealed) => {
                entry.insert("encrypted".into(), Json::Bool(true));
                entry.insert("value".into(), Json::String(Base64.encode(sealed)));
            }
        }
        root.insert(record.key.clone(), Json::Object(entry));
    }

    let root = Json::Object(root);
    let bytes = if pretty {
        serde_json::to_vec_pretty(&root)?
    } else {
        serde_json::to_vec(&root)?
    };
    Ok(bytes)
}

fn to_json(value: &Value) -> Json {
    match value {
        Value::I32(v) => Json::from(*v),
        Value::U32(v) => Json::from(*v),
        Value::I64(v) => Json::from(*v),
        Value::Float(v) => float_to_json(*v),
        Value::Bool(v) => Json::Bool(*v),
        Value::Str(s) => Json::String(s.clone()),
        Value::Blob(b) => Json::String(Base64.encode(b)),
    }
}

fn float_to_json(value: f32) -> Json {
    match Number::from_f64(f64::from(value)) {
        Some(number) => Json::Number(number),
        None if value.is_nan() => Json::from(NAN),
        None if value.is_sign_positive() => Json::from(INFINITY),
        None => Json::from(NEG_INFINITY),
    }
}

pub fn decode(bytes: &[u8], limits: &Limits, skip_errors: bool) -> Result<Decoded> {
    let root: Json = serde_json::from_slice(bytes)?;
    let Json::Object(entries) = root else {
        return Err(ConfigError::format("top-level JSON value must be an object"));
    };

    let mut decoded = Decoded::default();
    for (key, entry) in &entries {
        decoded.accept(key, parse_entry(key, entry), limits, skip_errors)?;
    }
    Ok(decoded)
}

fn parse_entry(key: &str, entry: &Json) -> core::result::Result<Record, &'static str> {
    let entry = entry.as_object().ok_or("entry must be an object")?;
    let type_name = entry
        .get("type")
        .and_then(Json::as_str)
        .ok_or("entry has no type name")?;
    let value_type = ValueType::from_name(type_name).ok_or("unknown type name")?;
    let encrypted = match entry.get("encrypted") {
        None => false,
        Some(flag) => flag.as_bool().ok_or("encrypted flag must be a boolean")?,
    };
    let raw = entry.get("value").ok_or("entry has no value")?;

    if encrypted {
        let text = raw.as_str().ok_or("sealed value must be base64 text")?;
        let sealed = Base64
            .decode(text.as_bytes())
            .map_err(|_| "sealed value is not valid base64")?;
        return Ok(Record::sealed(key, value_type, sealed));
    }

    let value = match value_type {
        ValueType::I32 => raw
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(Value::I32)
            .ok_or("value is not an i32")?,
        ValueType::U32 => raw
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(Value::U32)
            .ok_or("value is not a u32")?,
        ValueType::I64 => raw.as_i64().map(Value::I64).ok_or("value is not an i64")?,
        ValueType::Float => Value::Float(float_from_json(raw)?),
        ValueType::Bool => raw.as_bool().map(Value::Bool).ok_or("value is not a bool")?,
        ValueType::String => raw
            .as_str()
            .map(|s| Value::Str(s.to_owned()))
            .ok_or("value is not a string")?,
        ValueType::Blob => {
            let text = raw.as_str().ok_or("blob value must be base64 text")?;
            Value::Blob(
                Base64
                    .decode(text.as_bytes())
                    .map_err(|_| "blob value is not valid base64")?,
            )
        }
    };
    Ok(Record::plain(key, value))
}

fn float_from_json(raw: &Json) -> core::result::Result<f32, &'static str> {
    match raw {
        Json::Number(number) => {
            let wide = number.as_f64().ok_or("value is not a float")?;
            if wide.abs() > f64::from(f32::MAX) {
                return Err("float is outside the f32 range");
            }
            Ok(wide as f32)
        }
        Json::String(text) => match text.as_str() {
            NAN => Ok(f32::NAN),
            INFINITY => Ok(f32::INFINITY),
            NEG_INFINITY => Ok(f32::NEG_INFINITY),
            _ => Err("value is not a float"),
        },
        _ => Err("value is not a float"),
    }
}
