//! Tagged value model shared by the entry store, the codecs and the backends.
//!
//! Every entry carries exactly one [`Value`] variant and its type tag never changes
//! while the entry lives. Reads name the type they expect and fail with
//! [`TypeMismatch`](crate::ConfigError::TypeMismatch) instead of coercing.

use core::fmt;

/// Type tag of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ValueType {
    I32 = 0,
    U32 = 1,
    I64 = 2,
    Float = 3,
    Bool = 4,
    String = 5,
    Blob = 6,
}

impl ValueType {
    pub const ALL: [ValueType; 7] = [
        ValueType::I32,
        ValueType::U32,
        ValueType::I64,
        ValueType::Float,
        ValueType::Bool,
        ValueType::String,
        ValueType::Blob,
    ];

    /// Stable identifier used by the JSON codec.
    pub const fn as_str(self) -> &'static str {
        match self {
            ValueType::I32 => "i32",
            ValueType::U32 => "u32",
            ValueType::I64 => "i64",
            ValueType::Float => "float",
            ValueType::Bool => "bool",
            ValueType::String => "string",
            ValueType::Blob => "blob",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.as_str() == name)
    }

    pub const fn to_wire(self) -> u8 {
        self as u8
    }

    pub fn from_wire(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.to_wire() == tag)
    }

    /// Whether values of this type may be stored encrypted.
    pub const fn is_sealable(self) -> bool {
        matches!(self, ValueType::String | ValueType::Blob)
    }

    /// Encoded width of fixed-size types, `None` for strings and blobs.
    pub const fn fixed_width(self) -> Option<usize> {
        match self {
            ValueType::I32 | ValueType::U32 | ValueType::Float => Some(4),
            ValueType::I64 => Some(8),
            ValueType::Bool => Some(1),
            ValueType::String | ValueType::Blob => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A typed configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    I32(i32),
    U32(u32),
    I64(i64),
    Float(f32),
    Bool(bool),
    Str(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::I32(_) => ValueType::I32,
            Value::U32(_) => ValueType::U32,
            Value::I64(_) => ValueType::I64,
            Value::Float(_) => ValueType::Float,
            Value::Bool(_) => ValueType::Bool,
            Value::Str(_) => ValueType::String,
            Value::Blob(_) => ValueType::Blob,
        }
    }

    /// Size counted against the configured value limit.
    pub fn payload_len(&self) -> usize {
        match self {
            Value::Str(s) => s.len(),
            Value::Blob(b) => b.len(),
            other => other.value_type().fixed_width().unwrap_or(0),
        }
    }

    /// Little-endian payload bytes as written by the binary codec.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Value::I32(v) => v.to_le_bytes().to_vec(),
            Value::U32(v) => v.to_le_bytes().to_vec(),
            Value::I64(v) => v.to_le_bytes().to_vec(),
            Value::Float(v) => v.to_bits().to_le_bytes().to_vec(),
            Value::Bool(v) => vec![u8::from(*v)],
            Value::Str(s) => s.as_bytes().to_vec(),
            Value::Blob(b) => b.clone(),
        }
    }

    /// Inverse of [`Value::encode`]. Returns a short reason on malformed input.
    pub fn decode(value_type: ValueType, bytes: &[u8]) -> Result<Self, &'static str> {
        if let Some(width) = value_type.fixed_width()
            && bytes.len() != width
        {
            return Err("fixed-width value has the wrong length");
        }

        let value = match value_type {
            ValueType::I32 => Value::I32(i32::from_le_bytes(array(bytes))),
            ValueType::U32 => Value::U32(u32::from_le_bytes(array(bytes))),
            ValueType::I64 => Value::I64(i64::from_le_bytes(array(bytes))),
            ValueType::Float => Value::Float(f32::from_bits(u32::from_le_bytes(array(bytes)))),
            ValueType::Bool => match bytes[0] {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                _ => return Err("boolean byte must be 0 or 1"),
            },
            ValueType::String => Value::Str(
                String::from_utf8(bytes.to_vec()).map_err(|_| "string is not valid UTF-8")?,
            ),
            ValueType::Blob => Value::Blob(bytes.to_vec()),
        };
        Ok(value)
    }
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

mod sealed {
    pub trait Sealed {}
}

/// Rust types that map one-to-one onto a [`ValueType`].
pub trait ConfigValue: Sized + sealed::Sealed {
    const TYPE: ValueType;

    fn into_value(self) -> Value;

    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! config_value {
    ($ty:ty, $tag:ident, $variant:ident) => {
        impl sealed::Sealed for $ty {}

        impl ConfigValue for $ty {
            const TYPE: ValueType = ValueType::$tag;

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Value::$variant(value)
            }
        }
    };
}

config_value!(i32, I32, I32);
config_value!(u32, U32, U32);
config_value!(i64, I64, I64);
config_value!(f32, Float, Float);
config_value!(bool, Bool, Bool);
config_value!(String, String, Str);
config_value!(Vec<u8>, Blob, Blob);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_owned())
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Blob(value.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_round_trip() {
        for ty in ValueType::ALL {
            assert_eq!(ValueType::from_name(ty.as_str()), Some(ty));
            assert_eq!(ValueType::from_wire(ty.to_wire()), Some(ty));
        }
        assert_eq!(ValueType::from_name("double"), None);
        assert_eq!(ValueType::from_wire(0x7F), None);
    }

    #[test]
    fn float_encoding_keeps_nan_payload() {
        let quiet = f32::from_bits(0x7FC0_1234);
        let bytes = Value::Float(quiet).encode();
        match Value::decode(ValueType::Float, &bytes).expect("decode") {
            Value::Float(v) => assert_eq!(v.to_bits(), 0x7FC0_1234),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_bad_widths_and_utf8() {
        assert!(Value::decode(ValueType::I64, &[0; 4]).is_err());
        assert!(Value::decode(ValueType::Bool, &[2]).is_err());
        assert!(Value::decode(ValueType::String, &[0xFF, 0xFE]).is_err());
    }

    #[test]
    fn conversions_are_type_exact() {
        assert_eq!(i32::from_value(Value::I32(-4)), Some(-4));
        assert_eq!(u32::from_value(Value::I32(4)), None);
        assert_eq!(<Vec<u8>>::TYPE, ValueType::Blob);
        assert_eq!(Value::from("x").value_type(), ValueType::String);
    }
}
