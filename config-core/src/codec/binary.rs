//! Versioned little-endian dump format.
//!
//! ```text
//! magic "CFGB" | version u16 | flags u16 | count u32
//! count × ( tag u8 | key_len u16 | key | value_len u32 | value )
//! crc32 u32 over everything before it
//! ```
//!
//! The low seven bits of `tag` hold the value type; bit 7 marks a sealed value.

use crate::error::{ConfigError, Result};
use crate::store::{Payload, Record};
use crate::value::{Value, ValueType};

use super::{Decoded, Limits};

pub const MAGIC: [u8; 4] = *b"CFGB";
pub const VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 12;
const TRAILER_SIZE: usize = 4;
const ENCRYPTED_TAG: u8 = 0x80;

pub fn encode(records: &[Record]) -> Result<Vec<u8>> {
    let count = u32::try_from(records.len())
        .map_err(|_| ConfigError::InvalidParam("too many records for one dump"))?;

    let mut out = Vec::with_capacity(HEADER_SIZE + TRAILER_SIZE + records.len() * 16);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());

    for record in records {
        let (tag, value) = match &record.payload {
            Payload::Plain(value) => (record.value_type.to_wire(), value.encode()),
            Payload::Sealed(sealed) => (record.value_type.to_wire() | ENCRYPTED_TAG, sealed.clone()),
        };
        let key_len = u16::try_from(record.key.len())
            .map_err(|_| ConfigError::InvalidParam("key too long for binary dump"))?;
        let value_len = u32::try_from(value.len())
            .map_err(|_| ConfigError::InvalidParam("value too large for binary dump"))?;

        out.push(tag);
        out.extend_from_slice(&key_len.to_le_bytes());
        out.extend_from_slice(record.key.as_bytes());
        out.extend_from_slice(&value_len.to_le_bytes());
        out.extend_from_slice(&value);
    }

    let checksum = crc32fast::hash(&out);
    out.extend_from_slice(&checksum.to_le_bytes());
    Ok(out)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| ConfigError::format("record runs past the end of the dump"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let raw = self.take(2)?;
        Ok(u16::from_le_bytes([raw[0], raw[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

pub fn decode(bytes: &[u8], limits: &Limits, skip_errors: bool) -> Result<Decoded> {
    if bytes.len() < HEADER_SIZE {
        return Err(ConfigError::format("binary header is truncated"));
    }
    if bytes[..4] != MAGIC {
        return Err(ConfigError::format(format!(
            "invalid magic 0x{:02X}{:02X}{:02X}{:02X}",
            bytes[0], bytes[1], bytes[2], bytes[3]
        )));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(ConfigError::format(format!(
            "unsupported binary version {version}"
        )));
    }
    if bytes.len() < HEADER_SIZE + TRAILER_SIZE {
        return Err(ConfigError::format("binary dump is missing its checksum"));
    }

    let (body, trailer) = bytes.split_at(bytes.len() - TRAILER_SIZE);
    let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    if crc32fast::hash(body) != expected {
        return Err(ConfigError::format("binary checksum mismatch"));
    }

    let count = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    let mut reader = Reader {
        bytes: &body[HEADER_SIZE..],
        pos: 0,
    };
    let mut decoded = Decoded::default();
    for _ in 0..count {
        let tag = reader.u8()?;
        let key_len = usize::from(reader.u16()?);
        let key = reader.take(key_len)?;
        let value_len = reader.u32()? as usize;
        let value = reader.take(value_len)?;

        let name = String::from_utf8_lossy(key);
        decoded.accept(&name, parse_record(tag, key, value), limits, skip_errors)?;
    }
    if reader.remaining() != 0 {
        return Err(ConfigError::format("trailing bytes after the last record"));
    }
    Ok(decoded)
}

fn parse_record(tag: u8, key: &[u8], value: &[u8]) -> core::result::Result<Record, &'static str> {
    let value_type = ValueType::from_wire(tag & !ENCRYPTED_TAG).ok_or("unknown type tag")?;
    let key = core::str::from_utf8(key).map_err(|_| "key is not valid UTF-8")?;
    if tag & ENCRYPTED_TAG != 0 {
        return Ok(Record::sealed(key, value_type, value.to_vec()));
    }
    let value = Value::decode(value_type, value)?;
    Ok(Record::plain(key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SEAL_OVERHEAD;

    const LIMITS: Limits = Limits {
        max_key_len: 32,
        max_value_size: 256,
    };

    fn sample() -> Vec<Record> {
        vec![
            Record::plain("a.int", Value::I32(-12345)),
            Record::plain("b.float", Value::Float(f32::from_bits(0x7FC0_0001))),
            Record::plain("c.blob", Value::Blob(vec![0, 1, 2, 0xFF])),
            Record::sealed("d.secret", ValueType::String, vec![7; SEAL_OVERHEAD + 3]),
        ]
    }

    fn reseal(bytes: &mut Vec<u8>) {
        let body_len = bytes.len() - TRAILER_SIZE;
        let checksum = crc32fast::hash(&bytes[..body_len]);
        bytes[body_len..].copy_from_slice(&checksum.to_le_bytes());
    }

    #[test]
    fn records_survive_encoding() {
        let records = sample();
        let bytes = encode(&records).unwrap();
        assert_eq!(&bytes[..4], b"CFGB");

        let decoded = decode(&bytes, &LIMITS, false).unwrap();
        assert_eq!(decoded.skipped, 0);
        assert_eq!(decoded.records.len(), 4);
        assert!(decoded.records[3].is_encrypted());
        match &decoded.records[1].payload {
            Payload::Plain(Value::Float(v)) => assert_eq!(v.to_bits(), 0x7FC0_0001),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn empty_dump_is_header_plus_checksum() {
        let bytes = encode(&[]).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + TRAILER_SIZE);
        assert!(decode(&bytes, &LIMITS, false).unwrap().records.is_empty());
    }

    #[test]
    fn structural_damage_is_fatal_even_when_skipping() {
        let bytes = encode(&sample()).unwrap();

        assert!(matches!(
            decode(&bytes[..8], &LIMITS, true),
            Err(ConfigError::InvalidFormat(_))
        ));

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(decode(&bad_magic, &LIMITS, true).is_err());

        let mut flipped = bytes.clone();
        flipped[HEADER_SIZE + 4] ^= 0x01;
        assert!(decode(&flipped, &LIMITS, true).is_err());

        let mut overrun = bytes.clone();
        overrun[8] = 9;
        reseal(&mut overrun);
        assert!(decode(&overrun, &LIMITS, true).is_err());
    }

    #[test]
    fn malformed_record_is_skippable() {
        let records = vec![
            Record::plain("ok", Value::U32(1)),
            Record::plain("bad", Value::Bool(true)),
        ];
        let mut bytes = encode(&records).unwrap();
        // Value byte of the bool record is the last byte before the checksum.
        let value_at = bytes.len() - TRAILER_SIZE - 1;
        bytes[value_at] = 7;
        reseal(&mut bytes);

        assert!(matches!(
            decode(&bytes, &LIMITS, false),
            Err(ConfigError::InvalidFormat(_))
        ));
        let decoded = decode(&bytes, &LIMITS, true).unwrap();
        assert_eq!(decoded.records, vec![Record::plain("ok", Value::U32(1))]);
        assert_eq!(decoded.skipped, 1);
    }
}
