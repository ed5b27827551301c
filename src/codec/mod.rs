//! Record codec
//!
//! Schema-driven binary encoding for a single key or value.
//!
//! ## Wire Format
//! - null:     nothing
//! - boolean:  1 byte, 0 or 1
//! - int/long: zigzag varint (max 5 / 10 bytes)
//! - float/double: little-endian IEEE 754 (4 / 8 bytes)
//! - bytes/string: varint length + bytes (string must be UTF-8)
//! - array:    varint count + items
//! - map:      varint count + (string key, value) in ascending key order
//! - optional: tag byte (0 = null, 1 = present) + value
//! - record:   fields in schema order
//!
//! Encoding is deterministic: the same value always yields the same bytes,
//! which the default partitioner relies on.

mod compress;

use std::collections::BTreeMap;

use bytes::BufMut;

use crate::error::{Result, ShardError};
use crate::schema::{Schema, Value};

pub(crate) use compress::{compress_block, decompress_block};

/// Maximum bytes of a zigzag-encoded i32
const MAX_VARINT32_LEN: usize = 5;

/// Maximum bytes of a zigzag-encoded i64
const MAX_VARINT64_LEN: usize = 10;

/// Upper bound on items that encode to zero bytes (e.g. nulls), summed over
/// one decoded value
const MAX_ZERO_WIDTH_ITEMS: u64 = 1 << 20;

// =============================================================================
// Encoding
// =============================================================================

/// Encode a value against a schema
pub fn encode(value: &Value, schema: &Schema) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_into(value, schema, &mut buf)?;
    Ok(buf)
}

/// Encode a value against a schema, appending to `buf`
pub fn encode_into<B: BufMut>(value: &Value, schema: &Schema, buf: &mut B) -> Result<()> {
    match (schema, value) {
        (Schema::Null, Value::Null) => {}
        (Schema::Boolean, Value::Boolean(b)) => buf.put_u8(*b as u8),
        (Schema::Int, Value::Int(v)) => put_varint(buf, zigzag32(*v) as u64),
        (Schema::Long, Value::Long(v)) => put_varint(buf, zigzag64(*v)),
        (Schema::Float, Value::Float(v)) => buf.put_f32_le(*v),
        (Schema::Double, Value::Double(v)) => buf.put_f64_le(*v),
        (Schema::Bytes, Value::Bytes(bytes)) => put_bytes(buf, bytes),
        (Schema::String, Value::String(s)) => put_bytes(buf, s.as_bytes()),
        (Schema::Array(items), Value::Array(values)) => {
            put_varint(buf, values.len() as u64);
            for item in values {
                encode_into(item, items, buf)?;
            }
        }
        (Schema::Map(values), Value::Map(entries)) => {
            // BTreeMap iteration is already in ascending key order
            put_varint(buf, entries.len() as u64);
            for (key, item) in entries {
                put_bytes(buf, key.as_bytes());
                encode_into(item, values, buf)?;
            }
        }
        (Schema::Optional(_), Value::Null) => buf.put_u8(0),
        (Schema::Optional(inner), value) => {
            buf.put_u8(1);
            encode_into(value, inner, buf)?;
        }
        (Schema::Record { name, fields }, Value::Record(values)) => {
            if fields.len() != values.len() {
                return Err(ShardError::SchemaMismatch(format!(
                    "record {} has {} fields, value has {}",
                    name,
                    fields.len(),
                    values.len()
                )));
            }
            for (field, (field_name, item)) in fields.iter().zip(values) {
                if &field.name != field_name {
                    return Err(ShardError::SchemaMismatch(format!(
                        "record {}: expected field {}, got {}",
                        name, field.name, field_name
                    )));
                }
                encode_into(item, &field.schema, buf)?;
            }
        }
        (schema, value) => {
            return Err(ShardError::SchemaMismatch(format!(
                "cannot encode {} as {}",
                value, schema
            )))
        }
    }
    Ok(())
}

fn zigzag32(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

fn zigzag64(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn put_varint<B: BufMut>(buf: &mut B, mut v: u64) {
    while v >= 0x80 {
        buf.put_u8((v as u8) | 0x80);
        v >>= 7;
    }
    buf.put_u8(v as u8);
}

fn put_bytes<B: BufMut>(buf: &mut B, bytes: &[u8]) {
    put_varint(buf, bytes.len() as u64);
    buf.put_slice(bytes);
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a value against a schema
///
/// The whole input must be consumed; trailing bytes are `CorruptRecord`.
pub fn decode(bytes: &[u8], schema: &Schema) -> Result<Value> {
    let mut decoder = Decoder {
        bytes,
        pos: 0,
        zero_width_items: 0,
    };
    let value = decoder.value(schema)?;
    if decoder.pos != bytes.len() {
        return Err(ShardError::CorruptRecord(format!(
            "{} trailing bytes after {}",
            bytes.len() - decoder.pos,
            schema.type_name()
        )));
    }
    Ok(value)
}

/// Smallest number of bytes any value of `schema` encodes to
fn min_encoded_len(schema: &Schema) -> usize {
    match schema {
        Schema::Null => 0,
        Schema::Boolean | Schema::Int | Schema::Long => 1,
        Schema::Float => 4,
        Schema::Double => 8,
        Schema::Bytes | Schema::String | Schema::Array(_) | Schema::Map(_) => 1,
        Schema::Optional(_) => 1,
        Schema::Record { fields, .. } => fields.iter().map(|f| min_encoded_len(&f.schema)).sum(),
    }
}

struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    /// Zero-width items promised by counts decoded so far
    zero_width_items: u64,
}

impl<'a> Decoder<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let remaining = self.bytes.len() - self.pos;
        if len > remaining {
            return Err(ShardError::CorruptRecord(format!(
                "need {} bytes at offset {}, only {} left",
                len, self.pos, remaining
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Unsigned LEB128; only the canonical (shortest) form is accepted
    fn varint(&mut self, max_len: usize) -> Result<u64> {
        let mut result = 0u64;
        for i in 0..max_len {
            let b = self.byte()?;
            let shift = 7 * i as u32;
            let payload = (b & 0x7f) as u64;
            // the tenth byte carries only bit 63
            if shift == 63 && payload > 1 {
                return Err(ShardError::CorruptRecord(format!(
                    "varint overflows 64 bits at byte {}",
                    i
                )));
            }
            result |= payload << shift;
            if b & 0x80 == 0 {
                if i > 0 && b == 0 {
                    return Err(ShardError::CorruptRecord(
                        "non-canonical varint (trailing zero byte)".to_string(),
                    ));
                }
                return Ok(result);
            }
        }
        Err(ShardError::CorruptRecord(format!(
            "varint longer than {} bytes",
            max_len
        )))
    }

    fn int(&mut self) -> Result<i32> {
        let raw = self.varint(MAX_VARINT32_LEN)?;
        let raw = u32::try_from(raw)
            .map_err(|_| ShardError::CorruptRecord("int varint overflows 32 bits".to_string()))?;
        Ok(((raw >> 1) as i32) ^ -((raw & 1) as i32))
    }

    fn long(&mut self) -> Result<i64> {
        let raw = self.varint(MAX_VARINT64_LEN)?;
        Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
    }

    /// Length marker for a variable-size item; must fit in what is left
    fn length(&mut self) -> Result<usize> {
        let len = self.varint(MAX_VARINT64_LEN)?;
        let remaining = (self.bytes.len() - self.pos) as u64;
        if len > remaining {
            return Err(ShardError::CorruptRecord(format!(
                "length marker {} exceeds {} remaining bytes",
                len, remaining
            )));
        }
        Ok(len as usize)
    }

    /// Item count of an array or map whose items take at least `min_item_len` bytes
    fn count(&mut self, min_item_len: usize) -> Result<usize> {
        let count = self.varint(MAX_VARINT64_LEN)?;
        let remaining = (self.bytes.len() - self.pos) as u64;
        let fits = if min_item_len == 0 {
            self.zero_width_items = self.zero_width_items.saturating_add(count);
            self.zero_width_items <= MAX_ZERO_WIDTH_ITEMS
        } else {
            count.saturating_mul(min_item_len as u64) <= remaining
        };
        if !fits {
            return Err(ShardError::CorruptRecord(format!(
                "count {} cannot fit in {} remaining bytes",
                count, remaining
            )));
        }
        usize::try_from(count)
            .map_err(|_| ShardError::CorruptRecord(format!("count {} too large", count)))
    }

    fn bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.length()?;
        self.take(len)
    }

    fn string(&mut self) -> Result<String> {
        let raw = self.bytes()?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| ShardError::CorruptRecord(format!("invalid UTF-8 string: {}", e)))
    }

    fn value(&mut self, schema: &Schema) -> Result<Value> {
        let value = match schema {
            Schema::Null => Value::Null,
            Schema::Boolean => match self.byte()? {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                b => {
                    return Err(ShardError::CorruptRecord(format!(
                        "invalid boolean byte 0x{:02x}",
                        b
                    )))
                }
            },
            Schema::Int => Value::Int(self.int()?),
            Schema::Long => Value::Long(self.long()?),
            Schema::Float => {
                let raw = self.take(4)?;
                Value::Float(f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
            }
            Schema::Double => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(self.take(8)?);
                Value::Double(f64::from_le_bytes(raw))
            }
            Schema::Bytes => Value::Bytes(self.bytes()?.to_vec()),
            Schema::String => Value::String(self.string()?),
            Schema::Array(items) => {
                let count = self.count(min_encoded_len(items))?;
                let mut values = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    values.push(self.value(items)?);
                }
                Value::Array(values)
            }
            Schema::Map(values) => {
                // every entry carries at least its key length byte
                let count = self.count(1 + min_encoded_len(values))?;
                let mut entries = BTreeMap::new();
                let mut last: Option<String> = None;
                for _ in 0..count {
                    let key = self.string()?;
                    if last.as_ref().is_some_and(|prev| prev >= &key) {
                        return Err(ShardError::CorruptRecord(format!(
                            "map key {:?} out of order",
                            key
                        )));
                    }
                    let item = self.value(values)?;
                    last = Some(key.clone());
                    entries.insert(key, item);
                }
                Value::Map(entries)
            }
            Schema::Optional(inner) => match self.byte()? {
                0 => Value::Null,
                1 => self.value(inner)?,
                tag => {
                    return Err(ShardError::CorruptRecord(format!(
                        "invalid optional tag {}",
                        tag
                    )))
                }
            },
            Schema::Record { fields, .. } => {
                let mut values = Vec::with_capacity(fields.len());
                for field in fields {
                    values.push((field.name.clone(), self.value(&field.schema)?));
                }
                Value::Record(values)
            }
        };
        Ok(value)
    }
}
