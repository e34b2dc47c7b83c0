//! Fixed-width record encoding and decoding.
//!
//! The codec is entity-agnostic: it works on an [`EntityLayout`] and a flat
//! value vector, so the storage layer never needs the concrete entity type.
//! Typed entry points (`encode_entity` / `decode_entity`) bridge to the
//! [`Entity`] trait.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::{Result, StoreError};
use crate::records::TOMBSTONE_LIVE;
use crate::schema::{Entity, EntityLayout};
use crate::types::{FieldType, FieldValue, Values};

/// Ticks between 0001-01-01T00:00:00 UTC and the unix epoch.
const TICKS_AT_UNIX_EPOCH: i64 = 621_355_968_000_000_000;

/// 100 ns intervals per second.
const TICKS_PER_SECOND: i64 = 10_000_000;

/// Highest scale a decimal flags word may carry.
const MAX_DECIMAL_SCALE: u32 = 28;

/// Serializer/deserializer for one entity layout.
#[derive(Debug, Clone)]
pub struct RecordCodec {
    layout: Arc<EntityLayout>,
}

impl RecordCodec {
    pub fn new(layout: Arc<EntityLayout>) -> Self {
        Self { layout }
    }

    pub fn record_width(&self) -> usize {
        self.layout.record_width()
    }

    /// Encodes an id and its field values into exactly `record_width` bytes.
    pub fn encode(&self, id: i32, values: &[FieldValue]) -> Result<Vec<u8>> {
        if values.len() != self.layout.field_count() {
            return Err(StoreError::codec(format!(
                "expected {} field values, got {}",
                self.layout.field_count(),
                values.len()
            )));
        }

        let mut buf = vec![0u8; self.layout.record_width()];
        buf[0] = TOMBSTONE_LIVE;
        buf[1..5].copy_from_slice(&id.to_le_bytes());

        for (idx, value) in values.iter().enumerate() {
            let field = &self.layout.fields()[idx];
            let mut offset = self.layout.offset(idx);

            if field.is_nullable() {
                if matches!(value, FieldValue::Null) {
                    buf[offset] = 1;
                    continue;
                }
                buf[offset] = 0;
                offset += 1;
            } else if matches!(value, FieldValue::Null) {
                return Err(StoreError::codec(format!(
                    "null value for non-nullable field '{}'",
                    field.name()
                )));
            }

            match (field.kind(), value) {
                (FieldType::Int4, FieldValue::Int4(v)) => {
                    buf[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
                }
                (FieldType::Bool, FieldValue::Bool(v)) => {
                    buf[offset] = u8::from(*v);
                }
                (FieldType::Decimal, FieldValue::Decimal(d)) => {
                    encode_decimal(d, &mut buf[offset..offset + 16]);
                }
                (FieldType::DateTime, FieldValue::DateTime(ts)) => {
                    let ticks = datetime_to_ticks(ts);
                    buf[offset..offset + 8].copy_from_slice(&ticks.to_le_bytes());
                }
                (FieldType::Enum, FieldValue::Enum(v)) => {
                    buf[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
                }
                (FieldType::Text, FieldValue::Text(s)) => {
                    let max = field.max_byte_len().ok_or_else(|| {
                        StoreError::config(format!(
                            "text field '{}' has no maximum byte length",
                            field.name()
                        ))
                    })?;
                    let truncated = truncate_to_char_boundary(s, max);
                    buf[offset..offset + truncated.len()].copy_from_slice(truncated.as_bytes());
                }
                (kind, value) => {
                    return Err(StoreError::codec(format!(
                        "field '{}' is declared {:?} but the entity produced a {} value",
                        field.name(),
                        kind,
                        value.kind_name()
                    )));
                }
            }
        }

        Ok(buf)
    }

    /// Encodes one entity.
    pub fn encode_entity<E: Entity>(&self, entity: &E) -> Result<Vec<u8>> {
        let mut values = Values::new();
        entity.write_values(&mut values);
        self.encode(entity.id(), values.as_slice())
    }

    /// Decodes a record slot into its id and field values.
    ///
    /// The buffer must hold at least `record_width` bytes.
    pub fn decode(&self, buf: &[u8]) -> Result<(i32, Values)> {
        if buf.len() < self.layout.record_width() {
            return Err(StoreError::codec(format!(
                "record buffer of {} bytes is shorter than the record width {}",
                buf.len(),
                self.layout.record_width()
            )));
        }

        let id = read_i32(buf, 1);
        let mut items = Vec::with_capacity(self.layout.field_count());

        for idx in 0..self.layout.field_count() {
            let field = &self.layout.fields()[idx];
            let mut offset = self.layout.offset(idx);

            if field.is_nullable() {
                if buf[offset] != 0 {
                    items.push(FieldValue::Null);
                    continue;
                }
                offset += 1;
            }

            let value = match field.kind() {
                FieldType::Int4 => FieldValue::Int4(read_i32(buf, offset)),
                FieldType::Bool => FieldValue::Bool(buf[offset] != 0),
                FieldType::Decimal => {
                    FieldValue::Decimal(decode_decimal(&buf[offset..offset + 16])?)
                }
                FieldType::DateTime => {
                    FieldValue::DateTime(ticks_to_datetime(read_i64(buf, offset))?)
                }
                FieldType::Enum => FieldValue::Enum(read_i32(buf, offset)),
                FieldType::Text => {
                    let max = field.max_byte_len().ok_or_else(|| {
                        StoreError::config(format!(
                            "text field '{}' has no maximum byte length",
                            field.name()
                        ))
                    })?;
                    let raw = &buf[offset..offset + max];
                    let end = raw.iter().position(|&b| b == 0).unwrap_or(max);
                    let text = std::str::from_utf8(&raw[..end]).map_err(|e| {
                        StoreError::codec(format!(
                            "field '{}' holds invalid UTF-8: {}",
                            field.name(),
                            e
                        ))
                    })?;
                    FieldValue::Text(text.to_string())
                }
            };

            items.push(value);
        }

        Ok((id, Values::from_vec(items)))
    }

    /// Decodes a record slot into an entity.
    pub fn decode_entity<E: Entity>(&self, buf: &[u8]) -> Result<E> {
        let (id, mut values) = self.decode(buf)?;
        E::read_values(id, &mut values)
    }
}

fn read_i32(buf: &[u8], offset: usize) -> i32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    i32::from_le_bytes(bytes)
}

fn read_i64(buf: &[u8], offset: usize) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    i64::from_le_bytes(bytes)
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a
/// character.
fn truncate_to_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Writes a decimal as four little-endian 32-bit words: the 96-bit mantissa
/// (lo, mid, hi) followed by the flags word (scale in bits 16..24, sign in
/// bit 31).
fn encode_decimal(d: &Decimal, out: &mut [u8]) {
    let magnitude = d.mantissa().unsigned_abs();
    let lo = (magnitude & 0xFFFF_FFFF) as u32;
    let mid = ((magnitude >> 32) & 0xFFFF_FFFF) as u32;
    let hi = ((magnitude >> 64) & 0xFFFF_FFFF) as u32;

    let mut flags = (d.scale() & 0xFF) << 16;
    if d.is_sign_negative() {
        flags |= 1 << 31;
    }

    out[0..4].copy_from_slice(&lo.to_le_bytes());
    out[4..8].copy_from_slice(&mid.to_le_bytes());
    out[8..12].copy_from_slice(&hi.to_le_bytes());
    out[12..16].copy_from_slice(&flags.to_le_bytes());
}

fn decode_decimal(buf: &[u8]) -> Result<Decimal> {
    let lo = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let mid = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let hi = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
    let flags = u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]);

    let scale = (flags >> 16) & 0xFF;
    if scale > MAX_DECIMAL_SCALE {
        return Err(StoreError::codec(format!(
            "decimal scale {} out of range",
            scale
        )));
    }
    let negative = flags & (1 << 31) != 0;

    Ok(Decimal::from_parts(lo, mid, hi, negative, scale))
}

/// Converts a UTC timestamp to 100 ns ticks since 0001-01-01T00:00:00 UTC.
fn datetime_to_ticks(ts: &DateTime<Utc>) -> i64 {
    TICKS_AT_UNIX_EPOCH
        + ts.timestamp() * TICKS_PER_SECOND
        + i64::from(ts.timestamp_subsec_nanos()) / 100
}

fn ticks_to_datetime(ticks: i64) -> Result<DateTime<Utc>> {
    let relative = ticks - TICKS_AT_UNIX_EPOCH;
    let secs = relative.div_euclid(TICKS_PER_SECOND);
    let nanos = relative.rem_euclid(TICKS_PER_SECOND) * 100;

    DateTime::from_timestamp(secs, nanos as u32)
        .ok_or_else(|| StoreError::codec(format!("timestamp ticks {} out of range", ticks)))
}
