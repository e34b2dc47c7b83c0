//! Typed field values and the `Values` cursor.
//!
//! Entities convert to and from a flat vector of `FieldValue`s in declared
//! field order. `Values` wraps that vector with typed push/take methods so
//! `Entity` implementations stay mechanical: the write side pushes one value
//! per field, the read side takes them back in the same order.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::{Result, StoreError};

/// One field value.
///
/// `Null` stands in for the absent value of a nullable field of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int4(i32),
    Bool(bool),
    Decimal(Decimal),
    DateTime(DateTime<Utc>),
    Enum(i32),
    Text(String),
    Null,
}

impl FieldValue {
    /// Short kind label used in codec diagnostics.
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Int4(_) => "int4",
            FieldValue::Bool(_) => "bool",
            FieldValue::Decimal(_) => "decimal",
            FieldValue::DateTime(_) => "datetime",
            FieldValue::Enum(_) => "enum",
            FieldValue::Text(_) => "text",
            FieldValue::Null => "null",
        }
    }
}

/// Ordered field-value cursor.
///
/// Writing pushes values in declared field order; reading takes them back in
/// the same order. A type mismatch on the read side is a codec error, which
/// surfaces a disagreement between an entity's field descriptors and its
/// value conversion.
#[derive(Debug, Default)]
pub struct Values {
    items: Vec<FieldValue>,
    cursor: usize,
}

macro_rules! value_accessors {
    ($($push:ident, $push_opt:ident, $take:ident, $take_opt:ident, $variant:ident : $ty:ty),* $(,)?) => {
        $(
            pub fn $push(&mut self, value: $ty) -> &mut Self {
                self.items.push(FieldValue::$variant(value));
                self
            }

            pub fn $push_opt(&mut self, value: Option<$ty>) -> &mut Self {
                match value {
                    Some(v) => self.items.push(FieldValue::$variant(v)),
                    None => self.items.push(FieldValue::Null),
                }
                self
            }

            pub fn $take(&mut self) -> Result<$ty> {
                match self.next()? {
                    FieldValue::$variant(v) => Ok(v),
                    other => Err(Self::mismatch(stringify!($variant), &other)),
                }
            }

            pub fn $take_opt(&mut self) -> Result<Option<$ty>> {
                match self.next()? {
                    FieldValue::$variant(v) => Ok(Some(v)),
                    FieldValue::Null => Ok(None),
                    other => Err(Self::mismatch(stringify!($variant), &other)),
                }
            }
        )*
    };
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_vec(items: Vec<FieldValue>) -> Self {
        Self { items, cursor: 0 }
    }

    pub(crate) fn as_slice(&self) -> &[FieldValue] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Pushes a raw value. The typed methods below are usually clearer.
    pub fn push(&mut self, value: FieldValue) -> &mut Self {
        self.items.push(value);
        self
    }

    fn next(&mut self) -> Result<FieldValue> {
        let value = self
            .items
            .get(self.cursor)
            .cloned()
            .ok_or_else(|| StoreError::codec("value cursor past the end of the record"))?;
        self.cursor += 1;
        Ok(value)
    }

    fn mismatch(expected: &str, got: &FieldValue) -> StoreError {
        StoreError::codec(format!(
            "expected a {} value, got {}",
            expected.to_ascii_lowercase(),
            got.kind_name()
        ))
    }

    value_accessors! {
        push_int4, push_opt_int4, take_int4, take_opt_int4, Int4: i32,
        push_bool, push_opt_bool, take_bool, take_opt_bool, Bool: bool,
        push_decimal, push_opt_decimal, take_decimal, take_opt_decimal, Decimal: Decimal,
        push_datetime, push_opt_datetime, take_datetime, take_opt_datetime, DateTime: DateTime<Utc>,
        push_enum, push_opt_enum, take_enum, take_opt_enum, Enum: i32,
        push_text, push_opt_text, take_text, take_opt_text, Text: String,
    }
}
