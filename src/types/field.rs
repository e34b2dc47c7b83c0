//! Field kinds and field definitions.
//!
//! A `FieldDef` describes one persisted data field of an entity: its kind,
//! whether it is nullable, and (for text) the declared maximum byte length.
//! The byte width of every field is fixed and computed here.

use crate::error::{Result, StoreError};

/// Size of the nullability flag prepended to nullable fields.
pub(crate) const NULL_FLAG_SIZE: usize = 1;

/// Supported field kinds.
///
/// Uses `#[repr(u8)]` for a single-byte discriminant.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Int4 = 0,
    Bool = 1,
    Decimal = 2,
    DateTime = 3,
    Enum = 4,
    Text = 5,
}

impl FieldType {
    /// Returns the fixed byte size for this kind, or None for text, whose
    /// size is declared per field.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            FieldType::Int4 => Some(4),
            FieldType::Bool => Some(1),
            FieldType::Decimal => Some(16),
            FieldType::DateTime => Some(8),
            FieldType::Enum => Some(4),
            FieldType::Text => None,
        }
    }
}

/// Definition of one persisted field.
#[derive(Debug, Clone)]
pub struct FieldDef {
    name: String,
    kind: FieldType,
    nullable: bool,
    max_byte_len: Option<usize>,
}

impl FieldDef {
    fn new(name: impl Into<String>, kind: FieldType, max_byte_len: Option<usize>) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            max_byte_len,
        }
    }

    /// A 32-bit signed integer field.
    pub fn int4(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Int4, None)
    }

    /// A boolean field.
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Bool, None)
    }

    /// A 128-bit decimal field.
    pub fn decimal(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Decimal, None)
    }

    /// A UTC timestamp field.
    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::DateTime, None)
    }

    /// An enumeration field persisted as its underlying 32-bit integer.
    pub fn enumeration(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Enum, None)
    }

    /// A UTF-8 text field with a declared maximum byte length.
    ///
    /// Values longer than `max_byte_len` bytes are silently truncated at the
    /// greatest character boundary that fits.
    pub fn text(name: impl Into<String>, max_byte_len: usize) -> Self {
        Self::new(name, FieldType::Text, Some(max_byte_len))
    }

    /// Marks the field as nullable, prepending a one-byte null flag to its
    /// stored representation.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldType {
        self.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn max_byte_len(&self) -> Option<usize> {
        self.max_byte_len
    }

    /// Total stored width of this field, including the null flag byte when
    /// the field is nullable.
    ///
    /// Fails with a configuration error for text fields without a positive
    /// declared maximum byte length.
    pub fn width(&self) -> Result<usize> {
        let base = match self.kind.fixed_size() {
            Some(size) => size,
            None => match self.max_byte_len {
                Some(len) if len > 0 => len,
                _ => {
                    return Err(StoreError::config(format!(
                        "text field '{}' requires a positive maximum byte length",
                        self.name
                    )))
                }
            },
        };

        Ok(if self.nullable {
            base + NULL_FLAG_SIZE
        } else {
            base
        })
    }
}
