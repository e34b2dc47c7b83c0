//! # Field Type System
//!
//! This module defines the type system for flatdb records:
//! - `FieldType`: enumeration of the supported field kinds
//! - `FieldDef`: field definition with name, kind, nullability and, for text,
//!   the declared maximum byte length
//! - `FieldValue` / `Values`: the typed value vector entities convert to and
//!   from
//!
//! ## Fixed-Width Field Sizes
//!
//! | Kind | Size (bytes, non-null) | Representation |
//! |------|------------------------|----------------|
//! | int4 | 4 | little-endian two's complement |
//! | bool | 1 | 0x00 = false, non-zero = true |
//! | decimal | 16 | four little-endian 32-bit words: lo, mid, hi, flags |
//! | datetime | 8 | little-endian 100 ns ticks since 0001-01-01 UTC |
//! | enum | 4 | underlying integer, little-endian |
//! | text | N (declared) | UTF-8, right-zero-padded |
//!
//! Nullable variants prepend a single flag byte (1 = null, 0 = present) to
//! the value's width.

mod field;
mod value;

pub use field::{FieldDef, FieldType};
pub use value::{FieldValue, Values};
