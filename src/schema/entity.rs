//! The `Entity` trait.

use crate::error::Result;
use crate::types::{FieldDef, Values};

/// A record type that can be stored in a table.
///
/// Every entity carries a 32-bit primary key. An id of `0` means "assign on
/// insert"; ids are 1-based and assigned monotonically per table. Mutating
/// the id of a stored entity is unsupported.
///
/// The remaining methods describe the persisted data fields. `fields`
/// declares them in order (the id is handled by the engine and must not
/// appear); `write_values` pushes one value per declared field onto the
/// cursor, and `read_values` takes them back in the same order.
///
/// ```ignore
/// struct User {
///     id: i32,
///     name: String,
///     age: i32,
/// }
///
/// impl Entity for User {
///     fn fields() -> Vec<FieldDef> {
///         vec![FieldDef::text("name", 50), FieldDef::int4("age")]
///     }
///
///     fn id(&self) -> i32 {
///         self.id
///     }
///
///     fn set_id(&mut self, id: i32) {
///         self.id = id;
///     }
///
///     fn write_values(&self, out: &mut Values) {
///         out.push_text(self.name.clone()).push_int4(self.age);
///     }
///
///     fn read_values(id: i32, values: &mut Values) -> Result<Self> {
///         Ok(Self {
///             id,
///             name: values.take_text()?,
///             age: values.take_int4()?,
///         })
///     }
/// }
/// ```
pub trait Entity: Sized + Send + Sync + 'static {
    /// Persisted data fields in declared order, excluding the id.
    fn fields() -> Vec<FieldDef>;

    /// The primary key. `0` requests assignment on insert.
    fn id(&self) -> i32;

    /// Called by the engine when an id is assigned on insert.
    fn set_id(&mut self, id: i32);

    /// Pushes the field values in declared order.
    fn write_values(&self, out: &mut Values);

    /// Rebuilds the entity from the id and the field values in declared
    /// order.
    fn read_values(id: i32, values: &mut Values) -> Result<Self>;
}
