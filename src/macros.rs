//! Internal macros.

/// Exposes zerocopy little-endian header fields as native-integer accessors.
///
/// The on-disk header structs keep multi-byte fields behind
/// `zerocopy::little_endian` wrappers so their in-memory representation is
/// the wire representation. Call sites list each field with the accessor
/// pair to generate, the wrapper the struct stores, and the native type the
/// accessors use:
///
/// ```ignore
/// impl TableMetaRecord {
///     le_accessors! {
///         record_count / set_record_count: I32 as i32,
///         data_start / set_data_start: I64 as i64,
///     }
/// }
/// ```
#[macro_export]
macro_rules! le_accessors {
    ($($getter:ident / $setter:ident : $wrapper:ident as $native:ty),* $(,)?) => {
        $(
            #[inline]
            pub fn $getter(&self) -> $native {
                self.$getter.get()
            }

            #[inline]
            pub fn $setter(&mut self, val: $native) {
                self.$getter = ::zerocopy::little_endian::$wrapper::new(val);
            }
        )*
    };
}
