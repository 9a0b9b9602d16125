pub mod error;
pub mod value;

pub use error::{ErrorKind, WorksheetError};
pub use value::{EnumDef, Number, RoundMode, SliceValue, Type, Value, WorksheetRef};

/// Reserved field index for the implicit `id` field (§3, §6).
pub const ID_FIELD_INDEX: i64 = -2;
/// Reserved field index for the implicit `version` field (§3, §6).
pub const VERSION_FIELD_INDEX: i64 = -1;
/// Reserved field name for the implicit `id` field.
pub const ID_FIELD_NAME: &str = "id";
/// Reserved field name for the implicit `version` field.
pub const VERSION_FIELD_NAME: &str = "version";
