//! Pure conversions between raw register words and structured fields.
//!
//! Nothing in here performs I/O or fails. Quantities that do not fit the hardware granularity
//! are truncated toward zero.
pub mod current;
pub mod header;
pub mod pdo;
pub mod rdo;

pub use current::{CURRENT_TABLE, code_from_current, current_from_code};
pub use header::MessageHeader;
pub use pdo::{FastRoleSwap, Pdo, RawPdo, decode_pdo, encode_pdo};
pub use rdo::{Rdo, decode_rdo};

/// Size of a data object in bytes.
pub const OBJECT_SIZE: usize = 4;

/// Voltage granularity of PDO and NVM voltage fields.
pub(crate) const MILLIVOLTS_PER_STEP: u16 = 50;

/// Current granularity of PDO, RDO and NVM flex current fields.
pub(crate) const MILLIAMPERES_PER_STEP: u16 = 10;

/// Mask of a 10-bit field.
pub(crate) const TEN_BIT_MASK: u16 = 0x3FF;
