//! Declarative bit-field schemas for EN1545 and related ticketing formats.
//!
//! A schema is a tree of [Field]s. Parsing walks the tree over a buffer, storing every value
//! that could be read into an [En1545Parsed] map. Nothing in here fails: a field that cannot be
//! read is left out, and parsing carries on with the next one.

mod bits;
mod field;
mod parsed;
mod time;

pub use bits::{get_bits_from_buffer, get_bits_from_buffer_le_bits, BitReader};
pub use field::Field;
pub use parsed::{En1545Parsed, En1545Value};
pub use time::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Bits {start}..{end} are out of the buffer of {len} bits")]
    OutOfBounds { start: usize, end: usize, len: usize },

    #[error("Cannot read {0} bits into an integer")]
    TooWide(usize),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Suffixes appended to the base name by the date and time constructors of [Field].
pub mod suffix {
    pub const DATE: &str = "Date";
    pub const TIME: &str = "Time";
    pub const TIME_LOCAL: &str = "TimeLocal";
    pub const TIME_PACKED16: &str = "TimePacked16";
    pub const TIME_PACKED11_LOCAL: &str = "TimePacked11Local";
    pub const DATE_TIME: &str = "DateTime";
    pub const DATE_TIME_LOCAL: &str = "DateTimeLocal";
    pub const DATE_PACKED: &str = "DatePacked";
    pub const DATE_BCD: &str = "DateBCD";
}
