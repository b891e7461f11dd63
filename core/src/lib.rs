//! A crate to read ISO7816 transit cards through an APDU delegate, and to decode what they hold.
//!
//! The card is scanned by [Card::dump], selecting every known application and capturing its
//! files. The captured bytes can then be decoded with the BER-TLV decoder in [tlv] and the
//! EN1545 bit-field engine in [en1545].

#[cfg(feature = "pcsc")]
pub mod pcsc;

pub mod ap;
pub mod en1545;
pub mod feedback;
pub mod info;
pub mod iso7816;
pub mod nfc;
pub mod tlv;

mod trace;

pub use iso7816::Card;
