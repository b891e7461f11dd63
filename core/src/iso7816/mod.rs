//! ISO7816-4 applications, files and the exchanges to read them

mod application;
mod capsule;
mod card;
mod error;
mod file;
pub mod protocol;
mod selector;

pub use application::{Application, ApplicationKind};
pub use capsule::{ApplicationCapsule, MutableCapsule, MAX_SFI};
pub use card::{Card, ScanOptions};
pub use error::{Error, Result};
pub use file::File;
pub use protocol::Protocol;
pub use selector::{ParseError, Selector, SelectorElement};
