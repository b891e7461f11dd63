use crate::nfc;

/// Outcome of an APDU exchange that did not end with `90 xx`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Command not allowed: no current EF")]
    NoCurrentEf,

    #[error("Command not allowed: security status not satisfied")]
    SecurityStatusNotSatisfied,

    #[error("File not found")]
    FileNotFound,

    #[error("Record not found")]
    EndOfFile,

    #[error("Instruction code not supported or invalid")]
    InstructionNotSupported,

    #[error("Class not supported")]
    ClassNotSupported,

    #[error("The card returned an unknown status ({sw1:02X} {sw2:02X})")]
    Status { sw1: u8, sw2: u8 },

    #[error("Command data of {0} octets does not fit a short APDU")]
    CommandTooLong(usize),

    #[error("The card returned a malformed response: {}", hex::encode(.0))]
    MalformedResponse(Vec<u8>),

    #[error(transparent)]
    Transceive(#[from] nfc::Error),
}

impl Error {
    /// Maps a status word other than success to its error.
    pub fn from_status(sw1: u8, sw2: u8) -> Self {
        match (sw1, sw2) {
            (0x69, 0x86) => Self::NoCurrentEf,
            (0x69, 0x82) => Self::SecurityStatusNotSatisfied,
            (0x6A, 0x82) => Self::FileNotFound,
            (0x6A, 0x83) => Self::EndOfFile,
            (0x6D, _) => Self::InstructionNotSupported,
            (0x6E, _) => Self::ClassNotSupported,
            _ => Self::Status { sw1, sw2 },
        }
    }

    /// Whether the error came from the transport rather than from the card.
    /// Transport errors end the whole scan; everything else is recoverable where it was raised.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transceive(_))
    }

    pub fn is_card_lost(&self) -> bool {
        matches!(self, Self::Transceive(nfc::Error::CardLost))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
