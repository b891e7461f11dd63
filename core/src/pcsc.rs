//! PC/SC transport for the card scan.
//! Can be enabled by turning `pcsc` feature on.
//!
//! Windows and macOS ship PC/SC themselves; Linux needs the pcsc-lite shared library.
//! Refer the documentation of pcsc-rust for details:
//! <https://github.com/bluetech/pcsc-rust>
//!
//! ## Usage
//! ```rust,no_run
//! use transit_card::ap::default_factories;
//! use transit_card::feedback::NoFeedback;
//! use transit_card::iso7816::{Protocol, ScanOptions};
//! use transit_card::pcsc::Context;
//! use transit_card::Card;
//!
//! let ctx = Context::try_new().unwrap();
//! let device = ctx.open(None).unwrap();
//! let pcsc_card = device.connect(&ctx).unwrap();
//!
//! let protocol = Protocol::new(Box::new(pcsc_card));
//! let card = Card::dump(&protocol, &default_factories(), &NoFeedback, &ScanOptions::default());
//! ```

use std::ffi::{CStr, CString};
use std::thread::sleep;
use std::time::Duration;

use pcsc::{Protocols, Scope, ShareMode, MAX_BUFFER_SIZE};

use crate::nfc::{self, Transceiver};
use crate::trace::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Error occurred while communicating with PC/SC: {0}")]
    PcscError(#[from] pcsc::Error),

    #[error("Reader not found on PC/SC service")]
    ReaderNotFound,
}

pub type Result<T> = std::result::Result<T, Error>;

/// PC/SC context.
pub struct Context {
    ctx: pcsc::Context,
}

impl Context {
    /// Creates a PC/SC context in user scope.
    pub fn try_new() -> Result<Self> {
        Ok(Self {
            ctx: pcsc::Context::establish(Scope::User)?,
        })
    }

    /// Names of the readers known to the PC/SC service.
    pub fn readers(&self) -> Result<Vec<String>> {
        let mut buf = [0u8; 2048];

        Ok(self
            .ctx
            .list_readers(&mut buf)?
            .map(|reader| reader.to_string_lossy().into_owned())
            .collect())
    }

    /// Opens the reader with the name, or the first reader if no name is given.
    pub fn open(&self, name: Option<&str>) -> Result<Device> {
        let mut buf = [0u8; 2048];
        let mut readers = self.ctx.list_readers(&mut buf)?;

        let reader = match name {
            Some(name) => readers.find(|reader| reader.to_string_lossy() == name),
            None => readers.next(),
        };

        reader.map(Device::new).ok_or(Error::ReaderNotFound)
    }
}

/// PC/SC device handle.
pub struct Device {
    reader: CString,
}

impl Device {
    fn new(reader: &CStr) -> Self {
        debug!("Using device: {}", reader.to_string_lossy());

        Self {
            reader: reader.to_owned(),
        }
    }

    /// Connects to the card placed on the device after waiting for it.
    pub fn connect(&self, ctx: &Context) -> Result<PcscCard> {
        debug!("Waiting for a card");

        // Polls every second.
        loop {
            match ctx
                .ctx
                .connect(&self.reader, ShareMode::Shared, Protocols::ANY)
            {
                Ok(card) => {
                    debug!("Connected to the card");

                    return Ok(PcscCard { card });
                }
                Err(pcsc::Error::NoSmartcard) => {
                    info!("Still waiting for a card...");
                    sleep(Duration::from_secs(1));
                }
                Err(e) => return Err(Error::PcscError(e)),
            }
        }
    }
}

/// A card to be communicated through PC/SC.
pub struct PcscCard {
    card: pcsc::Card,
}

impl PcscCard {
    /// Transmits an APDU command to the card, then receives a response from them.
    pub fn transmit(&self, tx: &[u8]) -> Result<Vec<u8>> {
        debug!(">>> {}", hex::encode(tx));

        let mut rx = [0u8; MAX_BUFFER_SIZE];
        let rx = self.card.transmit(tx, &mut rx)?;

        debug!("<<< {}", hex::encode(rx));

        Ok(Vec::from(rx))
    }
}

impl Transceiver for PcscCard {
    fn transceive(&self, command: &[u8]) -> std::result::Result<Vec<u8>, nfc::Error> {
        self.transmit(command).map_err(|e| match e {
            Error::PcscError(pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard) => {
                nfc::Error::CardLost
            }
            e => nfc::Error::Transport(e.to_string()),
        })
    }
}
