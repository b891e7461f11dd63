//! Communicating with the card through a transceiver delegate

#[cfg(test)]
pub(crate) mod mock;

pub use apdu::{Command, Response};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("The card was removed from the field")]
    CardLost,

    #[error("Error occurred while communicating with the card: {0}")]
    Transport(String),
}

/// A delegate to exchange raw frames with the card.
///
/// The transport is half-duplex: implementations may assume that at most one command is
/// outstanding at any time.
pub trait Transceiver {
    /// Transmits the command to the card, then receives the response from them.
    fn transceive(&self, command: &[u8]) -> Result<Vec<u8>, Error>;
}

impl<T> Transceiver for Box<T>
where
    T: Transceiver + ?Sized,
{
    fn transceive(&self, command: &[u8]) -> Result<Vec<u8>, Error> {
        (**self).transceive(command)
    }
}
