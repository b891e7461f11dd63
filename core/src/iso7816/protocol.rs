use crate::iso7816::{Error, Result};
use crate::nfc::{Command, Response, Transceiver};
use crate::trace::debug;

pub const CLASS_ISO7816: u8 = 0x00;
pub const CLASS_80: u8 = 0x80;
pub const CLASS_90: u8 = 0x90;

pub const INSTRUCTION_SELECT: u8 = 0xA4;
pub const INSTRUCTION_READ_BINARY: u8 = 0xB0;
pub const INSTRUCTION_READ_RECORD: u8 = 0xB2;

const SELECT_BY_NAME: u8 = 0x04;
const SELECT_NEXT_OCCURRENCE: u8 = 0x02;
const READ_BINARY_SFI: u8 = 0x80;
const READ_RECORD_BY_NUMBER: u8 = 0x04;

const STATUS_OK: u8 = 0x90;
const ERROR_WRONG_LENGTH: u8 = 0x6C;

/// An adapter speaking ISO7816-4 APDUs to the card through the delegate.
///
/// Only open (unauthenticated) reads are supported. Every call transmits at most two commands and
/// waits for their responses before returning, so the delegate never sees overlapping exchanges.
pub struct Protocol {
    delegate: Box<dyn Transceiver>,
}

impl Protocol {
    /// Initiates an adapter with the delegate.
    pub fn new(delegate: Box<dyn Transceiver>) -> Self {
        Self { delegate }
    }

    /// Sends a command to the card and checks the status word of the response.
    ///
    /// `le` of zero asks for up to 256 octets. When the card answers `6C xx` with a length other
    /// than `le`, the command is repeated once with `le = xx`.
    pub fn send_request(
        &self,
        cla: u8,
        ins: u8,
        p1: u8,
        p2: u8,
        le: u8,
        parameters: &[u8],
    ) -> Result<Vec<u8>> {
        if parameters.len() > u8::MAX as usize {
            return Err(Error::CommandTooLong(parameters.len()));
        }

        let (mut sw1, mut sw2, mut payload) =
            self.transceive(command(cla, ins, p1, p2, le, parameters))?;
        debug!("First attempt: {:02X}, {:02X}", sw1, sw2);

        if sw1 == ERROR_WRONG_LENGTH && sw2 != le {
            debug!("Wrong length, trying with corrected length");
            (sw1, sw2, payload) = self.transceive(command(cla, ins, p1, p2, sw2, parameters))?;
        }

        match (sw1, sw2) {
            (STATUS_OK, _) => Ok(payload),
            (sw1, sw2) => Err(Error::from_status(sw1, sw2)),
        }
    }

    /// Selects an application or DF with their name.
    pub fn select_by_name(&self, name: &[u8], next_occurrence: bool) -> Result<Vec<u8>> {
        debug!("Select by name {}", hex::encode(name));

        let p2 = match next_occurrence {
            true => SELECT_NEXT_OCCURRENCE,
            _ => 0x00,
        };

        self.send_request(CLASS_ISO7816, INSTRUCTION_SELECT, SELECT_BY_NAME, p2, 0, name)
    }

    /// Selects an application with their name, treating any refusal as absence.
    /// Only a lost card is reported as an error.
    pub fn select_by_name_or_none(&self, name: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.select_by_name(name, false) {
            Ok(fci) => Ok(Some(fci)),
            Err(e) if e.is_card_lost() => Err(e),
            Err(e) => {
                debug!("Select by name failed: {}", e);
                Ok(None)
            }
        }
    }

    /// Selects a file with their identifier.
    pub fn select_by_id(&self, file_id: u16) -> Result<Vec<u8>> {
        debug!("Select file {:04X}", file_id);

        self.send_request(
            CLASS_ISO7816,
            INSTRUCTION_SELECT,
            0x00,
            0x00,
            0,
            &file_id.to_be_bytes(),
        )
    }

    /// Goes back to the master file.
    pub fn unselect_file(&self) -> Result<()> {
        debug!("Unselect file");

        self.send_request(CLASS_ISO7816, INSTRUCTION_SELECT, 0x00, 0x00, 0, &[])
            .map(|_| ())
    }

    /// Reads binary from the selected file.
    ///
    /// Status errors other than end-of-file are folded into `None`.
    pub fn read_binary(&self) -> Result<Option<Vec<u8>>> {
        debug!("Read binary");

        tolerate(
            self.send_request(CLASS_ISO7816, INSTRUCTION_READ_BINARY, 0x00, 0x00, 0, &[]),
            |e| matches!(e, Error::EndOfFile),
        )
    }

    /// Reads binary from the file with the short file identifier.
    ///
    /// Missing and locked files are reported as errors so that callers can stop probing them.
    pub fn read_binary_sfi(&self, sfi: u8) -> Result<Option<Vec<u8>>> {
        debug!("Read binary, SFI {:02X}", sfi);

        tolerate(
            self.send_request(
                CLASS_ISO7816,
                INSTRUCTION_READ_BINARY,
                READ_BINARY_SFI | sfi,
                0x00,
                0,
                &[],
            ),
            |e| {
                matches!(
                    e,
                    Error::EndOfFile | Error::FileNotFound | Error::SecurityStatusNotSatisfied
                )
            },
        )
    }

    /// Reads a record from the selected file.
    ///
    /// Returns `Err(Error::EndOfFile)` past the last record, `None` on any other status error.
    pub fn read_record(&self, record_number: u8, length: u8) -> Result<Option<Vec<u8>>> {
        debug!("Read record {}", record_number);

        tolerate(
            self.send_request(
                CLASS_ISO7816,
                INSTRUCTION_READ_RECORD,
                record_number,
                READ_RECORD_BY_NUMBER,
                length,
                &[],
            ),
            |e| matches!(e, Error::EndOfFile),
        )
    }

    /// Reads a record from the file with the short file identifier.
    pub fn read_record_sfi(
        &self,
        sfi: u8,
        record_number: u8,
        length: u8,
    ) -> Result<Option<Vec<u8>>> {
        debug!("Read record {}, SFI {:02X}", record_number, sfi);

        tolerate(
            self.send_request(
                CLASS_ISO7816,
                INSTRUCTION_READ_RECORD,
                record_number,
                (sfi << 3) | READ_RECORD_BY_NUMBER,
                length,
                &[],
            ),
            |e| matches!(e, Error::EndOfFile),
        )
    }

    /// Exchanges the command, returning SW1, SW2 and the payload.
    fn transceive(&self, command: Command) -> Result<(u8, u8, Vec<u8>)> {
        let tx = Vec::from(command);
        debug!(">>> {}", hex::encode(&tx));

        let rx = self.delegate.transceive(&tx)?;
        debug!("<<< {}", hex::encode(&rx));

        // A reply without a full status word is what some HCE stacks send for unknown commands.
        if rx.len() < 2 {
            return Err(Error::MalformedResponse(rx));
        }

        let response = Response::from(rx.as_slice());
        let (sw1, sw2) = response.trailer;

        Ok((sw1, sw2, response.payload.to_vec()))
    }
}

fn command(cla: u8, ins: u8, p1: u8, p2: u8, le: u8, parameters: &[u8]) -> Command {
    match parameters.is_empty() {
        true => Command::new_with_le(cla, ins, p1, p2, le.into()),
        _ => Command::new_with_payload_le(cla, ins, p1, p2, le.into(), parameters),
    }
}

/// Folds recoverable status errors into `None`, keeping transport errors and the ones `keep`
/// selects.
fn tolerate<T, F>(result: Result<T>, keep: F) -> Result<Option<T>>
where
    F: FnOnce(&Error) -> bool,
{
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_transport() || keep(&e) => Err(e),
        Err(e) => {
            debug!("Couldn't read: {}", e);
            Ok(None)
        }
    }
}
