//! Scripted transceiver used by the tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::nfc::{Error, Transceiver};

/// Replays canned responses in order and records every command it was given.
/// Once the script runs out, every command is answered with `6A 82`.
#[derive(Debug, Default, Clone)]
pub(crate) struct ScriptedTransceiver {
    responses: Rc<RefCell<VecDeque<Result<Vec<u8>, Error>>>>,
    sent: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl ScriptedTransceiver {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    pub(crate) fn respond(&self, response: &[u8]) -> &Self {
        self.responses.borrow_mut().push_back(Ok(response.to_vec()));
        self
    }

    pub(crate) fn fail(&self, error: Error) -> &Self {
        self.responses.borrow_mut().push_back(Err(error));
        self
    }

    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.borrow().clone()
    }
}

impl Transceiver for ScriptedTransceiver {
    fn transceive(&self, command: &[u8]) -> Result<Vec<u8>, Error> {
        self.sent.borrow_mut().push(command.to_vec());

        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(vec![0x6A, 0x82]))
    }
}

/// A transceiver answering by matching the command prefix, for dumps with many exchanges.
#[derive(Debug, Default, Clone)]
pub(crate) struct MapTransceiver {
    rules: Rc<RefCell<Vec<(Vec<u8>, Vec<u8>)>>>,
    sent: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl MapTransceiver {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    /// Answers any command starting with `prefix`. Earlier rules win.
    pub(crate) fn on(&self, prefix: &[u8], response: &[u8]) -> &Self {
        self.rules
            .borrow_mut()
            .push((prefix.to_vec(), response.to_vec()));
        self
    }

    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.borrow().clone()
    }
}

impl Transceiver for MapTransceiver {
    fn transceive(&self, command: &[u8]) -> Result<Vec<u8>, Error> {
        self.sent.borrow_mut().push(command.to_vec());

        Ok(self
            .rules
            .borrow()
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| vec![0x6A, 0x82]))
    }
}
