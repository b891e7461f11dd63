use std::collections::BTreeMap;

use crate::feedback::Feedback;
use crate::iso7816::{Error, File, Protocol, Result, Selector};
use crate::tlv::find_ber_tlv;
use crate::trace::debug;

/// Highest short file identifier probed by [MutableCapsule::dump_all_sfis].
pub const MAX_SFI: u8 = 31;

const PROPRIETARY_TEMPLATE: [u8; 1] = [0xA5];

/// Files of an application, collected while the card is being read.
#[derive(Debug, Clone, Default)]
pub struct MutableCapsule {
    files: BTreeMap<Selector, File>,
    sfi_files: BTreeMap<u8, File>,
    app_fci: Option<Vec<u8>>,
    app_name: Option<Vec<u8>>,
}

impl MutableCapsule {
    pub fn new(app_name: Option<Vec<u8>>, app_fci: Option<Vec<u8>>) -> Self {
        Self {
            app_name,
            app_fci,
            ..Default::default()
        }
    }

    pub fn app_name(&self) -> Option<&[u8]> {
        self.app_name.as_deref()
    }

    pub fn app_fci(&self) -> Option<&[u8]> {
        self.app_fci.as_deref()
    }

    pub fn get_file(&self, selector: &Selector) -> Option<&File> {
        self.files.get(selector)
    }

    pub fn get_sfi_file(&self, sfi: u8) -> Option<&File> {
        self.sfi_files.get(&sfi)
    }

    /// The proprietary template (`A5`) of the application FCI, header included.
    pub fn proprietary_ber_tlv(&self) -> Option<&[u8]> {
        proprietary_ber_tlv(self.app_fci())
    }

    /// Selects the file by its path, then reads the body and every record.
    ///
    /// Returns `None` if the file could not be selected. Only transport errors are returned.
    pub fn dump_file(
        &mut self,
        protocol: &Protocol,
        selector: &Selector,
        record_len: u8,
    ) -> Result<Option<&File>> {
        if let Err(e) = protocol.unselect_file() {
            if e.is_transport() {
                return Err(e);
            }

            debug!("Unselect failed, trying select anyway: {}", e);
        }

        let fci = match selector.select(protocol) {
            Ok(fci) => fci,
            Err(e) if e.is_transport() => return Err(e),
            Err(e) => {
                debug!("Couldn't select {}: {}", selector, e);
                return Ok(None);
            }
        };

        let binary_data = match protocol.read_binary() {
            Ok(data) => data,
            Err(e) if e.is_transport() => return Err(e),
            Err(_) => None,
        };

        let (records, _) = read_records(|index| protocol.read_record(index, record_len))?;

        self.files.insert(
            selector.clone(),
            File {
                binary_data,
                records,
                fci: Some(fci),
            },
        );

        Ok(self.files.get(selector))
    }

    /// Reads the body and every record of the file with the short file identifier.
    ///
    /// Returns `None` if the file is missing or locked, or if nothing could be read from it.
    pub fn dump_file_sfi(
        &mut self,
        protocol: &Protocol,
        sfi: u8,
        record_len: u8,
    ) -> Result<Option<&File>> {
        let binary_data = match protocol.read_binary_sfi(sfi) {
            Ok(data) => data,
            Err(Error::FileNotFound | Error::SecurityStatusNotSatisfied) => return Ok(None),
            Err(e) if e.is_transport() => return Err(e),
            Err(e) => {
                debug!("Couldn't read binary of SFI {}: {}", sfi, e);
                None
            }
        };

        let (records, end_of_file) =
            read_records(|index| protocol.read_record_sfi(sfi, index, record_len))?;

        if binary_data.is_none() && records.is_empty() && !end_of_file {
            return Ok(None);
        }

        self.sfi_files.insert(
            sfi,
            File {
                binary_data,
                records,
                fci: None,
            },
        );

        Ok(self.sfi_files.get(&sfi))
    }

    /// Dumps every short file identifier from 1 to 31, reporting progress from `start` of
    /// `total`.
    pub fn dump_all_sfis(
        &mut self,
        protocol: &Protocol,
        feedback: &dyn Feedback,
        start: u32,
        total: u32,
    ) -> Result<()> {
        self.dump_all_sfis_with_bail_out(protocol, feedback, start, total, |_, _| false)
    }

    /// Like [MutableCapsule::dump_all_sfis], stopping as soon as `bail_out` returns true
    /// for an SFI and what was read from it.
    pub fn dump_all_sfis_with_bail_out<F>(
        &mut self,
        protocol: &Protocol,
        feedback: &dyn Feedback,
        start: u32,
        total: u32,
        mut bail_out: F,
    ) -> Result<()>
    where
        F: FnMut(u8, Option<&File>) -> bool,
    {
        let mut counter = start;
        for sfi in 1..=MAX_SFI {
            feedback.update_progress_bar(counter, total);
            counter += 1;

            let file = self.dump_file_sfi(protocol, sfi, 0)?;
            if bail_out(sfi, file) {
                debug!("Stopped dumping SFIs at {}", sfi);
                break;
            }
        }

        Ok(())
    }

    pub fn freeze(self) -> ApplicationCapsule {
        ApplicationCapsule {
            files: self.files,
            sfi_files: self.sfi_files,
            app_fci: self.app_fci,
            app_name: self.app_name,
        }
    }
}

/// Reads records from 1 until one is missing. Also tells whether the end of the file was
/// reached.
fn read_records<F>(mut read: F) -> Result<(BTreeMap<u8, Vec<u8>>, bool)>
where
    F: FnMut(u8) -> Result<Option<Vec<u8>>>,
{
    let mut records = BTreeMap::new();
    for index in 1..=u8::MAX {
        match read(index) {
            Ok(Some(record)) => {
                records.insert(index, record);
            }
            Ok(None) => break,
            Err(Error::EndOfFile) => return Ok((records, true)),
            Err(e) => return Err(e),
        }
    }

    Ok((records, false))
}

fn proprietary_ber_tlv(fci: Option<&[u8]>) -> Option<&[u8]> {
    find_ber_tlv(fci?, &PROPRIETARY_TEMPLATE, true)
}

/// Files of an application, as captured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ApplicationCapsule {
    files: BTreeMap<Selector, File>,
    sfi_files: BTreeMap<u8, File>,
    app_fci: Option<Vec<u8>>,
    app_name: Option<Vec<u8>>,
}

impl ApplicationCapsule {
    pub fn files(&self) -> &BTreeMap<Selector, File> {
        &self.files
    }

    pub fn sfi_files(&self) -> &BTreeMap<u8, File> {
        &self.sfi_files
    }

    pub fn app_name(&self) -> Option<&[u8]> {
        self.app_name.as_deref()
    }

    pub fn app_fci(&self) -> Option<&[u8]> {
        self.app_fci.as_deref()
    }

    pub fn get_file(&self, selector: &Selector) -> Option<&File> {
        self.files.get(selector)
    }

    pub fn get_sfi_file(&self, sfi: u8) -> Option<&File> {
        self.sfi_files.get(&sfi)
    }

    /// Whether any file was captured at or below the path.
    pub fn path_exists(&self, selector: &Selector) -> bool {
        self.files.keys().any(|path| path.starts_with(selector))
    }

    /// The proprietary template (`A5`) of the application FCI, header included.
    pub fn proprietary_ber_tlv(&self) -> Option<&[u8]> {
        proprietary_ber_tlv(self.app_fci())
    }
}

impl From<MutableCapsule> for ApplicationCapsule {
    fn from(capsule: MutableCapsule) -> Self {
        capsule.freeze()
    }
}
