//! EMV payment cards, reached through the payment system environment (`1PAY.SYS.DDF01`) or
//! its contactless counterpart (`2PAY.SYS.DDF01`).
//!
//! The environment itself is kept as an anchor application. Every application listed in its
//! directory is then selected and read, including a GET PROCESSING OPTIONS with fixed terminal
//! data.

use std::collections::{BTreeMap, BTreeSet};

use crate::ap::factory;
use crate::feedback::Feedback;
use crate::info::ListItem;
use crate::iso7816::protocol::CLASS_80;
use crate::iso7816::{Application, ApplicationKind, Error, MutableCapsule, Protocol, Result};
use crate::tlv::{
    ber_tlv_iterate, find_ber_tlv, find_repeated_ber_tlv, info_ber_tlv_with_unknowns,
    pdol_iterate, TagContents, TagDesc,
};
use crate::trace::debug;

const INS_GET_PROCESSING_OPTIONS: u8 = 0xA8;
const INS_GET_DATA: u8 = 0xCA;

const TAG_DISCRETIONARY_DATA: [u8; 2] = [0xBF, 0x0C];
const TAG_APPLICATION_TEMPLATE: [u8; 1] = [0x61];
const TAG_AID: [u8; 1] = [0x4F];
const TAG_PDOL: [u8; 2] = [0x9F, 0x38];
const TAG_COMMAND_TEMPLATE: u8 = 0x83;

const LOG_FORMAT: u16 = 0x9F4F;
const PIN_RETRY: u16 = 0x9F17;
const DATA_OBJECTS: [u16; 4] = [0x9F13, PIN_RETRY, 0x9F36, LOG_FORMAT];

const PROGRESS_MAX: u32 = 64;

factory!(
    &["emv-anchor", "emv-main"],
    &[b"1PAY.SYS.DDF01", b"2PAY.SYS.DDF01"],
    false
);

/// Names of the EMV tags shown when the card is described.
pub const TAGS: [(&str, TagDesc); 33] = [
    ("50", TagDesc::new("Name 1", TagContents::Ascii)),
    ("56", TagDesc::new("Track 1", TagContents::Ascii)),
    ("57", TagDesc::new("Track 2 equivalent", TagContents::DumpShort)),
    ("58", TagDesc::new("Track 3 equivalent", TagContents::DumpShort)),
    ("5F20", TagDesc::new("Cardholder name", TagContents::Ascii)),
    ("5F24", TagDesc::new("Expiry date", TagContents::Date)),
    ("5F25", TagDesc::new("Issue date", TagContents::Date)),
    ("5F28", TagDesc::new("Issuer country", TagContents::DumpShort)),
    ("5F2D", TagDesc::new("Language preference", TagContents::Ascii)),
    ("5F34", TagDesc::new("PAN sequence number", TagContents::DumpShort)),
    ("82", TagDesc::new("Application interchange profile", TagContents::DumpShort)),
    ("87", TagDesc::new("Application priority indicator", TagContents::DumpShort)),
    ("8F", TagDesc::new("CA public key index", TagContents::DumpShort)),
    ("90", TagDesc::new("Issuer public key certificate", TagContents::DumpLong)),
    ("92", TagDesc::new("Issuer public key modulus", TagContents::DumpLong)),
    ("93", TagDesc::new("Signed static application data", TagContents::DumpLong)),
    ("94", TagDesc::new("Application file locator", TagContents::DumpShort)),
    ("9F0B", TagDesc::new("Cardholder name", TagContents::Ascii)),
    ("9F10", TagDesc::new("Issuer application data", TagContents::DumpLong)),
    ("9F11", TagDesc::new("Issuer code table index", TagContents::DumpShort)),
    ("9F12", TagDesc::new("Name 2", TagContents::Ascii)),
    ("9F1F", TagDesc::new("Track 1 discretionary data", TagContents::Ascii)),
    ("9F26", TagDesc::new("Application cryptogram", TagContents::DumpLong)),
    ("9F27", TagDesc::new("Cryptogram information data", TagContents::DumpLong)),
    ("9F32", TagDesc::new("Issuer public key exponent", TagContents::DumpLong)),
    ("9F36", TagDesc::new("Application transaction counter", TagContents::DumpShort)),
    ("9F38", TagDesc::new("PDOL", TagContents::Hide)),
    ("9F42", TagDesc::new("Application currency", TagContents::DumpShort)),
    ("9F44", TagDesc::new("Application currency exponent", TagContents::DumpShort)),
    ("9F46", TagDesc::new("ICC public key certificate", TagContents::DumpLong)),
    ("9F47", TagDesc::new("ICC public key exponent", TagContents::DumpLong)),
    ("9F48", TagDesc::new("ICC public key modulus", TagContents::DumpLong)),
    ("9F6B", TagDesc::new("Track 2", TagContents::DumpShort)),
];

fn dump(
    protocol: &Protocol,
    mut capsule: MutableCapsule,
    feedback: &dyn Feedback,
) -> Result<Vec<Application>> {
    feedback.update_status_text("Reading EMV card");
    feedback.update_progress_bar(0, 32);

    let mut failed = 0;
    capsule.dump_all_sfis_with_bail_out(protocol, feedback, 0, PROGRESS_MAX, |sfi, file| {
        if file.is_some() {
            return false;
        }

        // Three misses in a row from SFI 1 means nothing is readable by SFI.
        failed += 1;
        sfi == 3 && failed == 3
    })?;

    let anchor = capsule.freeze();
    let aids: Vec<Vec<u8>> = anchor
        .proprietary_ber_tlv()
        .and_then(|a5| find_ber_tlv(a5, &TAG_DISCRETIONARY_DATA, true))
        .map(|discretionary| {
            find_repeated_ber_tlv(discretionary, &TAG_APPLICATION_TEMPLATE, true)
                .into_iter()
                .filter_map(|entry| find_ber_tlv(entry, &TAG_AID, false))
                .map(<[u8]>::to_vec)
                .collect()
        })
        .unwrap_or_default();

    let mut applications = vec![Application::new(anchor, ApplicationKind::EmvAnchor)];

    for aid in aids {
        debug!("EMV application: {}", hex::encode(&aid));

        let fci = protocol.select_by_name_or_none(&aid)?;
        let mut main = MutableCapsule::new(Some(aid), fci);
        main.dump_all_sfis(protocol, feedback, 32, PROGRESS_MAX)?;

        let gpo_response = match get_processing_options(protocol, &main) {
            Ok(response) => response,
            Err(e) if e.is_transport() => return Err(e),
            Err(e) => {
                debug!("Skipping GET PROCESSING OPTIONS: {}", e);
                None
            }
        };

        let mut data_responses = BTreeMap::new();
        for p1p2 in DATA_OBJECTS {
            if let Some(data) = get_data(protocol, p1p2)? {
                data_responses.insert(format!("{:x}", p1p2), data);
            }
        }

        applications.push(Application::new(
            main,
            ApplicationKind::EmvMain {
                gpo_response,
                data_responses,
            },
        ));
    }

    Ok(applications)
}

fn get_data(protocol: &Protocol, p1p2: u16) -> Result<Option<Vec<u8>>> {
    let [p1, p2] = p1p2.to_be_bytes();

    match protocol.send_request(CLASS_80, INS_GET_DATA, p1, p2, 0, &[]) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.is_transport() => Err(e),
        Err(e) => {
            debug!("GET DATA {:04X} failed: {}", p1p2, e);
            Ok(None)
        }
    }
}

fn get_processing_options(
    protocol: &Protocol,
    capsule: &MutableCapsule,
) -> Result<Option<Vec<u8>>> {
    let pdol = match capsule
        .proprietary_ber_tlv()
        .and_then(|a5| find_ber_tlv(a5, &TAG_PDOL, false))
    {
        Some(pdol) => pdol,
        None => return Ok(None),
    };

    debug!("PDOL = {}", hex::encode(pdol));

    let filled = fill_pdol(pdol);
    let len = u8::try_from(filled.len()).map_err(|_| Error::CommandTooLong(filled.len()))?;
    let mut request = vec![TAG_COMMAND_TEMPLATE, len];
    request.extend(filled);

    match protocol.send_request(CLASS_80, INS_GET_PROCESSING_OPTIONS, 0, 0, 0, &request) {
        Ok(response) => Ok(Some(response)),
        Err(e) if e.is_transport() => Err(e),
        Err(e) => {
            debug!("GET PROCESSING OPTIONS failed: {}", e);
            Ok(None)
        }
    }
}

/// Terminal data sent for a tag requested by the card.
fn terminal_data(tag: &[u8]) -> &'static [u8] {
    match tag {
        // Transaction currency: USD
        [0x5F, 0x2A] => &[0x08, 0x40],
        // Terminal verification results
        [0x95] => &[0x00; 5],
        // Transaction date: 2018-01-01
        [0x9A] => &[0x18, 0x01, 0x01],
        // Transaction type
        [0x9C] => &[0x00],
        // Amounts, authorised and other
        [0x9F, 0x02] | [0x9F, 0x03] => &[0x00; 6],
        // Terminal country: USA
        [0x9F, 0x1A] => &[0x08, 0x40],
        // Unpredictable number
        [0x9F, 0x37] => &[0x08, 0x13, 0x0C, 0xE7],
        // Terminal transaction qualifiers
        [0x9F, 0x66] => &[0xF6, 0x20, 0xC0, 0x00],
        _ => &[],
    }
}

/// Fills a data object list with the fixed terminal data. Values are truncated from the left or
/// padded with leading zeros to fit the requested length.
pub fn fill_pdol(pdol: &[u8]) -> Vec<u8> {
    let mut filled = Vec::new();

    for (tag, len) in pdol_iterate(pdol) {
        let contents = terminal_data(tag);
        if contents.len() >= len {
            filled.extend_from_slice(&contents[contents.len() - len..]);
        } else {
            filled.resize(filled.len() + len - contents.len(), 0);
            filled.extend_from_slice(contents);
        }
    }

    filled
}

fn data_response<'a>(application: &'a Application, p1p2: u16) -> Option<&'a [u8]> {
    match &application.kind {
        ApplicationKind::EmvMain { data_responses, .. } => data_responses
            .get(&format!("{:x}", p1p2))
            .map(Vec::as_slice),
        _ => None,
    }
}

/// The transaction log format (`9F4F`) as returned by GET DATA.
pub fn log_format(application: &Application) -> Option<&[u8]> {
    data_response(application, LOG_FORMAT)
}

/// The PIN try counter (`9F17`) as returned by GET DATA.
pub fn pin_tries_remaining(application: &Application) -> Option<&[u8]> {
    data_response(application, PIN_RETRY)
}

/// Every TLV buffer of the application that may describe the card: the GPO response, the
/// proprietary template, the directory and the records of SFIs 1 to 10.
pub fn get_all_tlv(application: &Application) -> Vec<&[u8]> {
    let mut buffers = Vec::new();

    if let Some(a5) = application.proprietary_ber_tlv() {
        if let ApplicationKind::EmvMain {
            gpo_response: Some(gpo),
            ..
        } = &application.kind
        {
            buffers.push(gpo.as_slice());
        }

        buffers.push(a5);
        buffers.extend(find_ber_tlv(a5, &TAG_DISCRETIONARY_DATA, true));
    }

    for sfi in 1..=10 {
        if let Some(file) = application.get_sfi_file(sfi) {
            buffers.extend(file.record_list());
        }
    }

    buffers.retain(|buffer| !buffer.is_empty());
    buffers
}

/// Describes the known tags found in the application, also returning the unknown ones.
pub fn info(application: &Application) -> (Vec<ListItem>, BTreeSet<String>) {
    let mut items = Vec::new();
    let mut unknown = BTreeSet::new();

    for buffer in get_all_tlv(application) {
        // Records and responses are wrapped in a single template.
        let body = match ber_tlv_iterate(buffer).next() {
            Some(template) if template.is_constructed() => template.data,
            _ => buffer,
        };

        let (found, unknown_tags) = info_ber_tlv_with_unknowns(body, &TAGS);
        items.extend(found);
        unknown.extend(unknown_tags);
    }

    (items, unknown)
}

pub(crate) fn raw_data(
    gpo_response: Option<&[u8]>,
    data_responses: &BTreeMap<String, Vec<u8>>,
) -> Vec<ListItem> {
    let gpo = gpo_response.map(hex::encode).unwrap_or_else(|| "null".to_owned());

    std::iter::once(ListItem::new("GPO response", gpo))
        .chain(data_responses.iter().map(|(tag, data)| {
            ListItem::new(format!("Data response {}", tag), hex::encode(data))
        }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::NoFeedback;
    use crate::nfc::mock::MapTransceiver;

    // 6F: 84 (2PAY.SYS.DDF01), A5 { BF0C { 61 { 4F A0000000031010 } } }
    const PPSE_FCI: [u8; 34] = [
        0x6F, 0x20, 0x84, 0x0E, 0x32, 0x50, 0x41, 0x59, 0x2E, 0x53, 0x59, 0x53, 0x2E, 0x44, 0x44,
        0x46, 0x30, 0x31, 0xA5, 0x0E, 0xBF, 0x0C, 0x0B, 0x61, 0x09, 0x4F, 0x07, 0xA0, 0x00,
        0x00, 0x00, 0x03, 0x10, 0x10,
    ];

    // 6F: 84 (AID), A5 { 9F38 { 9F66 04, 9F02 06, 5F2A 02, 9F37 04 } }
    const APP_FCI: [u8; 28] = [
        0x6F, 0x1A, 0x84, 0x07, 0xA0, 0x00, 0x00, 0x00, 0x03, 0x10, 0x10, 0xA5, 0x0F, 0x9F,
        0x38, 0x0C, 0x9F, 0x66, 0x04, 0x9F, 0x02, 0x06, 0x5F, 0x2A, 0x02, 0x9F, 0x37, 0x04,
    ];

    #[test]
    fn test_fill_pdol() {
        assert_eq!(
            vec![
                0xF6, 0x20, 0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x40, 0x08,
                0x13, 0x0C, 0xE7,
            ],
            fill_pdol(&[0x9F, 0x66, 0x04, 0x9F, 0x02, 0x06, 0x5F, 0x2A, 0x02, 0x9F, 0x37, 0x04])
        );

        // Truncated from the left, padded on the left, unknown tags are zeros.
        assert_eq!(
            vec![0x40, 0x00, 0x00, 0x18, 0x01, 0x01, 0x00, 0x00],
            fill_pdol(&[0x5F, 0x2A, 0x01, 0x9A, 0x05, 0xDF, 0x01, 0x02])
        );
    }

    #[test]
    fn test_dump() {
        let mut app_fci = APP_FCI.to_vec();
        app_fci.extend([0x90, 0x00]);

        let mock = MapTransceiver::new();
        mock.on(
            &[0x00, 0xA4, 0x04, 0x00, 0x07, 0xA0, 0x00, 0x00, 0x00, 0x03, 0x10, 0x10],
            &app_fci,
        )
        .on(&[0x80, 0xA8], &[0x77, 0x02, 0x82, 0x00, 0x90, 0x00])
        .on(&[0x80, 0xCA, 0x9F, 0x17], &[0x9F, 0x17, 0x01, 0x03, 0x90, 0x00])
        .on(&[0x80, 0xCA], &[0x6A, 0x88]);

        let protocol = Protocol::new(Box::new(mock.clone()));
        let capsule =
            MutableCapsule::new(Some(b"2PAY.SYS.DDF01".to_vec()), Some(PPSE_FCI.to_vec()));
        let applications = dump(&protocol, capsule, &NoFeedback).unwrap();

        assert_eq!(2, applications.len());
        assert_eq!("emv-anchor", applications[0].type_name());
        assert_eq!("emv-main", applications[1].type_name());

        let main = &applications[1];
        assert_eq!(
            Some(&[0xA0, 0x00, 0x00, 0x00, 0x03, 0x10, 0x10][..]),
            main.app_name()
        );
        assert_eq!(Some(&[0x9F, 0x17, 0x01, 0x03][..]), pin_tries_remaining(main));
        assert_eq!(None, log_format(main));

        match &main.kind {
            ApplicationKind::EmvMain { gpo_response, .. } => {
                assert_eq!(Some(vec![0x77, 0x02, 0x82, 0x00]), *gpo_response);
            }
            kind => panic!("unexpected kind: {:?}", kind),
        }

        let gpo = mock
            .sent()
            .into_iter()
            .find(|c| c.starts_with(&[0x80, 0xA8]))
            .unwrap();
        assert_eq!(
            vec![
                0x80, 0xA8, 0x00, 0x00, 0x12, 0x83, 0x10, 0xF6, 0x20, 0xC0, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0x08, 0x40, 0x08, 0x13, 0x0C, 0xE7, 0x00,
            ],
            gpo
        );
    }

    #[test]
    fn test_oversized_pdol_is_not_sent() {
        // 9F38 asking for 2 * 0x90 octets.
        let mut fci = vec![0x6F, 0x10, 0x84, 0x01, 0xA0, 0xA5, 0x0B, 0x9F, 0x38, 0x08];
        fci.extend([0x9F, 0x02, 0x81, 0x90, 0x9F, 0x03, 0x81, 0x90]);
        let capsule = MutableCapsule::new(Some(vec![0xA0]), Some(fci));

        let mock = MapTransceiver::new();
        let protocol = Protocol::new(Box::new(mock.clone()));

        assert_eq!(
            Err(Error::CommandTooLong(288)),
            get_processing_options(&protocol, &capsule)
        );
        assert!(mock.sent().is_empty());
    }

    #[test]
    fn test_dump_bail_out() {
        let mock = MapTransceiver::new();
        let protocol = Protocol::new(Box::new(mock.clone()));
        let applications = dump(&protocol, MutableCapsule::default(), &NoFeedback).unwrap();

        assert_eq!(1, applications.len());
        assert_eq!(3, mock.sent().len());
    }

    #[test]
    fn test_info() {
        let mut capsule = MutableCapsule::new(None, None);
        let mock = MapTransceiver::new();
        mock.on(&[0x00, 0xB0, 0x81], &[0x69, 0x86])
            .on(
                &[0x00, 0xB2, 0x01, 0x0C],
                &[
                    0x70, 0x0A, 0x5F, 0x24, 0x03, 0x25, 0x12, 0x31, 0x9F, 0x7C, 0x01, 0x00, 0x90,
                    0x00,
                ],
            )
            .on(&[0x00, 0xB2, 0x02, 0x0C], &[0x6A, 0x83]);
        capsule
            .dump_file_sfi(&Protocol::new(Box::new(mock)), 1, 0)
            .unwrap();

        let application = Application::new(capsule, ApplicationKind::EmvAnchor);
        let (items, unknown) = info(&application);

        assert_eq!(
            vec![
                ListItem::new("Expiry date", "2025-12-31"),
                ListItem::new("9F7C", "00"),
            ],
            items
        );
        assert_eq!(BTreeSet::from(["9F7C".to_owned()]), unknown);
    }

    #[test]
    fn test_raw_data() {
        let items = raw_data(None, &BTreeMap::from([("9f36".to_owned(), vec![0x00, 0x2A])]));

        assert_eq!(
            vec![
                ListItem::new("GPO response", "null"),
                ListItem::new("Data response 9f36", "002a"),
            ],
            items
        );
    }
}
