//! KS X 6924: stored value cards of South Korea (T-Money, Snapper, Cashbee).

use crate::ap::factory;
use crate::feedback::Feedback;
use crate::info::{hex_dump, ListItem};
use crate::iso7816::protocol::CLASS_90;
use crate::iso7816::{Application, ApplicationKind, MutableCapsule, Protocol, Result, Selector};
use crate::tlv::find_ber_tlv;
use crate::trace::{debug, warning};

const APP_NAME: [u8; 7] = [0xD4, 0x10, 0x00, 0x00, 0x03, 0x00, 0x01];

const INS_GET_BALANCE: u8 = 0x4C;
const INS_GET_RECORD: u8 = 0x78;
const BALANCE_RESP_LEN: u8 = 4;
const RECORD_RESP_LEN: u8 = 0x10;
const RECORD_COUNT: u8 = 16;

const TRANSACTION_FILE: u8 = 4;
const PURSE_INFO_TAG: [u8; 1] = [0xB0];
const PROGRESS_MAX: u32 = 37;

factory!(&["ksx6924", "tmoney"], &[&APP_NAME], false);

fn dump(
    protocol: &Protocol,
    mut capsule: MutableCapsule,
    feedback: &dyn Feedback,
) -> Result<Vec<Application>> {
    feedback.update_status_text("Reading T-Money card");
    feedback.update_progress_bar(0, PROGRESS_MAX);

    capsule.dump_all_sfis(protocol, feedback, 0, 32)?;

    let balance = protocol.send_request(CLASS_90, INS_GET_BALANCE, 0, 0, BALANCE_RESP_LEN, &[]);
    let balance = match balance {
        Ok(balance) => balance,
        Err(e) if e.is_transport() => return Err(e),
        Err(e) => {
            warning!("Couldn't get the balance: {}", e);
            return Ok(Vec::new());
        }
    };

    feedback.update_progress_bar(1, PROGRESS_MAX);

    let mut extra_records = Vec::new();
    for i in 0..RECORD_COUNT {
        debug!("Sending proprietary record get = {}", i);

        match protocol.send_request(CLASS_90, INS_GET_RECORD, i, 0, RECORD_RESP_LEN, &[]) {
            Ok(record) => extra_records.push(record),
            Err(e) if e.is_transport() => return Err(e),
            Err(e) => {
                warning!("Couldn't get the record {}: {}", i, e);
                return Ok(Vec::new());
            }
        }
    }

    for i in 1..=5u16 {
        capsule.dump_file(protocol, &Selector::by_name_and_id(&APP_NAME, i), 0)?;
        feedback.update_progress_bar(32 + i as u32, PROGRESS_MAX);
    }

    capsule.dump_file(protocol, &Selector::by_ids(&[0xDF00]), 0)?;

    Ok(vec![Application::new(
        capsule,
        ApplicationKind::Ksx6924 {
            balance,
            extra_records,
        },
    )])
}

/// The balance as returned by `GET BALANCE`.
pub fn balance(application: &Application) -> Option<u32> {
    match &application.kind {
        ApplicationKind::Ksx6924 { balance, .. } if balance.len() == 4 => {
            Some(u32::from_be_bytes([balance[0], balance[1], balance[2], balance[3]]))
        }
        _ => None,
    }
}

/// Records of the transaction file, read through its SFI or else through its path.
pub fn transaction_records(application: &Application) -> Option<Vec<&[u8]>> {
    application
        .get_sfi_file(TRANSACTION_FILE)
        .or_else(|| {
            application.get_file(&Selector::by_name_and_id(
                &APP_NAME,
                TRANSACTION_FILE as u16,
            ))
        })
        .map(|file| file.record_list())
}

/// The purse information (`B0`) carried in the application FCI.
pub fn purse_info(application: &Application) -> Option<&[u8]> {
    find_ber_tlv(application.app_fci()?, &PURSE_INFO_TAG, false)
}

pub(crate) fn raw_data(balance: &[u8], extra_records: &[Vec<u8>]) -> Vec<ListItem> {
    let mut items = vec![ListItem::new("T-Money Balance", hex_dump(balance))];

    for (i, record) in extra_records.iter().enumerate() {
        let empty = record.iter().all(|b| *b == 0x00) || record.iter().all(|b| *b == 0xFF);
        let title = match empty {
            true => format!("Record {:x} (empty)", i),
            _ => format!("Record {:x}", i),
        };

        items.push(ListItem::new(title, hex_dump(record)));
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::NoFeedback;
    use crate::nfc::mock::MapTransceiver;

    fn capsule() -> MutableCapsule {
        let fci = vec![
            0x6F, 0x0B, 0x84, 0x07, 0xD4, 0x10, 0x00, 0x00, 0x03, 0x00, 0x01, 0xB0, 0x00,
        ];
        MutableCapsule::new(Some(APP_NAME.to_vec()), Some(fci))
    }

    #[test]
    fn test_dump() {
        let mut record = vec![0x01; 16];
        record.extend([0x90, 0x00]);

        let mock = MapTransceiver::new();
        mock.on(&[0x90, 0x4C, 0x00, 0x00, 0x04], &[0x00, 0x00, 0x27, 0x10, 0x90, 0x00])
            .on(&[0x90, 0x78, 0x00], &record)
            .on(&[0x90, 0x78], &[0x00, 0x00, 0x90, 0x00])
            .on(&[0x00, 0xB0, 0x84], &[0x69, 0x86])
            .on(&[0x00, 0xB2, 0x01, 0x24], &[0x42, 0x90, 0x00])
            .on(&[0x00, 0xB2, 0x02, 0x24], &[0x6A, 0x83]);

        let protocol = Protocol::new(Box::new(mock));
        let applications = dump(&protocol, capsule(), &NoFeedback).unwrap();

        assert_eq!(1, applications.len());

        let application = &applications[0];
        assert_eq!("ksx6924", application.type_name());
        assert_eq!(Some(10000), balance(application));
        assert_eq!(Some(vec![&[0x42][..]]), transaction_records(application));
        assert_eq!(Some(&[][..]), purse_info(application));

        match &application.kind {
            ApplicationKind::Ksx6924 { extra_records, .. } => {
                assert_eq!(16, extra_records.len());
                assert_eq!(vec![0x01; 16], extra_records[0]);
            }
            kind => panic!("unexpected kind: {:?}", kind),
        }
    }

    #[test]
    fn test_dump_without_balance() {
        let mock = MapTransceiver::new();
        mock.on(&[0x90, 0x4C], &[0x6D, 0x00]);

        let protocol = Protocol::new(Box::new(mock));

        assert_eq!(Ok(Vec::new()), dump(&protocol, capsule(), &NoFeedback));
    }

    #[test]
    fn test_raw_data() {
        let items = raw_data(&[0x00, 0x00, 0x27, 0x10], &[vec![0xFF; 4], vec![0x01, 0x00]]);

        assert_eq!(3, items.len());
        assert_eq!("T-Money Balance", items[0].title);
        assert_eq!("Record 0 (empty)", items[1].title);
        assert_eq!("Record 1", items[2].title);
        assert_eq!(Some("01 00".to_owned()), items[2].value);
    }
}
