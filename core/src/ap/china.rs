//! Transit cards of mainland China (Shenzhen Tong, Wuhan Tong, City Union, T-Union).

use std::collections::BTreeMap;

use crate::ap::factory;
use crate::feedback::Feedback;
use crate::info::{hex_dump, ListItem};
use crate::iso7816::protocol::CLASS_80;
use crate::iso7816::{Application, ApplicationKind, MutableCapsule, Protocol, Result, Selector};
use crate::trace::warning;

const PAY_SZT: &[u8] = b"PAY.SZT";
const AP1_WHCTC: &[u8] = b"AP1.WHCTC";
const CITY_UNION: &[u8] = &[0xA0, 0x00, 0x00, 0x00, 0x03, 0x86, 0x98, 0x07, 0x01];
const T_UNION: &[u8] = &[0xA0, 0x00, 0x00, 0x06, 0x32, 0x01, 0x01, 0x05];

const INS_GET_BALANCE: u8 = 0x5C;
const BALANCE_RESP_LEN: u8 = 4;

const FILES: [u16; 8] = [4, 5, 8, 9, 10, 21, 24, 25];
const SUB_DF: u16 = 0x1001;
const PROGRESS_MAX: u32 = 16;

factory!(&["china"], &[PAY_SZT, AP1_WHCTC, CITY_UNION, T_UNION], false);

fn dump(
    protocol: &Protocol,
    mut capsule: MutableCapsule,
    feedback: &dyn Feedback,
) -> Result<Vec<Application>> {
    feedback.update_status_text("Reading China transit card");
    feedback.update_progress_bar(0, 6);

    capsule.dump_all_sfis(protocol, feedback, 0, 32)?;

    feedback.update_progress_bar(0, 5);

    let mut balances = BTreeMap::new();
    for i in 0..=3u8 {
        match protocol.send_request(CLASS_80, INS_GET_BALANCE, i, 2, BALANCE_RESP_LEN, &[]) {
            Ok(balance) => {
                balances.insert(i, balance);
            }
            Err(e) if e.is_transport() => return Err(e),
            Err(e) => warning!("Couldn't get the balance {}: {}", i, e),
        }
    }

    feedback.update_progress_bar(1, PROGRESS_MAX);

    let mut progress = 2;
    for under_df in [false, true] {
        for id in FILES {
            let selector = match under_df {
                true => Selector::by_ids(&[SUB_DF, id]),
                _ => Selector::by_ids(&[id]),
            };

            capsule.dump_file(protocol, &selector, 0)?;

            feedback.update_progress_bar(progress, PROGRESS_MAX);
            progress += 1;
        }
    }

    Ok(vec![Application::new(capsule, ApplicationKind::China { balances })])
}

/// The balance of the purse, as returned by the card.
pub fn balance(application: &Application, index: u8) -> Option<&[u8]> {
    match &application.kind {
        ApplicationKind::China { balances } => balances.get(&index).map(Vec::as_slice),
        _ => None,
    }
}

/// The balance of the purse in the smallest unit of the currency.
pub fn balance_value(application: &Application, index: u8) -> Option<i32> {
    match balance(application, index)? {
        [a, b, c, d] => Some(i32::from_be_bytes([*a, *b, *c, *d])),
        _ => None,
    }
}

pub(crate) fn raw_data(balances: &BTreeMap<u8, Vec<u8>>) -> Vec<ListItem> {
    balances
        .iter()
        .map(|(index, data)| ListItem::new(format!("Balance {}", index), hex_dump(data)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::NoFeedback;
    use crate::nfc::mock::MapTransceiver;

    #[test]
    fn test_dump() {
        let mock = MapTransceiver::new();
        mock.on(&[0x80, 0x5C, 0x00, 0x02, 0x04], &[0x00, 0x00, 0x01, 0xF4, 0x90, 0x00])
            .on(&[0x80, 0x5C, 0x02, 0x02, 0x04], &[0xFF, 0xFF, 0xFF, 0xFE, 0x90, 0x00])
            .on(&[0x80, 0x5C], &[0x6A, 0x86])
            .on(&[0x00, 0xA4, 0x00, 0x00, 0x02, 0x00, 0x15], &[0x90, 0x00])
            .on(&[0x00, 0xB0, 0x00], &[0x0A, 0x0B, 0x90, 0x00])
            .on(&[0x00, 0xB2], &[0x6A, 0x83]);

        let protocol = Protocol::new(Box::new(mock.clone()));
        let capsule = MutableCapsule::new(Some(PAY_SZT.to_vec()), None);
        let applications = dump(&protocol, capsule, &NoFeedback).unwrap();

        assert_eq!(1, applications.len());

        let application = &applications[0];
        assert_eq!(Some(500), balance_value(application, 0));
        assert_eq!(None, balance(application, 1));
        assert_eq!(Some(-2), balance_value(application, 2));
        assert_eq!(
            Some(&[0x0A, 0x0B][..]),
            application
                .get_file(&Selector::by_ids(&[21]))
                .and_then(|f| f.binary_data.as_deref())
        );

        // Both the root and 1001 are tried for every file.
        let selects = mock
            .sent()
            .into_iter()
            .filter(|c| c.starts_with(&[0x00, 0xA4, 0x00, 0x00, 0x02, 0x10, 0x01]))
            .count();
        assert_eq!(FILES.len(), selects);
    }

    #[test]
    fn test_raw_data() {
        let items = raw_data(&BTreeMap::from([(1, vec![0x00, 0x10])]));

        assert_eq!(vec![ListItem::new("Balance 1", "00 10")], items);
    }
}
