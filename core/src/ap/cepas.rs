//! CEPAS: stored value cards of Singapore (EZ-Link, NETS FlashPay).
//!
//! CEPAS cards are not selected by an application name. They are probed by selecting `4000`
//! before any other application is tried.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone};

use crate::feedback::Feedback;
use crate::info::{hex_dump, ListItem};
use crate::iso7816::protocol::CLASS_90;
use crate::iso7816::{Application, ApplicationKind, MutableCapsule, Protocol, Result, Selector};
use crate::trace::debug;

const DF_ID: u16 = 0x4000;
const INS_GET_PURSE: u8 = 0x32;
const PURSE_COUNT: u8 = 16;
const PROGRESS_MAX: u32 = 64;

/// The purse read by the usual readers, holding the manufacturing details.
const MAIN_PURSE: u8 = 3;

const TRANSACTION_LEN: usize = 16;

/// Probes the card for the CEPAS file structure and dumps it.
///
/// Returns `None` if `4000` cannot be selected or if no purse answers. Only transport errors
/// are returned.
pub fn dump(protocol: &Protocol, feedback: &dyn Feedback) -> Result<Option<Application>> {
    match protocol.select_by_id(DF_ID) {
        Ok(_) => {}
        Err(e) if e.is_transport() => return Err(e),
        Err(e) => {
            debug!("Not a CEPAS card: {}", e);
            return Ok(None);
        }
    }

    let mut purses = BTreeMap::new();
    for purse_id in 0..PURSE_COUNT {
        if let Some(purse) = get_purse(protocol, purse_id)? {
            if purses.is_empty() {
                feedback.update_status_text("Reading CEPAS card");
            }

            purses.insert(purse_id, purse);
        }

        if !purses.is_empty() {
            feedback.update_progress_bar(purse_id as u32, PROGRESS_MAX);
        }
    }

    if purses.is_empty() {
        return Ok(None);
    }

    let mut histories = BTreeMap::new();
    for purse_id in 0..PURSE_COUNT {
        if purses.contains_key(&purse_id) {
            if let Some(history) = get_history(protocol, purse_id)? {
                histories.insert(purse_id, history);
            }
        }

        feedback.update_progress_bar((purse_id + PURSE_COUNT) as u32, PROGRESS_MAX);
    }

    let mut capsule = MutableCapsule::default();
    for i in 0..32u16 {
        capsule.dump_file(protocol, &Selector::by_ids(&[0x3F00, DF_ID, i]), 0)?;
        feedback.update_progress_bar(i as u32 + 2 * PURSE_COUNT as u32, PROGRESS_MAX);
    }

    Ok(Some(Application::new(
        capsule,
        ApplicationKind::Cepas { purses, histories },
    )))
}

fn get_purse(protocol: &Protocol, purse_id: u8) -> Result<Option<Vec<u8>>> {
    non_empty(protocol.send_request(CLASS_90, INS_GET_PURSE, purse_id, 0, 0, &[]))
}

fn get_history(protocol: &Protocol, purse_id: u8) -> Result<Option<Vec<u8>>> {
    non_empty(protocol.send_request(CLASS_90, INS_GET_PURSE, purse_id, 0, 0, &[0x00]))
}

fn non_empty(result: Result<Vec<u8>>) -> Result<Option<Vec<u8>>> {
    match result {
        Ok(data) if data.is_empty() => Ok(None),
        Ok(data) => Ok(Some(data)),
        Err(e) if e.is_transport() => Err(e),
        Err(e) => {
            debug!("CEPAS request failed: {}", e);
            Ok(None)
        }
    }
}

/// Days and seconds on the card count from 1995-01-01 00:00 in Singapore.
fn epoch() -> Option<DateTime<FixedOffset>> {
    FixedOffset::east_opt(8 * 3600)?
        .with_ymd_and_hms(1995, 1, 1, 0, 0, 0)
        .single()
}

fn days_to_date(days: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1995, 1, 1)?.checked_add_signed(Duration::days(days as i64))
}

fn int_be(data: &[u8]) -> u32 {
    data.iter().fold(0, |acc, b| (acc << 8) | *b as u32)
}

fn int24_signed(data: &[u8]) -> i32 {
    ((int_be(data) << 8) as i32) >> 8
}

/// A transaction of a purse history, or the last one recorded in the purse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub kind: u8,
    pub amount: i32,
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub user_data: String,
}

impl Transaction {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < TRANSACTION_LEN {
            return None;
        }

        let seconds = int_be(&data[4..8]);
        let user_data = String::from_utf8_lossy(&data[8..16])
            .trim_end_matches(|c| c == '\0' || c == ' ')
            .to_owned();

        Some(Self {
            kind: data[0],
            amount: int24_signed(&data[1..4]),
            timestamp: epoch()
                .and_then(|epoch| epoch.checked_add_signed(Duration::seconds(seconds as i64))),
            user_data,
        })
    }
}

/// Splits a purse history into its transactions, most recent first.
pub fn parse_history(history: &[u8]) -> Vec<Transaction> {
    history
        .chunks_exact(TRANSACTION_LEN)
        .filter_map(Transaction::parse)
        .collect()
}

/// A purse as returned by the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purse {
    pub id: u8,
    pub version: u8,
    pub status: u8,
    pub balance: i32,
    pub auto_load_amount: i32,
    pub can: Vec<u8>,
    pub csn: Vec<u8>,
    pub expiry_date: Option<NaiveDate>,
    pub creation_date: Option<NaiveDate>,
    pub last_credit_transaction_trp: u32,
    pub last_credit_transaction_header: Vec<u8>,
    pub logfile_record_count: u8,
    pub issuer_data_length: u8,
    pub last_transaction_trp: u32,
    pub last_transaction: Option<Transaction>,
    pub issuer_specific_data: Vec<u8>,
    pub last_transaction_debit_options: u8,
}

impl Purse {
    /// Decodes the purse. Returns `None` if the data is shorter than the fixed part.
    pub fn parse(id: u8, data: &[u8]) -> Option<Self> {
        if data.len() < 62 {
            return None;
        }

        let issuer_data_length = data[41];
        let issuer_end = (62 + issuer_data_length as usize).min(data.len());

        Some(Self {
            id,
            version: data[0],
            status: data[1],
            balance: int24_signed(&data[2..5]),
            auto_load_amount: int24_signed(&data[5..8]),
            can: data[8..16].to_vec(),
            csn: data[16..24].to_vec(),
            expiry_date: days_to_date(int_be(&data[24..26])),
            creation_date: days_to_date(int_be(&data[26..28])),
            last_credit_transaction_trp: int_be(&data[28..32]),
            last_credit_transaction_header: data[32..40].to_vec(),
            logfile_record_count: data[40],
            issuer_data_length,
            last_transaction_trp: int_be(&data[42..46]),
            last_transaction: Transaction::parse(&data[46..62]),
            issuer_specific_data: data[62..issuer_end].to_vec(),
            last_transaction_debit_options: data.get(issuer_end).copied().unwrap_or_default(),
        })
    }

    pub fn info(&self) -> Vec<ListItem> {
        let date = |date: Option<NaiveDate>| {
            date.map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default()
        };

        vec![
            ListItem::new("CEPAS version", self.version.to_string()),
            ListItem::new("Purse ID", self.id.to_string()),
            ListItem::new("Purse status", self.status.to_string()),
            ListItem::new("Purse balance", self.balance.to_string()),
            ListItem::new("Purse creation date", date(self.creation_date)),
            ListItem::new("Expiry date", date(self.expiry_date)),
            ListItem::new("Autoload amount", self.auto_load_amount.to_string()),
            ListItem::new("CAN", hex_dump(&self.can)),
            ListItem::new("CSN", hex_dump(&self.csn)),
            ListItem::tree(
                "Last transaction information",
                vec![
                    ListItem::new("TRP", self.last_transaction_trp.to_string()),
                    ListItem::new("Credit TRP", self.last_credit_transaction_trp.to_string()),
                    ListItem::new(
                        "Credit header",
                        hex_dump(&self.last_credit_transaction_header),
                    ),
                    ListItem::new(
                        "Debit options",
                        self.last_transaction_debit_options.to_string(),
                    ),
                ],
            ),
            ListItem::tree(
                "Other purse information",
                vec![
                    ListItem::new(
                        "Logfile record count",
                        self.logfile_record_count.to_string(),
                    ),
                    ListItem::new("Issuer data length", self.issuer_data_length.to_string()),
                    ListItem::new("Issuer data", hex_dump(&self.issuer_specific_data)),
                ],
            ),
        ]
    }
}

pub(crate) fn raw_data(
    purses: &BTreeMap<u8, Vec<u8>>,
    histories: &BTreeMap<u8, Vec<u8>>,
) -> Vec<ListItem> {
    purses
        .iter()
        .map(|(id, purse)| ListItem::new(format!("Purse {}", id), hex_dump(purse)))
        .chain(histories.iter().map(|(id, history)| {
            ListItem::new(format!("Purse {} history", id), hex_dump(history))
        }))
        .collect()
}

pub(crate) fn manufacturing_info(purses: &BTreeMap<u8, Vec<u8>>) -> Vec<ListItem> {
    match purses
        .get(&MAIN_PURSE)
        .and_then(|data| Purse::parse(MAIN_PURSE, data))
    {
        Some(purse) => vec![ListItem::tree("Purse information", purse.info())],
        None => vec![ListItem::new("Purse information", "unknown")],
    }
}
