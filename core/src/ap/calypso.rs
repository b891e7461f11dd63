//! Calypso: contactless ticketing cards used across Europe (Navigo, MOBIB, Lisboa Viva and more).
//!
//! Calypso cards keep their data in well-known files below the ticketing DFs. Most of them are
//! also reachable through a short file identifier.

use chrono::{Duration, NaiveDate};

use crate::ap::factory;
use crate::en1545::{En1545Parsed, Field};
use crate::feedback::Feedback;
use crate::info::ListItem;
use crate::iso7816::{
    Application, ApplicationKind, File, MutableCapsule, Protocol, Result, Selector, MAX_SFI,
};
use crate::trace::{debug, warning};

const RECORD_LEN: u8 = 0x1D;

factory!(&["calypso"], &[b"1TIC.ICA", b"3MTR.ICA"], true);

/// A file of the Calypso file structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalypsoFile {
    pub name: &'static str,
    pub sfi: Option<u8>,
    pub path: &'static [u16],
}

impl CalypsoFile {
    const fn new(name: &'static str, sfi: Option<u8>, path: &'static [u16]) -> Self {
        Self { name, sfi, path }
    }

    pub fn selector(&self) -> Selector {
        Selector::by_ids(self.path)
    }
}

pub const TICKETING_ENVIRONMENT: CalypsoFile =
    CalypsoFile::new("TICKETING_ENVIRONMENT", Some(0x07), &[0x2000, 0x2001]);
pub const ICC: CalypsoFile = CalypsoFile::new("ICC", Some(0x02), &[0x0002]);
pub const TICKETING_CONTRACT_LIST: CalypsoFile =
    CalypsoFile::new("TICKETING_CONTRACT_LIST", Some(0x1E), &[0x2000, 0x2050]);

/// Every known file, in the order they are dumped.
pub const FILES: [CalypsoFile; 48] = [
    TICKETING_ENVIRONMENT,
    CalypsoFile::new("AID", Some(0x04), &[0x3F04]),
    ICC,
    CalypsoFile::new("ID", Some(0x03), &[0x0003]),
    CalypsoFile::new("HOLDER_EXTENDED", None, &[0x3F1C]),
    CalypsoFile::new("DISPLAY", Some(0x05), &[0x2F10]),
    CalypsoFile::new("TICKETING_HOLDER", None, &[0x2000, 0x2002]),
    CalypsoFile::new("TICKETING_AID", None, &[0x2000, 0x2004]),
    CalypsoFile::new("TICKETING_LOG", Some(0x08), &[0x2000, 0x2010]),
    CalypsoFile::new("TICKETING_CONTRACTS_1", Some(0x09), &[0x2000, 0x2020]),
    CalypsoFile::new("TICKETING_CONTRACTS_2", Some(0x06), &[0x2000, 0x2030]),
    CalypsoFile::new("TICKETING_COUNTERS_1", Some(0x0A), &[0x2000, 0x202A]),
    CalypsoFile::new("TICKETING_COUNTERS_2", Some(0x0B), &[0x2000, 0x202B]),
    CalypsoFile::new("TICKETING_COUNTERS_3", Some(0x0C), &[0x2000, 0x202C]),
    CalypsoFile::new("TICKETING_COUNTERS_4", Some(0x0D), &[0x2000, 0x202D]),
    CalypsoFile::new("TICKETING_COUNTERS_5", None, &[0x2000, 0x202E]),
    CalypsoFile::new("TICKETING_COUNTERS_6", None, &[0x2000, 0x202F]),
    CalypsoFile::new("TICKETING_SPECIAL_EVENTS", Some(0x1D), &[0x2000, 0x2040]),
    TICKETING_CONTRACT_LIST,
    CalypsoFile::new("TICKETING_COUNTERS_7", None, &[0x2000, 0x2060]),
    CalypsoFile::new("TICKETING_COUNTERS_8", None, &[0x2000, 0x2062]),
    CalypsoFile::new("TICKETING_COUNTERS_9", Some(0x19), &[0x2000, 0x2069]),
    CalypsoFile::new("TICKETING_COUNTERS_10", Some(0x10), &[0x2000, 0x206A]),
    CalypsoFile::new("TICKETING_FREE", Some(0x01), &[0x2000, 0x20F0]),
    CalypsoFile::new("MPP_PUBLIC_PARAMETERS", Some(0x17), &[0x3100, 0x3102]),
    CalypsoFile::new("MPP_AID", None, &[0x3100, 0x3104]),
    CalypsoFile::new("MPP_LOG", None, &[0x3100, 0x3115]),
    CalypsoFile::new("MPP_CONTRACTS", None, &[0x3100, 0x3120]),
    CalypsoFile::new("MPP_COUNTERS_1", None, &[0x3100, 0x3113]),
    CalypsoFile::new("MPP_COUNTERS_2", None, &[0x3100, 0x3123]),
    CalypsoFile::new("MPP_COUNTERS_3", None, &[0x3100, 0x3133]),
    CalypsoFile::new("MPP_MISCELLANEOUS", None, &[0x3100, 0x3150]),
    CalypsoFile::new("MPP_COUNTERS_4", None, &[0x3100, 0x3169]),
    CalypsoFile::new("MPP_FREE", None, &[0x3100, 0x31F0]),
    CalypsoFile::new("RT2_ENVIRONMENT", None, &[0x2100, 0x2101]),
    CalypsoFile::new("RT2_AID", None, &[0x2100, 0x2104]),
    CalypsoFile::new("RT2_LOG", None, &[0x2100, 0x2110]),
    CalypsoFile::new("RT2_CONTRACTS", None, &[0x2100, 0x2120]),
    CalypsoFile::new("RT2_SPECIAL_EVENTS", None, &[0x2100, 0x2140]),
    CalypsoFile::new("RT2_CONTRACT_LIST", None, &[0x2100, 0x2150]),
    CalypsoFile::new("RT2_COUNTERS", None, &[0x2100, 0x2169]),
    CalypsoFile::new("RT2_FREE", None, &[0x2100, 0x21F0]),
    CalypsoFile::new("EP_AID", None, &[0x1000, 0x1004]),
    CalypsoFile::new("EP_LOAD_LOG", Some(0x14), &[0x1000, 0x1014]),
    CalypsoFile::new("EP_PURCHASE_LOG", Some(0x15), &[0x1000, 0x1015]),
    CalypsoFile::new("ETICKET", None, &[0x8000, 0x8004]),
    CalypsoFile::new("ETICKET_EVENT_LOGS", None, &[0x8000, 0x8010]),
    CalypsoFile::new("ETICKET_PRESELECTION", None, &[0x8000, 0x8030]),
];

fn dump(
    protocol: &Protocol,
    mut capsule: MutableCapsule,
    feedback: &dyn Feedback,
) -> Result<Vec<Application>> {
    let total = (FILES.len() + MAX_SFI as usize) as u32;

    feedback.update_status_text("Reading Calypso card");
    feedback.update_progress_bar(0, total);

    let mut counter = 0;
    for sfi in 1..=MAX_SFI {
        feedback.update_progress_bar(counter, total);
        counter += 1;

        capsule.dump_file_sfi(protocol, sfi, 0)?;
    }

    for file in FILES.iter() {
        feedback.update_progress_bar(counter, total);
        counter += 1;

        match capsule.dump_file(protocol, &file.selector(), RECORD_LEN) {
            Ok(_) => {}
            Err(e) if e.is_card_lost() => {
                // The next exchange of the scan reports the lost card again.
                warning!("Card lost while reading {}", file.name);
                break;
            }
            Err(e) => debug!("Couldn't dump {}: {}", file.name, e),
        }
    }

    Ok(vec![Application::new(capsule, ApplicationKind::Calypso)])
}

pub(crate) fn name_file(selector: &Selector) -> Option<&'static str> {
    FILES
        .iter()
        .find(|file| file.selector() == *selector)
        .map(|file| file.name)
}

pub(crate) fn name_sfi_file(sfi: u8) -> Option<&'static str> {
    FILES
        .iter()
        .find(|file| file.sfi == Some(sfi))
        .map(|file| file.name)
}

/// Gets the file by its path, falling back to its short file identifier.
pub fn get_file<'a>(application: &'a Application, file: &CalypsoFile) -> Option<&'a File> {
    application.get_file(&file.selector()).or_else(|| {
        file.sfi
            .filter(|sfi| *sfi <= MAX_SFI)
            .and_then(|sfi| application.get_sfi_file(sfi))
    })
}

/// The first record of the ticketing environment.
pub fn ticket_env(application: &Application) -> Option<&[u8]> {
    get_file(application, &TICKETING_ENVIRONMENT)?.record(1)
}

/// The Intercode layout of the ticketing environment.
pub fn ticket_env_fields() -> Field {
    Field::container(vec![
        Field::integer("EnvVersionNumber", 6),
        Field::bitmap(vec![
            Field::integer("EnvNetworkId", 24),
            Field::integer("EnvApplicationIssuerId", 8),
            Field::date("EnvApplicationValidityEnd"),
            Field::integer("EnvPayMethod", 11),
            Field::integer("EnvAuthenticator", 16),
            Field::integer("EnvSelectList", 32),
            Field::container(vec![
                Field::integer("EnvCardStatus", 1),
                Field::integer("EnvExtra", 0),
            ]),
        ]),
    ])
}

/// The Intercode layout of the contract list.
pub fn contract_list_fields() -> Field {
    Field::repeat(
        4,
        Field::bitmap(vec![
            Field::integer("ContractsNetworkId", 24),
            Field::integer("ContractsTariff", 16),
            Field::integer("ContractsPointer", 5),
        ]),
    )
}

pub fn parse_ticket_env(application: &Application) -> Option<En1545Parsed> {
    ticket_env(application).map(|data| En1545Parsed::parse(data, &ticket_env_fields()))
}

pub fn parse_contract_list(application: &Application) -> Option<En1545Parsed> {
    get_file(application, &TICKETING_CONTRACT_LIST)?
        .record(1)
        .map(|data| En1545Parsed::parse(data, &contract_list_fields()))
}

pub(crate) fn raw_data(application: &Application) -> Vec<ListItem> {
    let mut items = Vec::new();

    if let Some(env) = parse_ticket_env(application) {
        items.push(ListItem::tree("Ticketing environment", env.get_info(&[])));
    }

    if let Some(contracts) = parse_contract_list(application) {
        items.push(ListItem::tree("Contract list", contracts.get_info(&[])));
    }

    items
}

/// Serial number, country, manufacturer and manufacture date from the ICC file.
pub(crate) fn manufacturing_info(application: &Application) -> Vec<ListItem> {
    let data = match get_file(application, &ICC).and_then(|file| file.record(1)) {
        Some(data) if data.len() >= 27 => data,
        _ => return Vec::new(),
    };

    // The country is an ISO 3166-1 numeric code written in BCD.
    let country = hex::encode(&data[20..22]).parse::<u16>().unwrap_or(0);
    let days = u16::from_be_bytes([data[25], data[26]]);
    let manufacture_date = NaiveDate::from_ymd_opt(1990, 1, 1)
        .and_then(|epoch| epoch.checked_add_signed(Duration::days(days as i64)))
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_default();

    vec![ListItem::tree(
        "Calypso",
        vec![
            ListItem::new("Serial number", hex::encode(&data[12..20])),
            ListItem::new("Manufacture country", country.to_string()),
            ListItem::new("Manufacturer", format!("0x{:02x}", data[22])),
            ListItem::new("Manufacture date", manufacture_date),
        ],
    )]
}
