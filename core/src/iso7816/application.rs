use std::collections::BTreeMap;

use crate::ap::{calypso, cepas, china, emv, ksx6924};
use crate::info::{hex_dump, ListItem};
use crate::iso7816::{ApplicationCapsule, File, Selector};
use crate::tlv::info_with_raw;

/// What was read from an application beyond its files, depending on the kind of the card.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(rename_all = "kebab-case")
)]
pub enum ApplicationKind {
    Calypso,
    Cepas {
        purses: BTreeMap<u8, Vec<u8>>,
        histories: BTreeMap<u8, Vec<u8>>,
    },
    #[cfg_attr(feature = "serde", serde(alias = "tmoney"))]
    Ksx6924 {
        balance: Vec<u8>,
        extra_records: Vec<Vec<u8>>,
    },
    China {
        balances: BTreeMap<u8, Vec<u8>>,
    },
    EmvAnchor,
    EmvMain {
        gpo_response: Option<Vec<u8>>,
        data_responses: BTreeMap<String, Vec<u8>>,
    },
}

impl ApplicationKind {
    /// Stable identifier of the kind, as used when the application is persisted.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Calypso => "calypso",
            Self::Cepas { .. } => "cepas",
            Self::Ksx6924 { .. } => "ksx6924",
            Self::China { .. } => "china",
            Self::EmvAnchor => "emv-anchor",
            Self::EmvMain { .. } => "emv-main",
        }
    }
}

/// An application read from the card.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Application {
    pub capsule: ApplicationCapsule,
    pub kind: ApplicationKind,
}

impl Application {
    pub fn new(capsule: impl Into<ApplicationCapsule>, kind: ApplicationKind) -> Self {
        Self {
            capsule: capsule.into(),
            kind,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn files(&self) -> &BTreeMap<Selector, File> {
        self.capsule.files()
    }

    pub fn sfi_files(&self) -> &BTreeMap<u8, File> {
        self.capsule.sfi_files()
    }

    pub fn app_name(&self) -> Option<&[u8]> {
        self.capsule.app_name()
    }

    pub fn app_fci(&self) -> Option<&[u8]> {
        self.capsule.app_fci()
    }

    pub fn get_file(&self, selector: &Selector) -> Option<&File> {
        self.capsule.get_file(selector)
    }

    pub fn get_sfi_file(&self, sfi: u8) -> Option<&File> {
        self.capsule.get_sfi_file(sfi)
    }

    pub fn path_exists(&self, selector: &Selector) -> bool {
        self.capsule.path_exists(selector)
    }

    pub fn proprietary_ber_tlv(&self) -> Option<&[u8]> {
        self.capsule.proprietary_ber_tlv()
    }

    /// A human name for the file at the path, if the kind knows it.
    pub fn name_file(&self, selector: &Selector) -> Option<&'static str> {
        match self.kind {
            ApplicationKind::Calypso => calypso::name_file(selector),
            _ => None,
        }
    }

    pub fn name_sfi_file(&self, sfi: u8) -> Option<&'static str> {
        match self.kind {
            ApplicationKind::Calypso => calypso::name_sfi_file(sfi),
            _ => None,
        }
    }

    /// The application name as text: ASCII when it is printable, hex otherwise.
    pub fn display_name(&self) -> String {
        match self.app_name() {
            Some(name) if !name.is_empty() && name.iter().all(|b| (0x20..0x7F).contains(b)) => {
                String::from_utf8_lossy(name).into_owned()
            }
            Some(name) if !name.is_empty() => hex::encode(name),
            _ => "unspecified".to_owned(),
        }
    }

    /// Everything captured from the application, as a display tree.
    pub fn raw_data(&self) -> ListItem {
        let mut children = Vec::new();

        if let Some(fci) = self.app_fci() {
            children.push(ListItem::tree("FCI", info_with_raw(fci)));
        }

        for (selector, file) in self.files() {
            let title = match self.name_file(selector) {
                Some(name) => format!("{} ({})", selector, name),
                None => selector.to_string(),
            };

            children.push(file_raw_data(title, file));
        }

        for (sfi, file) in self.sfi_files() {
            let title = match self.name_sfi_file(*sfi) {
                Some(name) => format!("SFI {:02x} ({})", sfi, name),
                None => format!("SFI {:02x}", sfi),
            };

            children.push(file_raw_data(title, file));
        }

        children.extend(self.kind_raw_data());

        ListItem::tree(format!("Application: {}", self.display_name()), children)
    }

    /// Serial number, issuer and date of manufacture, where the kind exposes them.
    pub fn manufacturing_info(&self) -> Vec<ListItem> {
        match &self.kind {
            ApplicationKind::Calypso => calypso::manufacturing_info(self),
            ApplicationKind::Cepas { purses, .. } => cepas::manufacturing_info(purses),
            _ => Vec::new(),
        }
    }

    fn kind_raw_data(&self) -> Vec<ListItem> {
        match &self.kind {
            ApplicationKind::Calypso => calypso::raw_data(self),
            ApplicationKind::Cepas { purses, histories } => cepas::raw_data(purses, histories),
            ApplicationKind::Ksx6924 {
                balance,
                extra_records,
            } => ksx6924::raw_data(balance, extra_records),
            ApplicationKind::China { balances } => china::raw_data(balances),
            ApplicationKind::EmvAnchor => Vec::new(),
            ApplicationKind::EmvMain {
                gpo_response,
                data_responses,
            } => emv::raw_data(gpo_response.as_deref(), data_responses),
        }
    }
}

fn file_raw_data(title: String, file: &File) -> ListItem {
    let mut children = Vec::new();

    if let Some(fci) = &file.fci {
        children.push(ListItem::tree("FCI", info_with_raw(fci)));
    }

    if let Some(data) = &file.binary_data {
        children.push(ListItem::new("Binary", hex_dump(data)));
    }

    for (index, record) in &file.records {
        children.push(ListItem::new(format!("Record {}", index), hex_dump(record)));
    }

    ListItem::tree(title, children)
}
