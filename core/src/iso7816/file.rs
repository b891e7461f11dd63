use std::collections::BTreeMap;

/// Everything read from a single EF.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct File {
    /// Body returned by READ BINARY, if the file has one.
    pub binary_data: Option<Vec<u8>>,

    /// Records keyed by their number, starting at 1.
    pub records: BTreeMap<u8, Vec<u8>>,

    /// FCI returned when the file was selected by path.
    pub fci: Option<Vec<u8>>,
}

impl File {
    pub fn record(&self, index: u8) -> Option<&[u8]> {
        self.records.get(&index).map(Vec::as_slice)
    }

    /// Records in ascending order of their number.
    pub fn record_list(&self) -> Vec<&[u8]> {
        self.records.values().map(Vec::as_slice).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.binary_data.is_none() && self.records.is_empty()
    }
}
