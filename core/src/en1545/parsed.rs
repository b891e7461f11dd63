use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::ops::{Add, AddAssign};

use chrono::TimeZone;

use crate::en1545::time::{self, Timestamp};
use crate::en1545::{get_bits_from_buffer, get_bits_from_buffer_le_bits, suffix, BitReader, Field};
use crate::info::ListItem;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(untagged)
)]
pub enum En1545Value {
    Int(u32),
    String(String),
}

impl Display for En1545Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(value) => write!(f, "0x{:x}", value),
            Self::String(value) => f.write_str(value),
        }
    }
}

/// Values read with a schema, keyed by their path and name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(transparent)
)]
pub struct En1545Parsed {
    map: BTreeMap<String, En1545Value>,
}

fn make_full_name(name: &str, path: &str) -> String {
    match path.is_empty() {
        true => name.to_string(),
        _ => format!("{}/{}", path, name),
    }
}

fn base_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

impl En1545Parsed {
    pub fn new() -> Self {
        Default::default()
    }

    /// Parses the buffer from its first bit, reading bits most significant first.
    pub fn parse(data: &[u8], field: &Field) -> Self {
        let mut parsed = Self::new();
        parsed.append(data, field);

        parsed
    }

    /// Parses the buffer from its first bit, reading bits least significant first.
    pub fn parse_le_bits(data: &[u8], field: &Field) -> Self {
        let mut parsed = Self::new();
        parsed.append_le_bits(data, field);

        parsed
    }

    pub fn append(&mut self, data: &[u8], field: &Field) -> &mut Self {
        self.append_with(data, 0, field, get_bits_from_buffer)
    }

    pub fn append_at(&mut self, data: &[u8], off: usize, field: &Field) -> &mut Self {
        self.append_with(data, off, field, get_bits_from_buffer)
    }

    pub fn append_le_bits(&mut self, data: &[u8], field: &Field) -> &mut Self {
        self.append_with(data, 0, field, get_bits_from_buffer_le_bits)
    }

    pub fn append_le_bits_at(&mut self, data: &[u8], off: usize, field: &Field) -> &mut Self {
        self.append_with(data, off, field, get_bits_from_buffer_le_bits)
    }

    fn append_with(
        &mut self,
        data: &[u8],
        off: usize,
        field: &Field,
        bits: BitReader,
    ) -> &mut Self {
        field.parse_field(data, off, "", self, bits);
        self
    }

    pub fn insert_int(&mut self, name: &str, path: &str, value: u32) {
        self.map
            .insert(make_full_name(name, path), En1545Value::Int(value));
    }

    pub fn insert_string(&mut self, name: &str, path: &str, value: impl Into<String>) {
        self.map.insert(
            make_full_name(name, path),
            En1545Value::String(value.into()),
        );
    }

    /// Looks a value up by its full key, such as `"/0/EventDate"`.
    pub fn get(&self, key: &str) -> Option<&En1545Value> {
        self.map.get(key)
    }

    pub fn get_int(&self, name: &str, path: &str) -> Option<u32> {
        match self.map.get(&make_full_name(name, path)) {
            Some(En1545Value::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn get_int_or_zero(&self, name: &str, path: &str) -> u32 {
        self.get_int(name, path).unwrap_or(0)
    }

    /// Looks an integer up below the repetitions, `&[1, 0]` meaning path `"/1/0"`.
    pub fn get_int_indexed(&self, name: &str, indices: &[usize]) -> Option<u32> {
        let path: String = indices.iter().map(|i| format!("/{}", i)).collect();

        self.get_int(name, &path)
    }

    pub fn get_string(&self, name: &str, path: &str) -> Option<&str> {
        match self.map.get(&make_full_name(name, path)) {
            Some(En1545Value::String(value)) => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str, path: &str) -> bool {
        self.map.contains_key(&make_full_name(name, path))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &En1545Value)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Reconstructs the timestamp stored under the base name, trying the date and time
    /// conventions in a fixed order. The first convention present wins, even if its value
    /// turns out to be empty.
    pub fn get_time_stamp<Tz: TimeZone>(&self, name: &str, tz: &Tz) -> Option<Timestamp<Tz>> {
        let int = |suffix: &str| self.get_int(&format!("{}{}", name, suffix), "");

        if let Some(seconds) = int(suffix::DATE_TIME) {
            return time::parse_time_sec(seconds, tz).map(Timestamp::Full);
        }

        if let Some(seconds) = int(suffix::DATE_TIME_LOCAL) {
            return time::parse_time_sec_local(seconds, tz).map(Timestamp::Full);
        }

        let date = int(suffix::DATE);
        let date_packed = int(suffix::DATE_PACKED);

        if let (Some(days), Some(minutes)) = (date, int(suffix::TIME)) {
            return time::parse_time(days, minutes, tz).map(Timestamp::Full);
        }

        if let (Some(days), Some(minutes)) = (date, int(suffix::TIME_LOCAL)) {
            return time::parse_time_local(days, minutes, tz).map(Timestamp::Full);
        }

        let time_packed16 = int(suffix::TIME_PACKED16);

        if let (Some(date), Some(time)) = (date_packed, time_packed16) {
            return time::parse_date_time_packed16_local(date, time, tz).map(Timestamp::Full);
        }

        if let (Some(days), Some(time)) = (date, time_packed16) {
            return time::parse_time_packed16(days, time, tz).map(Timestamp::Full);
        }

        if let (Some(date), Some(time)) = (date_packed, int(suffix::TIME_PACKED11_LOCAL)) {
            return time::parse_date_time_packed11_local(date, time, tz).map(Timestamp::Full);
        }

        if let Some(date) = date_packed {
            return time::parse_date_packed(date).map(Timestamp::Day);
        }

        if let Some(days) = date {
            return time::parse_date(days).map(Timestamp::Day);
        }

        int(suffix::DATE_BCD)
            .and_then(time::parse_date_bcd)
            .map(Timestamp::Day)
    }

    /// Formats the timestamp under the base name. Falls back to a bare `HH:MM` when only a
    /// time of day was stored.
    pub fn get_time_stamp_string<Tz>(&self, name: &str, tz: &Tz) -> Option<String>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        if let Some(timestamp) = self.get_time_stamp(name, tz) {
            return Some(timestamp.format());
        }

        let minutes = self
            .get_int(&format!("{}{}", name, suffix::TIME), "")
            .or_else(|| self.get_int(&format!("{}{}", name, suffix::TIME_LOCAL), ""))?;

        Some(format!("{:02}:{:02}", minutes / 60, minutes % 60))
    }

    /// Lists every value in key order, except those whose name is in `skip`.
    pub fn get_info(&self, skip: &[&str]) -> Vec<ListItem> {
        self.map
            .iter()
            .filter(|(key, _)| !skip.contains(&base_name(key)))
            .map(|(key, value)| ListItem::new(key.as_str(), value.to_string()))
            .collect()
    }
}

impl Add for En1545Parsed {
    type Output = Self;

    /// Merges the maps. Values of the right-hand side win.
    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl AddAssign for En1545Parsed {
    fn add_assign(&mut self, rhs: Self) {
        self.map.extend(rhs.map);
    }
}

impl Display for En1545Parsed {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("[")?;
        for (i, (key, value)) in self.map.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }

            match value {
                En1545Value::Int(_) => write!(f, "{} = {}", key, value)?,
                En1545Value::String(_) => write!(f, "{} = \"{}\"", key, value)?,
            }
        }

        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    #[test]
    fn test_container() {
        let field = Field::container(vec![Field::integer("A", 8), Field::integer("B", 8)]);
        let parsed = En1545Parsed::parse(&[0x12, 0x34, 0xFF, 0xFF], &field);

        assert_eq!(2, parsed.len());
        assert_eq!(Some(0x12), parsed.get_int("A", ""));
        assert_eq!(Some(0x34), parsed.get_int("B", ""));
        assert_eq!(None, parsed.get_string("A", ""));
    }

    #[test]
    fn test_append_le_bits() {
        let field = Field::container(vec![Field::integer("Low", 4), Field::integer("High", 12)]);
        let parsed = En1545Parsed::parse_le_bits(&[0x21, 0x43], &field);

        assert_eq!(Some(0x1), parsed.get_int("Low", ""));
        assert_eq!(Some(0x432), parsed.get_int("High", ""));

        let mut parsed = En1545Parsed::new();
        parsed
            .append_at(&[0x0F, 0xF0], 4, &Field::integer("Mid", 8))
            .append_le_bits_at(&[0x0F], 4, &Field::integer("Top", 4));
        assert_eq!(Some(0xFF), parsed.get_int("Mid", ""));
        assert_eq!(Some(0x0), parsed.get_int("Top", ""));
    }

    #[test]
    fn test_merge_prefers_right_hand_side() {
        let mut left = En1545Parsed::new();
        left.insert_int("A", "", 1);
        left.insert_int("B", "", 2);

        let mut right = En1545Parsed::new();
        right.insert_int("B", "", 3);
        right.insert_string("C", "/0", "X");

        let merged = left + right;
        assert_eq!(Some(1), merged.get_int("A", ""));
        assert_eq!(Some(3), merged.get_int("B", ""));
        assert_eq!(Some("X"), merged.get_string("C", "/0"));
    }

    #[test]
    fn test_info_and_display() {
        let mut parsed = En1545Parsed::new();
        parsed.insert_int("Network", "", 0x250);
        parsed.insert_string("Name", "", "AB");
        parsed.insert_int("Unknown", "/1", 7);

        assert_eq!(
            vec![
                ListItem::new("/1/Unknown", "0x7"),
                ListItem::new("Name", "AB"),
            ],
            parsed.get_info(&["Network"])
        );
        assert_eq!(
            "[/1/Unknown = 0x7, Name = \"AB\", Network = 0x250]",
            parsed.to_string()
        );
    }

    #[test]
    fn test_time_stamp_prefers_packed_date() {
        let mut parsed = En1545Parsed::new();
        parsed.insert_int("ContractSaleDatePacked", "", (19 << 9) | (3 << 5) | 14);
        parsed.insert_int("ContractSaleDate", "", 31);

        assert_eq!(
            Some(Timestamp::Day(NaiveDate::from_ymd_opt(2019, 3, 14).unwrap())),
            parsed.get_time_stamp("ContractSale", &Utc)
        );
    }

    #[test]
    fn test_time_stamp_priority() {
        let mut parsed = En1545Parsed::new();
        parsed.insert_int("EventDate", "", 1);
        assert_eq!(
            Some(Timestamp::Day(NaiveDate::from_ymd_opt(1997, 1, 2).unwrap())),
            parsed.get_time_stamp("Event", &Utc)
        );

        parsed.insert_int("EventTime", "", 90);
        assert_eq!(
            Utc.with_ymd_and_hms(1997, 1, 2, 1, 30, 0).single().map(Timestamp::Full),
            parsed.get_time_stamp("Event", &Utc)
        );

        parsed.insert_int("EventDateTime", "", 60);
        assert_eq!(
            Utc.with_ymd_and_hms(1997, 1, 1, 0, 1, 0).single().map(Timestamp::Full),
            parsed.get_time_stamp("Event", &Utc)
        );

        // Present but zero: the date time still wins, and means no timestamp.
        parsed.insert_int("EventDateTime", "", 0);
        assert_eq!(None, parsed.get_time_stamp("Event", &Utc));

        assert_eq!(None, parsed.get_time_stamp("Other", &Utc));
    }

    #[test]
    fn test_time_stamp_string() {
        let mut parsed = En1545Parsed::new();
        parsed.insert_int("EventTimeLocal", "", 125);
        parsed.insert_int("SaleDateBCD", "", 0x2020_0101);

        assert_eq!(
            Some("02:05".to_string()),
            parsed.get_time_stamp_string("Event", &Utc)
        );
        assert_eq!(
            Some("2020-01-01".to_string()),
            parsed.get_time_stamp_string("Sale", &Utc)
        );
        assert_eq!(None, parsed.get_time_stamp_string("Other", &Utc));
    }
}
