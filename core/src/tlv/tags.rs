use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::info::{hex_dump, ListItem};
use crate::tlv::ber_tlv_iterate;

/// How the value of a known tag is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagContents {
    DumpShort,
    DumpLong,
    Ascii,
    DumpUnknown,
    Hide,
    /// BCD `YYMMDD`, or `YYMM` for an expiry month.
    Date,
}

impl TagContents {
    /// Renders the value, or `None` if it should not be shown.
    pub fn interpret(&self, data: &[u8]) -> Option<String> {
        match self {
            Self::Hide => None,
            Self::DumpShort => Some(hex::encode_upper(data)),
            Self::DumpLong | Self::DumpUnknown => Some(hex_dump(data)),
            Self::Ascii => Some(data.iter().map(|b| *b as char).collect()),
            Self::Date => Some(interpret_date(data).unwrap_or_else(|| hex::encode_upper(data))),
        }
    }
}

/// A human-readable name for a tag, with how to show its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagDesc {
    pub name: &'static str,
    pub contents: TagContents,
}

impl TagDesc {
    pub const fn new(name: &'static str, contents: TagContents) -> Self {
        Self { name, contents }
    }

    fn list_item(&self, data: &[u8]) -> Option<ListItem> {
        if data.is_empty() && self.contents != TagContents::DumpLong {
            return None;
        }

        self.contents
            .interpret(data)
            .map(|value| ListItem::new(self.name, value))
    }
}

fn bcd(b: u8) -> Option<u32> {
    let (high, low) = (b >> 4, b & 0x0F);
    match high < 10 && low < 10 {
        true => Some((high * 10 + low) as u32),
        _ => None,
    }
}

fn adjust_year(yy: u32) -> i32 {
    match yy {
        0..=79 => 2000 + yy as i32,
        _ => 1900 + yy as i32,
    }
}

fn interpret_date(data: &[u8]) -> Option<String> {
    match data {
        [yy, mm, dd] => {
            let date = NaiveDate::from_ymd_opt(adjust_year(bcd(*yy)?), bcd(*mm)?, bcd(*dd)?)?;
            Some(date.format("%Y-%m-%d").to_string())
        }
        [yy, mm] => {
            let date = NaiveDate::from_ymd_opt(adjust_year(bcd(*yy)?), bcd(*mm)?, 1)?;
            Some(date.format("%-m/%Y").to_string())
        }
        _ => None,
    }
}

fn lookup<'t>(tags: &'t [(&str, TagDesc)], name: &str) -> Option<&'t TagDesc> {
    tags.iter().find(|(tag, _)| *tag == name).map(|(_, desc)| desc)
}

/// Builds a flat list of the objects, naming them with the table. Unknown tags are dropped
/// unless `include_unknown` is set.
pub fn info_ber_tlv_with_tags(
    buf: &[u8],
    tags: &[(&str, TagDesc)],
    include_unknown: bool,
) -> Vec<ListItem> {
    ber_tlv_iterate(buf)
        .filter_map(|object| {
            let name = object.tag_name();
            match lookup(tags, &name) {
                Some(desc) => desc.list_item(object.data),
                None if include_unknown => Some(ListItem::new(name, hex_dump(object.data))),
                None => None,
            }
        })
        .collect()
}

/// Like [info_ber_tlv_with_tags] including unknown tags, also returning the unknown ones.
pub fn info_ber_tlv_with_unknowns(
    buf: &[u8],
    tags: &[(&str, TagDesc)],
) -> (Vec<ListItem>, BTreeSet<String>) {
    let mut unknown = BTreeSet::new();
    let items = ber_tlv_iterate(buf)
        .filter_map(|object| {
            let name = object.tag_name();
            match lookup(tags, &name) {
                Some(desc) => desc.list_item(object.data),
                None => {
                    let item = ListItem::new(name.clone(), hex_dump(object.data));
                    unknown.insert(name);
                    Some(item)
                }
            }
        })
        .collect();

    (items, unknown)
}
