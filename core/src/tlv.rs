//! BER-TLV decoding for selection responses and file contents.

mod reader;
mod tags;

use std::iter::FusedIterator;

use crate::info::{hex_dump, ListItem};
use crate::trace::debug;
use reader::{Length, Reader};

pub use tags::{info_ber_tlv_with_tags, info_ber_tlv_with_unknowns, TagContents, TagDesc};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Unexpected end of data")]
    UnexpectedEnd,

    #[error("Indefinite length without the end-of-contents octets")]
    IndefiniteWithoutTerminator,

    #[error("Length does not fit")]
    LengthTooLarge,
}

pub type Result<T> = std::result::Result<T, Error>;

/// A decoded data object, borrowing from the buffer it was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    /// Tag octets.
    pub id: &'a [u8],

    /// Tag and length octets.
    pub header: &'a [u8],

    /// Value octets. For indefinite lengths, the end-of-contents octets are excluded.
    pub data: &'a [u8],

    encoded: &'a [u8],
}

impl<'a> Tlv<'a> {
    /// Header and data, as they appear in the buffer.
    pub fn with_header(&self) -> &'a [u8] {
        self.encoded
    }

    /// Whether the value is itself a sequence of data objects.
    pub fn is_constructed(&self) -> bool {
        self.id[0] & 0x20 != 0
    }

    /// Tag rendered as uppercase hex, as used for lookups.
    pub fn tag_name(&self) -> String {
        hex::encode_upper(self.id)
    }
}

/// A lazy sequence of the data objects in a buffer.
///
/// Leading `00` octets, empty objects of tag `00` and an all-`00` tail are padding and skipped.
/// The sequence ends at the first decoding error.
#[derive(Debug, Clone)]
pub struct BerTlvIter<'a> {
    reader: Reader<'a>,
}

impl<'a> Iterator for BerTlvIter<'a> {
    type Item = Tlv<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_object() {
            Ok(object) => object,
            Err(e) => {
                debug!("Stopped decoding BER-TLV: {}", e);
                self.reader.finish();

                None
            }
        }
    }
}

impl FusedIterator for BerTlvIter<'_> {}

pub fn ber_tlv_iterate(buf: &[u8]) -> BerTlvIter<'_> {
    BerTlvIter {
        reader: Reader::new(buf),
    }
}

/// Decodes every object in the buffer, failing instead of stopping early.
pub fn ber_tlv_decode(buf: &[u8]) -> Result<Vec<Tlv<'_>>> {
    let mut reader = Reader::new(buf);
    let mut objects = Vec::new();
    while let Some(object) = reader.read_object()? {
        objects.push(object);
    }

    Ok(objects)
}

/// Finds the first object with the tag, searching constructed objects depth-first.
pub fn find_ber_tlv<'a>(buf: &'a [u8], target: &[u8], keep_header: bool) -> Option<&'a [u8]> {
    ber_tlv_iterate(buf).find_map(|object| {
        if object.id == target {
            Some(match keep_header {
                true => object.with_header(),
                _ => object.data,
            })
        } else if object.is_constructed() {
            find_ber_tlv(object.data, target, keep_header)
        } else {
            None
        }
    })
}

/// Finds every object with the tag. Matches are not searched further.
pub fn find_repeated_ber_tlv<'a>(buf: &'a [u8], target: &[u8], keep_header: bool) -> Vec<&'a [u8]> {
    let mut found = Vec::new();
    collect_ber_tlv(buf, target, keep_header, &mut found);

    found
}

fn collect_ber_tlv<'a>(buf: &'a [u8], target: &[u8], keep_header: bool, found: &mut Vec<&'a [u8]>) {
    for object in ber_tlv_iterate(buf) {
        if object.id == target {
            found.push(match keep_header {
                true => object.with_header(),
                _ => object.data,
            });
        } else if object.is_constructed() {
            collect_ber_tlv(object.data, target, keep_header, found);
        }
    }
}

/// Strips the tag and length of the first object, returning its value.
pub fn remove_tlv_header(buf: &[u8]) -> Option<&[u8]> {
    ber_tlv_iterate(buf).next().map(|object| object.data)
}

/// Iterates over a data object list (tags and lengths without values), such as a PDOL.
pub fn pdol_iterate(buf: &[u8]) -> impl Iterator<Item = (&[u8], usize)> + '_ {
    let mut reader = Reader::new(buf);

    std::iter::from_fn(move || {
        if reader.is_empty() {
            return None;
        }

        let id = reader.read_tag().ok()?;
        match reader.read_length().ok()? {
            Length::Definite(length) => Some((id, length)),
            Length::Indefinite => None,
        }
    })
    .fuse()
}

/// Builds a display tree of the objects, recursing into constructed ones.
pub fn info_ber_tlv(buf: &[u8]) -> Vec<ListItem> {
    ber_tlv_iterate(buf).map(|object| info_object(&object)).collect()
}

fn info_object(object: &Tlv<'_>) -> ListItem {
    if object.is_constructed() {
        if let Ok(children) = ber_tlv_decode(object.data) {
            return ListItem::tree(
                object.tag_name(),
                children.iter().map(info_object).collect(),
            );
        }
    }

    ListItem::new(object.tag_name(), hex_dump(object.data))
}

/// A raw dump of the buffer, followed by its decoded tree when it is valid BER-TLV.
pub fn info_with_raw(buf: &[u8]) -> Vec<ListItem> {
    let mut items = vec![ListItem::new("RAW", hex_dump(buf))];
    if ber_tlv_decode(buf).is_ok() {
        items.push(ListItem::tree("TLV", info_ber_tlv(buf)));
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triples(buf: &[u8]) -> Vec<(&[u8], &[u8], &[u8])> {
        ber_tlv_iterate(buf)
            .map(|o| (o.id, o.header, o.data))
            .collect()
    }

    #[test]
    fn test_iterate_sequential() {
        let buf = [
            0x84, 0x02, 0xA0, 0x00, //
            0x50, 0x03, 0x56, 0x49, 0x53, //
            0x9F, 0x38, 0x00,
        ];

        assert_eq!(
            vec![
                (&[0x84][..], &[0x84, 0x02][..], &[0xA0, 0x00][..]),
                (&[0x50][..], &[0x50, 0x03][..], &[0x56, 0x49, 0x53][..]),
                (&[0x9F, 0x38][..], &[0x9F, 0x38, 0x00][..], &[][..]),
            ],
            triples(&buf),
        );
    }

    #[test]
    fn test_iterate_padding() {
        assert!(triples(&[0x00; 16]).is_empty());
        assert!(triples(&[]).is_empty());

        let buf = [0x00, 0x00, 0x80, 0x01, 0x01, 0x00, 0x00, 0x81, 0x01, 0x02];
        assert_eq!(
            vec![
                (&[0x80][..], &[0x80, 0x01][..], &[0x01][..]),
                (&[0x81][..], &[0x81, 0x01][..], &[0x02][..]),
            ],
            triples(&buf),
        );
    }

    #[test]
    fn test_iterate_indefinite_length() {
        let buf = [0xA5, 0x80, 0x88, 0x01, 0x02, 0x00, 0x00, 0x50, 0x01, 0x41];
        let objects: Vec<_> = ber_tlv_iterate(&buf).collect();

        assert_eq!(2, objects.len());
        assert_eq!(&[0xA5, 0x80][..], objects[0].header);
        assert_eq!(&[0x88, 0x01, 0x02][..], objects[0].data);
        assert_eq!(&[0x50][..], objects[1].id);
    }

    #[test]
    fn test_iterate_indefinite_length_without_terminator() {
        let buf = [0xA5, 0x80, 0x88, 0x01, 0x02];

        assert!(triples(&buf).is_empty());
        assert_eq!(
            Err(Error::IndefiniteWithoutTerminator),
            ber_tlv_decode(&buf)
        );
    }

    #[test]
    fn test_iterate_stops_at_truncation() {
        let buf = [0x84, 0x01, 0x01, 0x50, 0x05, 0x41];

        assert_eq!(1, triples(&buf).len());
        assert_eq!(Err(Error::UnexpectedEnd), ber_tlv_decode(&buf));
    }

    const FCI: [u8; 30] = [
        0x6F, 0x1C, //
        0x84, 0x0E, 0x31, 0x50, 0x41, 0x59, 0x2E, 0x53, 0x59, 0x53, 0x2E, 0x44, 0x44, 0x46,
        0x30, 0x31, //
        0xA5, 0x0A, //
        0x88, 0x01, 0x01, //
        0x5F, 0x2D, 0x02, 0x65, 0x6E, //
        0x9F, 0x11,
    ];

    #[test]
    fn test_find_ber_tlv_descends() {
        // The last object is truncated on purpose; everything before it is still found.
        assert_eq!(Some(&[0x01][..]), find_ber_tlv(&FCI, &[0x88], false));
        assert_eq!(
            Some(&[0x5F, 0x2D, 0x02, 0x65, 0x6E][..]),
            find_ber_tlv(&FCI, &[0x5F, 0x2D], true)
        );
        assert_eq!(Some(&FCI[18..]), find_ber_tlv(&FCI, &[0xA5], true));
        assert_eq!(None, find_ber_tlv(&FCI, &[0x50], false));
    }

    #[test]
    fn test_find_repeated_ber_tlv() {
        let buf = [
            0x70, 0x0C, //
            0x61, 0x04, 0x4F, 0x02, 0xA0, 0x01, //
            0x61, 0x04, 0x4F, 0x02, 0xA0, 0x02,
        ];

        assert_eq!(
            vec![&[0xA0, 0x01][..], &[0xA0, 0x02][..]],
            find_repeated_ber_tlv(&buf, &[0x4F], false)
        );
        assert_eq!(
            vec![&buf[2..8], &buf[8..14]],
            find_repeated_ber_tlv(&buf, &[0x61], true)
        );
    }

    #[test]
    fn test_remove_tlv_header() {
        assert_eq!(
            Some(&[0x01, 0x02][..]),
            remove_tlv_header(&[0x85, 0x02, 0x01, 0x02, 0xFF])
        );
        assert_eq!(None, remove_tlv_header(&[]));
    }

    #[test]
    fn test_pdol_iterate() {
        let pdol = [0x9F, 0x66, 0x04, 0x9F, 0x02, 0x06, 0x5F, 0x2A, 0x02, 0x95, 0x05];

        assert_eq!(
            vec![
                (&[0x9F, 0x66][..], 4),
                (&[0x9F, 0x02][..], 6),
                (&[0x5F, 0x2A][..], 2),
                (&[0x95][..], 5),
            ],
            pdol_iterate(&pdol).collect::<Vec<_>>()
        );
        assert_eq!(1, pdol_iterate(&[0x95, 0x05, 0x9F]).count());
    }

    #[test]
    fn test_info_ber_tlv() {
        let buf = [0xA5, 0x05, 0x88, 0x01, 0x01, 0x87, 0x00, 0x50, 0x01, 0x41];
        let items = info_ber_tlv(&buf);

        assert_eq!(2, items.len());
        assert_eq!("A5", items[0].title);
        assert_eq!(None, items[0].value);
        assert_eq!(2, items[0].children.len());
        assert_eq!("88", items[0].children[0].title);
        assert_eq!(Some("01".to_string()), items[0].children[0].value);
        assert_eq!(Some("41".to_string()), items[1].value);
    }

    #[test]
    fn test_info_with_raw() {
        assert_eq!(2, info_with_raw(&[0x50, 0x01, 0x41]).len());
        assert_eq!(1, info_with_raw(&[0x50, 0x05, 0x41]).len());
    }
}
