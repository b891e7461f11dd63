use crate::en1545::{suffix, BitReader, En1545Parsed};
use crate::trace::debug;

/// A node of a bit-field schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// An unsigned integer of `len` bits.
    FixedInteger { name: String, len: usize },

    /// Letters in 5-bit groups, `1` being `A`. `0` and `31` are spaces.
    FixedString { name: String, len: usize },

    /// `len` bits rendered as lowercase hex.
    FixedHex { name: String, len: usize },

    /// One presence bit per field, followed by the optional `infix` and the present fields.
    /// Field `i` is gated by bit `i` counted from the most significant bit, or from the least
    /// significant one when `reversed`.
    Bitmap {
        fields: Vec<Field>,
        infix: Option<Box<Field>>,
        reversed: bool,
    },

    /// A counter of `ctr_len` bits, followed by that many occurrences of `field`.
    Repeat { ctr_len: usize, field: Box<Field> },

    Container(Vec<Field>),
}

impl Field {
    pub fn integer(name: impl Into<String>, len: usize) -> Self {
        Self::FixedInteger {
            name: name.into(),
            len,
        }
    }

    pub fn string(name: impl Into<String>, len: usize) -> Self {
        Self::FixedString {
            name: name.into(),
            len,
        }
    }

    pub fn hex(name: impl Into<String>, len: usize) -> Self {
        Self::FixedHex {
            name: name.into(),
            len,
        }
    }

    pub fn bitmap(fields: Vec<Field>) -> Self {
        Self::Bitmap {
            fields,
            infix: None,
            reversed: false,
        }
    }

    pub fn bitmap_reversed(fields: Vec<Field>) -> Self {
        Self::Bitmap {
            fields,
            infix: None,
            reversed: true,
        }
    }

    pub fn bitmap_with_infix(infix: Field, fields: Vec<Field>) -> Self {
        Self::Bitmap {
            fields,
            infix: Some(Box::new(infix)),
            reversed: false,
        }
    }

    pub fn repeat(ctr_len: usize, field: Field) -> Self {
        Self::Repeat {
            ctr_len,
            field: Box::new(field),
        }
    }

    pub fn container(fields: Vec<Field>) -> Self {
        Self::Container(fields)
    }

    fn suffixed(base: &str, suffix: &str, len: usize) -> Self {
        Self::integer(format!("{}{}", base, suffix), len)
    }

    /// Days since 1997-01-01.
    pub fn date(base: &str) -> Self {
        Self::suffixed(base, suffix::DATE, 14)
    }

    /// Minutes since midnight UTC.
    pub fn time(base: &str) -> Self {
        Self::suffixed(base, suffix::TIME, 11)
    }

    /// Minutes since local midnight.
    pub fn time_local(base: &str) -> Self {
        Self::suffixed(base, suffix::TIME_LOCAL, 11)
    }

    pub fn time_packed16(base: &str) -> Self {
        Self::suffixed(base, suffix::TIME_PACKED16, 16)
    }

    pub fn time_packed11_local(base: &str) -> Self {
        Self::suffixed(base, suffix::TIME_PACKED11_LOCAL, 11)
    }

    /// Seconds since 1997-01-01 00:00 UTC.
    pub fn date_time(base: &str) -> Self {
        Self::suffixed(base, suffix::DATE_TIME, 30)
    }

    pub fn date_time_local(base: &str) -> Self {
        Self::suffixed(base, suffix::DATE_TIME_LOCAL, 30)
    }

    pub fn date_packed(base: &str) -> Self {
        Self::suffixed(base, suffix::DATE_PACKED, 14)
    }

    pub fn date_bcd(base: &str) -> Self {
        Self::suffixed(base, suffix::DATE_BCD, 32)
    }

    /// Parses the field at bit `off`, storing what could be read into `holder`.
    /// Returns the offset of the bit following the field.
    pub fn parse_field(
        &self,
        buffer: &[u8],
        off: usize,
        path: &str,
        holder: &mut En1545Parsed,
        bits: BitReader,
    ) -> usize {
        match self {
            Self::FixedInteger { name, len } => {
                match bits(buffer, off, *len) {
                    Ok(value) => holder.insert_int(name, path, value),
                    Err(e) => debug!("Couldn't read {}: {}", name, e),
                }

                off + len
            }
            Self::FixedString { name, len } => {
                if let Some(value) = parse_string(buffer, off, *len, bits) {
                    holder.insert_string(name, path, value);
                }

                off + len
            }
            Self::FixedHex { name, len } => {
                match parse_hex(buffer, off, *len, bits) {
                    Some(value) => holder.insert_string(name, path, value),
                    None => debug!("Couldn't read {}", name),
                }

                off + len
            }
            Self::Bitmap {
                fields,
                infix,
                reversed,
            } => {
                let count = fields.len();
                let bitmask = match bits(buffer, off, count) {
                    Ok(bitmask) => bitmask,
                    Err(_) => return off + count,
                };

                let mut off = off + count;
                if let Some(infix) = infix {
                    off = infix.parse_field(buffer, off, path, holder, bits);
                }

                for (i, field) in fields.iter().enumerate() {
                    let bit = match reversed {
                        true => i,
                        _ => count - 1 - i,
                    };

                    if bitmask >> bit & 1 != 0 {
                        off = field.parse_field(buffer, off, path, holder, bits);
                    }
                }

                off
            }
            Self::Repeat { ctr_len, field } => {
                let count = match bits(buffer, off, *ctr_len) {
                    Ok(count) => count,
                    Err(_) => return off + ctr_len,
                };

                let mut off = off + ctr_len;
                for i in 0..count {
                    off = field.parse_field(buffer, off, &format!("{}/{}", path, i), holder, bits);
                }

                off
            }
            Self::Container(fields) => fields.iter().fold(off, |off, field| {
                field.parse_field(buffer, off, path, holder, bits)
            }),
        }
    }
}

fn parse_string(buffer: &[u8], start: usize, len: usize, bits: BitReader) -> Option<String> {
    let end = start + len;
    let available = buffer.len() * 8;
    let mut value = String::new();

    let mut i = start;
    while i + 4 < end && i + 4 < available {
        match bits(buffer, i, 5).ok()? {
            0 | 31 => {
                if !value.is_empty() {
                    value.push(' ');
                }
            }
            c => value.push(char::from(b'A' + (c - 1) as u8)),
        }

        i += 5;
    }

    Some(value.trim_end().to_string())
}

fn parse_hex(buffer: &[u8], off: usize, len: usize, bits: BitReader) -> Option<String> {
    let mut value = String::new();
    let mut i = len;
    while i > 0 {
        let chunk = match i {
            8.. => 8,
            4.. => 4,
            _ => i,
        };

        let digits = bits(buffer, off + i - chunk, chunk).ok()?;
        let text = match chunk {
            8 => format!("{:02x}", digits),
            _ => format!("{:x}", digits),
        };

        value.insert_str(0, &text);
        i -= chunk;
    }

    Some(value)
}
