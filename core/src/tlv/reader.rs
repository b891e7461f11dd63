use crate::tlv::{Error, Result, Tlv};

/// Longest length field that is still decoded, in octets.
const MAX_LENGTH_OCTETS: usize = 8;

/// Largest value length accepted.
const MAX_LENGTH: u64 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Length {
    Definite(usize),
    Indefinite,
}

/// Stateful BER-TLV reader over a borrowed buffer.
#[derive(Debug, Clone)]
pub(crate) struct Reader<'a> {
    buffer: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    /// Creates a new reader from the buffer.
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, cursor: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.cursor >= self.buffer.len()
    }

    /// Moves the cursor to the end, so that nothing more is read.
    pub fn finish(&mut self) {
        self.cursor = self.buffer.len();
    }

    /// Reads a next octet and seeks the cursor.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<u8> {
        let byte = *self.buffer.get(self.cursor).ok_or(Error::UnexpectedEnd)?;
        self.cursor += 1;

        Ok(byte)
    }

    /// Reads data of specified size and seeks the cursor.
    pub fn read(&mut self, length: usize) -> Result<&'a [u8]> {
        let end = self
            .cursor
            .checked_add(length)
            .filter(|end| *end <= self.buffer.len())
            .ok_or(Error::UnexpectedEnd)?;

        let bytes = &self.buffer[self.cursor..end];
        self.cursor = end;

        Ok(bytes)
    }

    /// Reads a tag at the current position. Tags whose low 5 bits are all set continue
    /// while the high bit of the following octets is set.
    pub fn read_tag(&mut self) -> Result<&'a [u8]> {
        let start = self.cursor;
        if self.next()? & 0x1F == 0x1F {
            while self.next()? & 0x80 != 0 {}
        }

        Ok(&self.buffer[start..self.cursor])
    }

    /// Reads the length octets at the current position.
    pub fn read_length(&mut self) -> Result<Length> {
        let head = self.next()?;
        if head & 0x80 == 0 {
            return Ok(Length::Definite(head as usize));
        }

        let count = (head & 0x7F) as usize;
        if count == 0 {
            return Ok(Length::Indefinite);
        }

        let octets = self.read(count)?;
        let (padding, octets) = octets.split_at(count.saturating_sub(MAX_LENGTH_OCTETS));
        if padding.iter().any(|b| *b != 0) {
            return Err(Error::LengthTooLarge);
        }

        if octets.len() == MAX_LENGTH_OCTETS && octets[0] & 0x80 != 0 {
            return Err(Error::LengthTooLarge);
        }

        let length = octets
            .iter()
            .fold(0u64, |length, b| (length << 8) | *b as u64);

        match length {
            0..=MAX_LENGTH => Ok(Length::Definite(length as usize)),
            _ => Err(Error::LengthTooLarge),
        }
    }

    /// Reads the next object. Padding is skipped: `00` octets in front of the first object, empty
    /// objects of tag `00`, and a tail made only of `00` octets.
    /// Returns `None` when only padding is left.
    pub fn read_object(&mut self) -> Result<Option<Tlv<'a>>> {
        if self.cursor == 0 {
            while self.buffer.get(self.cursor) == Some(&0x00) {
                self.cursor += 1;
            }
        }

        loop {
            if self.buffer[self.cursor.min(self.buffer.len())..]
                .iter()
                .all(|b| *b == 0x00)
            {
                self.finish();
                return Ok(None);
            }

            match self.read_one()? {
                Tlv { id: [0x00], data: [], .. } => continue,
                object => return Ok(Some(object)),
            }
        }
    }

    fn read_one(&mut self) -> Result<Tlv<'a>> {
        let start = self.cursor;
        let id = self.read_tag()?;
        let length = self.read_length()?;
        let header = &self.buffer[start..self.cursor];

        let data = match length {
            Length::Definite(length) => self.read(length)?,
            Length::Indefinite => {
                let length = self.buffer[self.cursor..]
                    .windows(2)
                    .position(|w| w == [0x00, 0x00])
                    .ok_or(Error::IndefiniteWithoutTerminator)?;

                let data = self.read(length)?;
                self.read(2)?;

                data
            }
        };

        Ok(Tlv {
            id,
            header,
            data,
            encoded: &self.buffer[start..start + header.len() + data.len()],
        })
    }
}
