use crate::en1545::{Error, Result};

/// Reads `len` bits starting at bit `off` as an unsigned integer.
pub type BitReader = fn(&[u8], usize, usize) -> Result<u32>;

fn check(buffer: &[u8], off: usize, len: usize) -> Result<()> {
    if len > u32::BITS as usize {
        return Err(Error::TooWide(len));
    }

    let end = off.saturating_add(len);
    if end > buffer.len() * 8 {
        return Err(Error::OutOfBounds {
            start: off,
            end,
            len: buffer.len() * 8,
        });
    }

    Ok(())
}

/// Reads bits most significant first, both within an octet and in the result.
pub fn get_bits_from_buffer(buffer: &[u8], off: usize, len: usize) -> Result<u32> {
    check(buffer, off, len)?;

    Ok((off..off + len).fold(0, |value, i| {
        let bit = (buffer[i / 8] >> (7 - i % 8)) & 1;
        (value << 1) | bit as u32
    }))
}

/// Reads bits least significant first, both within an octet and in the result.
pub fn get_bits_from_buffer_le_bits(buffer: &[u8], off: usize, len: usize) -> Result<u32> {
    check(buffer, off, len)?;

    Ok((0..len).fold(0, |value, j| {
        let i = off + j;
        let bit = (buffer[i / 8] >> (i % 8)) & 1;
        value | (bit as u32) << j
    }))
}
