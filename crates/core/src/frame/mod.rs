//! Fixed-layout command frames and offset-based reply decoding.
//!
//! Every command the host sends is one of the [`templates`] with a handful
//! of bytes patched in at protocol-defined offsets. Replies are never parsed
//! generically: each query reads typed values at the offsets listed in
//! [`layout`].

use crate::{NetMdError, Result};

pub mod templates;

pub use templates::Template;

/// Overwrites `width` bytes at `offset` with `value` in big-endian order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Patch {
    pub offset: usize,
    pub value: u32,
    pub width: usize,
}

impl Patch {
    pub const fn byte(offset: usize, value: u8) -> Self {
        Self {
            offset,
            value: value as u32,
            width: 1,
        }
    }

    pub const fn u16_be(offset: usize, value: u16) -> Self {
        Self {
            offset,
            value: value as u32,
            width: 2,
        }
    }

    /// Three-byte big-endian field. Bits above 24 are dropped.
    pub const fn u24_be(offset: usize, value: u32) -> Self {
        Self {
            offset,
            value: value & 0x00FF_FFFF,
            width: 3,
        }
    }

    fn apply(&self, frame: &mut [u8]) -> Result<()> {
        let end = self.offset + self.width;
        let capacity = frame.len();
        let target = frame
            .get_mut(self.offset..end)
            .ok_or(NetMdError::BufferTooSmall { needed: end, capacity })?;
        for (i, byte) in target.iter_mut().enumerate() {
            let shift = 8 * (self.width - 1 - i);
            *byte = (self.value >> shift) as u8;
        }
        Ok(())
    }
}

/// Copies `template` and applies every patch in order.
pub fn build(template: &Template, patches: &[Patch]) -> Result<Vec<u8>> {
    let mut frame = template.bytes.to_vec();
    for patch in patches {
        patch.apply(&mut frame)?;
    }
    Ok(frame)
}

/// Builds a payload-bearing frame: the template prefix, then `payload`.
///
/// Patches may only touch the prefix.
pub fn build_with_payload(template: &Template, patches: &[Patch], payload: &[u8]) -> Result<Vec<u8>> {
    let mut frame = build(template, patches)?;
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Narrows a length to the single byte the protocol has room for.
pub fn length_byte(len: usize) -> Result<u8> {
    u8::try_from(len).map_err(|_| NetMdError::BufferTooSmall {
        needed: len,
        capacity: u8::MAX as usize,
    })
}

/// Reply offsets, declared once.
pub mod layout {
    /// Title text starts here in title replies.
    pub const TITLE_TEXT: usize = 25;
    /// A title reply of exactly this length carries no title at all.
    pub const TITLE_ABSENT_LEN: usize = 0x13;

    pub const TRACK_MINUTE: usize = 28;
    pub const TRACK_SECOND: usize = 29;
    pub const TRACK_TENTH: usize = 30;

    /// Encoding byte, counted back from the end of the reply.
    pub const ENCODING_FROM_END: usize = 2;
    /// Protection byte, counted back from the end of the reply.
    pub const PROTECTION_FROM_END: usize = 1;

    pub const CURRENT_TRACK: usize = 36;
    pub const POSITION_MINUTE: usize = 38;
    pub const POSITION_SECOND: usize = 39;
    pub const POSITION_HUNDREDTH: usize = 40;

    /// Track number assigned to a new recording.
    pub const RECORD_TRACK: usize = 0x12;
    /// Size of the completion status block inside the status word.
    pub const STATUS_BLOCK_LEN: usize = 2;
}

/// Decodes one binary-coded-decimal byte, `0x59` => 59.
pub fn bcd_to_proper(byte: u8) -> u8 {
    (byte >> 4) * 10 + (byte & 0x0F)
}

/// Inverse of [`bcd_to_proper`] for values below 100.
pub fn proper_to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// Reads the byte at `offset`.
pub fn byte_at(reply: &[u8], offset: usize) -> Result<u8> {
    reply.get(offset).copied().ok_or(NetMdError::ShortResponse {
        expected: offset + 1,
        actual: reply.len(),
    })
}

/// Reads the byte `distance` positions before the end of the reply.
pub fn byte_from_end(reply: &[u8], distance: usize) -> Result<u8> {
    if distance == 0 || reply.len() < distance {
        return Err(NetMdError::ShortResponse {
            expected: distance,
            actual: reply.len(),
        });
    }
    Ok(reply[reply.len() - distance])
}

/// Reads a BCD byte at `offset`.
pub fn bcd_at(reply: &[u8], offset: usize) -> Result<u8> {
    byte_at(reply, offset).map(bcd_to_proper)
}

/// Copies the title text out of a title reply into `dest`.
///
/// Returns `Ok(None)` when the reply is the header-only sentinel (or empty),
/// otherwise the number of bytes written. Fails with
/// [`NetMdError::BufferTooSmall`] instead of truncating.
pub fn copy_title(reply: &[u8], dest: &mut [u8]) -> Result<Option<usize>> {
    if reply.is_empty() || reply.len() == layout::TITLE_ABSENT_LEN {
        return Ok(None);
    }
    let text = reply
        .get(layout::TITLE_TEXT..)
        .ok_or(NetMdError::ShortResponse {
            expected: layout::TITLE_TEXT,
            actual: reply.len(),
        })?;
    if text.len() > dest.len() {
        return Err(NetMdError::BufferTooSmall {
            needed: text.len(),
            capacity: dest.len(),
        });
    }
    dest[..text.len()].copy_from_slice(text);
    Ok(Some(text.len()))
}

/// Allocating form of [`copy_title`] bounded by `capacity`.
pub fn extract_title(reply: &[u8], capacity: usize) -> Result<Option<Vec<u8>>> {
    let mut dest = vec![0u8; capacity];
    Ok(copy_title(reply, &mut dest)?.map(|len| {
        dest.truncate(len);
        dest
    }))
}

/// Counts bytes that differ between a reply and a known-good reply over
/// their common length.
pub fn count_differences(reply: &[u8], expected: &[u8]) -> usize {
    reply
        .iter()
        .zip(expected)
        .filter(|(actual, wanted)| actual != wanted)
        .count()
}
