//! Disc title mini-language.
//!
//! A recorder stores its whole group structure inside the disc title, as a
//! sequence of `//`-terminated segments:
//!
//! ```text
//! 0;My Disc//1-3;Rock//4;Pop//;Empty//
//! ```
//!
//! * `Name` or `0;Name` is the disc title,
//! * `N;Name` is a group holding track `N`,
//! * `N-M;Name` is a group holding tracks `N` through `M`,
//! * `;Name` is a group that holds no tracks yet.

use serde::{Deserialize, Serialize};

use crate::{NetMdError, Result};

pub const DELIMITER: &str = "//";
/// Name given to the disc title slot when the disc carries none.
pub const UNTITLED: &str = "<Untitled>";

/// One entry of the disc's table of contents. Bounds are 1-based track
/// numbers; zero means unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub start: u16,
    pub finish: u16,
}

impl Group {
    /// A group with no tracks.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_range(name, 0, 0)
    }

    pub fn with_range(name: impl Into<String>, start: u16, finish: u16) -> Self {
        Self {
            name: name.into(),
            start,
            finish,
        }
    }

    /// True when neither bound is set.
    pub fn is_empty(&self) -> bool {
        self.start == 0 && self.finish == 0
    }

    /// Last track number held, `start` for single-track groups.
    pub fn last(&self) -> u16 {
        if self.finish != 0 {
            self.finish
        } else {
            self.start
        }
    }

    /// Number of tracks in the group.
    pub fn track_count(&self) -> u16 {
        if self.start == 0 {
            0
        } else {
            self.last() - self.start + 1
        }
    }

    /// Whether the 1-based `track_number` lies inside `[start, last]`.
    pub fn contains(&self, track_number: u16) -> bool {
        self.start != 0 && self.start <= track_number && track_number <= self.last()
    }

    /// Moves both set bounds by `delta`, leaving unset bounds at zero.
    pub(crate) fn shift(&mut self, delta: i32) {
        if self.start != 0 {
            self.start = offset(self.start, delta);
        }
        if self.finish != 0 {
            self.finish = offset(self.finish, delta);
        }
    }
}

fn offset(value: u16, delta: i32) -> u16 {
    (i32::from(value) + delta).clamp(0, i32::from(u16::MAX)) as u16
}

/// Result of decoding a raw title: the disc title if any segment named it,
/// followed by the track groups in on-disc order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTitle {
    pub title: Option<String>,
    pub groups: Vec<Group>,
}

impl ParsedTitle {
    /// Flattens into the group list with the disc title at index 0, falling
    /// back to [`UNTITLED`] when the disc had no title.
    pub fn into_groups(self) -> Vec<Group> {
        let title = self.title.unwrap_or_else(|| UNTITLED.to_string());
        let mut groups = Vec::with_capacity(self.groups.len() + 1);
        groups.push(Group::new(title));
        groups.extend(self.groups);
        groups
    }
}

/// Decodes the raw title bytes exactly as reported by the device. Processing
/// ends at the end of `raw`; no terminator is searched for.
///
/// Only the delimiters and track numbers have to be ASCII. Names are taken
/// as they come and decoded lossily.
pub fn parse(raw: &[u8]) -> Result<ParsedTitle> {
    let mut parsed = ParsedTitle::default();
    for segment in segments(raw) {
        parse_segment(segment, &mut parsed)?;
    }
    Ok(parsed)
}

/// Splits `raw` on every `//`, keeping the segment after the last one.
fn segments(raw: &[u8]) -> impl Iterator<Item = &[u8]> + '_ {
    let delimiter = DELIMITER.as_bytes();
    let mut rest = Some(raw);
    std::iter::from_fn(move || {
        let current = rest?;
        match current.windows(delimiter.len()).position(|w| w == delimiter) {
            Some(at) => {
                rest = Some(&current[at + delimiter.len()..]);
                Some(&current[..at])
            }
            None => {
                rest = None;
                Some(current)
            }
        }
    })
}

fn split_at_byte(bytes: &[u8], separator: u8) -> Option<(&[u8], &[u8])> {
    let at = bytes.iter().position(|&b| b == separator)?;
    Some((&bytes[..at], &bytes[at + 1..]))
}

fn decode_name(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn parse_segment(segment: &[u8], parsed: &mut ParsedTitle) -> Result<()> {
    let Some((range, name)) = split_at_byte(segment, b';') else {
        if !segment.is_empty() {
            parsed.title = Some(decode_name(segment));
        }
        return Ok(());
    };

    if name.is_empty() {
        return Ok(());
    }
    if range.is_empty() {
        parsed.groups.push(Group::new(decode_name(name)));
        return Ok(());
    }

    let (start, finish) = parse_range(range)?;
    if start == 0 {
        // "0;Name", and any range that reads as zero, names the disc.
        parsed.title = Some(decode_name(name));
    } else {
        parsed.groups.push(Group::with_range(decode_name(name), start, finish));
    }
    Ok(())
}

fn parse_range(range: &[u8]) -> Result<(u16, u16)> {
    let (first, rest) = match split_at_byte(range, b'-') {
        Some((first, rest)) => (first, Some(rest)),
        None => (range, None),
    };
    let start = leading_number(first)?;
    let finish = match rest {
        Some(rest) => leading_number(rest)?,
        None => start,
    };
    if start != 0 && finish != 0 && finish < start {
        return Err(NetMdError::Parse(format!(
            "group range {start}-{finish} runs backwards"
        )));
    }
    Ok((start, finish))
}

/// Value of the leading decimal digits, zero when there are none.
fn leading_number(text: &[u8]) -> Result<u16> {
    let text = match text.iter().position(|b| !b.is_ascii_whitespace()) {
        Some(at) => &text[at..],
        None => return Ok(0),
    };
    let digits = text.iter().take_while(|b| b.is_ascii_digit()).count();
    text[..digits]
        .iter()
        .try_fold(0u16, |value, &digit| {
            value.checked_mul(10)?.checked_add(u16::from(digit - b'0'))
        })
        .ok_or_else(|| {
            NetMdError::Parse(format!(
                "track number {} is too large",
                String::from_utf8_lossy(&text[..digits])
            ))
        })
}

/// Encodes `groups` (disc title first) into the on-device title string.
pub fn generate(groups: &[Group]) -> String {
    let mut out = String::with_capacity(compute_length(groups));
    if groups.first().is_some_and(|title| title.start == 0) {
        out.push('0');
    }
    for group in groups {
        if group.start > 0 {
            out.push_str(&group.start.to_string());
            if group.finish != 0 {
                out.push('-');
                out.push_str(&group.finish.to_string());
            }
        }
        out.push(';');
        out.push_str(&group.name);
        out.push_str(DELIMITER);
    }
    out
}

/// Exact byte length of [`generate`]'s output.
pub fn compute_length(groups: &[Group]) -> usize {
    let mut len = usize::from(groups.first().is_some_and(|title| title.start == 0));
    for group in groups {
        if group.start > 0 {
            len += digits(group.start);
            if group.finish != 0 {
                len += 1 + digits(group.finish);
            }
        }
        len += 1 + group.name.len() + DELIMITER.len();
    }
    len
}

fn digits(value: u16) -> usize {
    value.checked_ilog10().map_or(1, |log| log as usize + 1)
}
