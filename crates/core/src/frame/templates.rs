//! Frame template table.
//!
//! Byte order inside a template is dictated by the device firmware; any
//! reordering breaks compatibility.

/// A fixed command layout. Variable bytes are zero or `0xdd` placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub name: &'static str,
    pub bytes: &'static [u8],
}

impl Template {
    pub(crate) const fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when `frame` starts with the first `prefix` bytes of this template.
    pub fn matches(&self, frame: &[u8], prefix: usize) -> bool {
        let prefix = prefix.min(self.bytes.len());
        frame.len() >= prefix && frame[..prefix] == self.bytes[..prefix]
    }
}

/// Patch offsets, declared once per field.
pub mod offsets {
    /// Track index in title, time, encoding and protection requests.
    pub const TRACK: usize = 8;
    /// New payload length echo in title writes.
    pub const NEW_LENGTH: usize = 16;
    /// Old payload length echo in title writes.
    pub const OLD_LENGTH: usize = 20;
    pub const MOVE_FROM: usize = 10;
    pub const MOVE_TO: usize = 15;
    pub const DELETE_TRACK: usize = 10;
    /// 24-bit big-endian on-wire size in the start-record command.
    pub const RECORD_SIZE: usize = 27;
    /// 16-bit big-endian forward length inside a splice header.
    pub const SPLICE_LENGTH: usize = 6;
}

pub const REQUEST_DISC_TITLE: Template = Template {
    name: "request disc title",
    bytes: &[
        0x00, 0x18, 0x06, 0x02, 0x20, 0x18, 0x01, 0x00, 0x00, 0x30, 0x00, 0x0a, 0x00, 0xff, 0x00,
        0x00, 0x00, 0x00, 0x00,
    ],
};

pub const REQUEST_TRACK_TITLE: Template = Template {
    name: "request track title",
    bytes: &[
        0x00, 0x18, 0x06, 0x02, 0x20, 0x18, 0x02, 0x00, 0x00, 0x30, 0x00, 0x0a, 0x00, 0xff, 0x00,
        0x00, 0x00, 0x00, 0x00,
    ],
};

pub const WRITE_DISC_TITLE: Template = Template {
    name: "write disc title",
    bytes: &[
        0x00, 0x18, 0x07, 0x02, 0x20, 0x18, 0x01, 0x00, 0x00, 0x30, 0x00, 0x0a, 0x00, 0x50, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ],
};

pub const SET_TRACK_TITLE: Template = Template {
    name: "set track title",
    bytes: &[
        0x00, 0x18, 0x07, 0x02, 0x20, 0x18, 0x02, 0x00, 0x00, 0x30, 0x00, 0x0a, 0x00, 0x50, 0x00,
        0x00, 0x0a, 0x00, 0x00, 0x00, 0x0d,
    ],
};

pub const REQUEST_TRACK_TIME: Template = Template {
    name: "request track time",
    bytes: &[
        0x00, 0x18, 0x06, 0x02, 0x20, 0x10, 0x01, 0x00, 0x01, 0x30, 0x00, 0x01, 0x00, 0xff, 0x00,
        0x00, 0x00, 0x00, 0x00,
    ],
};

pub const REQUEST_TRACK_ENCODING: Template = Template {
    name: "request track encoding",
    bytes: &[
        0x00, 0x18, 0x06, 0x02, 0x20, 0x10, 0x01, 0x00, 0xdd, 0x30, 0x80, 0x07, 0x00, 0xff, 0x00,
        0x00, 0x00, 0x00, 0x00,
    ],
};

pub const REQUEST_TRACK_PROTECTION: Template = Template {
    name: "request track protection",
    bytes: &[
        0x00, 0x18, 0x06, 0x01, 0x20, 0x10, 0x01, 0x00, 0xdd, 0xff, 0x00, 0x00, 0x01, 0x00, 0x08,
    ],
};

pub const MOVE_TRACK: Template = Template {
    name: "move track",
    bytes: &[
        0x00, 0x18, 0x43, 0xff, 0x00, 0x00, 0x20, 0x10, 0x01, 0x00, 0x04, 0x20, 0x10, 0x01, 0x00,
        0x03,
    ],
};

pub const DELETE_TRACK: Template = Template {
    name: "delete track",
    bytes: &[0x00, 0x18, 0x40, 0xff, 0x01, 0x00, 0x20, 0x10, 0x01, 0x00, 0x00],
};

pub const REQUEST_PLAYBACK_STATUS: Template = Template {
    name: "request playback status",
    bytes: &[
        0x00, 0x18, 0x09, 0x80, 0x01, 0x04, 0x30, 0x88, 0x02, 0x00, 0x30, 0x88, 0x05, 0x00, 0x30,
        0x00, 0x03, 0x00, 0x30, 0x00, 0x02, 0x00, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00,
    ],
};

pub const START_RECORD: Template = Template {
    name: "start record",
    bytes: &[
        0x00, 0x18, 0x00, 0x08, 0x00, 0x46, 0xf0, 0x03, 0x01, 0x03, 0x28, 0xff, 0x00, 0x01, 0x00,
        0x10, 0x01, 0xff, 0xff, 0x00, 0x94, 0x02, 0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x04, 0x98,
    ],
};

/// Reply a recorder sends to [`START_RECORD`] when it accepts the recording.
pub const START_RECORD_REPLY: Template = Template {
    name: "start record reply",
    bytes: &[
        0x0f, 0x18, 0x00, 0x08, 0x00, 0x46, 0xf0, 0x03, 0x01, 0x03, 0x28, 0x00, 0x00, 0x01, 0x00,
        0x10, 0x01, 0x00, 0x11, 0x00, 0x94, 0x02, 0x00, 0x00, 0x43, 0x8c, 0x00, 0x32, 0xbc, 0x50,
    ],
};

/// Marker sent before titling a fresh recording.
pub const BEGIN_TITLE: Template = Template {
    name: "begin title",
    bytes: &[0x00, 0x18, 0x08, 0x10, 0x18, 0x02, 0x03, 0x00],
};

/// Marker sent after titling a fresh recording.
pub const END_RECORD: Template = Template {
    name: "end record",
    bytes: &[0x00, 0x18, 0x08, 0x10, 0x18, 0x02, 0x00, 0x00],
};

/// Control message that ends TOC editing.
pub const FINISH_TOC: Template = Template {
    name: "finish toc",
    bytes: &[
        0x00, 0x18, 0x00, 0x08, 0x00, 0x46, 0xf0, 0x03, 0x01, 0x03, 0x48, 0xff, 0x00, 0x10, 0x01,
        0x00, 0x25, 0x8f, 0xbf, 0x09, 0xa2, 0x2f, 0x35, 0xa3, 0xdd,
    ],
};

/// Header spliced into the audio stream every splice interval.
pub const SPLICE_HEADER: Template = Template {
    name: "splice header",
    bytes: &[
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x3f, 0x00, 0xd4, 0x4b, 0xdc, 0xaa, 0xef, 0x68, 0x22,
        0xe2,
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_lengths_match_the_wire_format() {
        assert_eq!(REQUEST_DISC_TITLE.len(), 0x13);
        assert_eq!(REQUEST_TRACK_TITLE.len(), 0x13);
        assert_eq!(WRITE_DISC_TITLE.len(), 0x15);
        assert_eq!(SET_TRACK_TITLE.len(), 0x15);
        assert_eq!(REQUEST_TRACK_PROTECTION.len(), 15);
        assert_eq!(MOVE_TRACK.len(), 16);
        assert_eq!(DELETE_TRACK.len(), 11);
        assert_eq!(REQUEST_PLAYBACK_STATUS.len(), 28);
        assert_eq!(START_RECORD.len(), 30);
        assert_eq!(FINISH_TOC.len(), 0x19);
        assert_eq!(SPLICE_HEADER.len(), 16);
    }

    #[test]
    fn prefix_matching_ignores_patched_bytes() {
        let mut frame = MOVE_TRACK.bytes.to_vec();
        frame[offsets::MOVE_FROM] = 9;
        assert!(MOVE_TRACK.matches(&frame, 4));
        assert!(!DELETE_TRACK.matches(&frame, 4));
        assert!(!MOVE_TRACK.matches(&frame[..2], 4));
    }
}
