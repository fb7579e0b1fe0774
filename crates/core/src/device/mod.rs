use serde::{Deserialize, Serialize};

use crate::frame::{self, layout, templates, templates::offsets, Patch, Template};
use crate::{AppConfig, NetMdError, Result, Transport};

/// Recording mode of a track, looked up from the encoding byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    Stereo,
    Lp2,
    Lp4,
    Unknown(u8),
}

impl Encoding {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x90 => Self::Stereo,
            0x92 => Self::Lp2,
            0x93 => Self::Lp4,
            other => Self::Unknown(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Stereo => 0x90,
            Self::Lp2 => 0x92,
            Self::Lp4 => 0x93,
            Self::Unknown(byte) => byte,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Stereo => "Stereo",
            Self::Lp2 => "LP2",
            Self::Lp4 => "LP4",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

/// Copy protection state of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protection {
    Unprotected,
    Protected,
    Unknown(u8),
}

impl Protection {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => Self::Unprotected,
            0x03 => Self::Protected,
            other => Self::Unknown(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Unprotected => 0x00,
            Self::Protected => 0x03,
            Self::Unknown(byte) => byte,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Unprotected => "UnPROT",
            Self::Protected => "TrPROT",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

/// Duration of a single track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackTime {
    pub track: u8,
    pub minute: u8,
    pub second: u8,
    pub tenth: u8,
}

impl std::fmt::Display for TrackTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}.{}", self.minute, self.second, self.tenth)
    }
}

/// Position of the playhead inside the current track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackPosition {
    pub minutes: u8,
    pub seconds: u8,
    pub hundredths: u8,
}

impl PlaybackPosition {
    pub fn as_secs_f32(&self) -> f32 {
        let position = f32::from(self.minutes) * 60.0
            + f32::from(self.seconds)
            + f32::from(self.hundredths) / 100.0;
        position.max(0.0)
    }
}

/// Everything the device reports about one track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub index: u8,
    pub title: Option<String>,
    pub time: TrackTime,
    pub encoding: Encoding,
    pub protection: Protection,
}

/// A session with one recorder. Every method issues exactly one request
/// and waits for its reply.
#[derive(Debug)]
pub struct NetMdDevice<T> {
    transport: T,
    config: AppConfig,
}

impl<T: Transport> NetMdDevice<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, AppConfig::default())
    }

    pub fn with_config(transport: T, config: AppConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Sends a frame and returns the reply, logging both at trace level.
    pub fn exchange(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        tracing::trace!(request = %hex::encode(frame), "exchange");
        let reply = self.transport.exchange(frame)?;
        tracing::trace!(reply = %hex::encode(&reply), "exchange reply");
        Ok(reply)
    }

    /// Like [`exchange`](Self::exchange), and also reports how far the reply
    /// strays from a known-good reply. A mismatch is only logged.
    pub fn exchange_expecting(&mut self, frame: &[u8], expected: &Template) -> Result<Vec<u8>> {
        let reply = self.exchange(frame)?;
        let differ = frame::count_differences(&reply, expected.bytes);
        if differ > 0 {
            tracing::warn!(differ, template = expected.name, "reply differs from expected");
        }
        Ok(reply)
    }

    fn send(&mut self, template: &Template, patches: &[Patch]) -> Result<Vec<u8>> {
        tracing::debug!(command = template.name, "sending");
        let request = frame::build(template, patches)?;
        self.exchange(&request)
    }

    /// Raw disc title bytes, `None` when the disc reports no title.
    pub fn request_disc_title(&mut self) -> Result<Option<Vec<u8>>> {
        let reply = self.send(&templates::REQUEST_DISC_TITLE, &[])?;
        frame::extract_title(&reply, self.config.device.title_capacity)
    }

    /// Title of `track`, `None` for untitled or missing tracks.
    pub fn request_track_title(&mut self, track: u8) -> Result<Option<String>> {
        let reply = self.send(
            &templates::REQUEST_TRACK_TITLE,
            &[Patch::byte(offsets::TRACK, track)],
        )?;
        let raw = frame::extract_title(&reply, self.config.device.title_capacity)?;
        Ok(raw.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    pub fn set_track_title(&mut self, track: u8, title: &str) -> Result<()> {
        let len = frame::length_byte(title.len())?;
        let request = frame::build_with_payload(
            &templates::SET_TRACK_TITLE,
            &[
                Patch::byte(offsets::TRACK, track),
                Patch::byte(offsets::NEW_LENGTH, len),
                Patch::byte(offsets::OLD_LENGTH, len),
            ],
            title.as_bytes(),
        )?;
        self.exchange(&request)?;
        Ok(())
    }

    /// Replaces the whole raw disc title string.
    pub fn set_disc_title(&mut self, title: &str) -> Result<()> {
        let len = frame::length_byte(title.len())?;
        self.write_title_frame(title, len, len)
    }

    /// Writes a freshly generated group header over one of `old_len` bytes.
    pub fn write_disc_header(&mut self, header: &str, old_len: usize) -> Result<()> {
        let new_len = frame::length_byte(header.len())?;
        let old_len = frame::length_byte(old_len)?;
        self.write_title_frame(header, new_len, old_len)
    }

    fn write_title_frame(&mut self, title: &str, new_len: u8, old_len: u8) -> Result<()> {
        let request = frame::build_with_payload(
            &templates::WRITE_DISC_TITLE,
            &[
                Patch::byte(offsets::NEW_LENGTH, new_len),
                Patch::byte(offsets::OLD_LENGTH, old_len),
            ],
            title.as_bytes(),
        )?;
        self.exchange(&request)?;
        Ok(())
    }

    pub fn request_track_time(&mut self, track: u8) -> Result<TrackTime> {
        let reply = self.send(
            &templates::REQUEST_TRACK_TIME,
            &[Patch::byte(offsets::TRACK, track)],
        )?;
        Ok(TrackTime {
            track,
            minute: frame::bcd_at(&reply, layout::TRACK_MINUTE)?,
            second: frame::bcd_at(&reply, layout::TRACK_SECOND)?,
            tenth: frame::bcd_at(&reply, layout::TRACK_TENTH)?,
        })
    }

    pub fn request_track_encoding(&mut self, track: u8) -> Result<Encoding> {
        let reply = self.send(
            &templates::REQUEST_TRACK_ENCODING,
            &[Patch::byte(offsets::TRACK, track)],
        )?;
        frame::byte_from_end(&reply, layout::ENCODING_FROM_END).map(Encoding::from_byte)
    }

    pub fn request_track_protection(&mut self, track: u8) -> Result<Protection> {
        let reply = self.send(
            &templates::REQUEST_TRACK_PROTECTION,
            &[Patch::byte(offsets::TRACK, track)],
        )?;
        frame::byte_from_end(&reply, layout::PROTECTION_FROM_END).map(Protection::from_byte)
    }

    /// Collects title, time, encoding and protection of one track.
    pub fn track_info(&mut self, track: u8) -> Result<TrackInfo> {
        Ok(TrackInfo {
            index: track,
            title: self.request_track_title(track)?,
            time: self.request_track_time(track)?,
            encoding: self.request_track_encoding(track)?,
            protection: self.request_track_protection(track)?,
        })
    }

    /// Collects [`TrackInfo`] for tracks `0..count`.
    pub fn list_tracks(&mut self, count: u16) -> Result<Vec<TrackInfo>> {
        let count = u8::try_from(count)
            .map_err(|_| NetMdError::out_of_range("track", usize::from(count), 256))?;
        (0..count).map(|track| self.track_info(track)).collect()
    }

    /// Moves the track at index `from` so that it ends up at index `to`.
    pub fn move_track(&mut self, from: u8, to: u8) -> Result<()> {
        tracing::debug!(from, to, "moving track");
        self.send(
            &templates::MOVE_TRACK,
            &[
                Patch::byte(offsets::MOVE_FROM, from),
                Patch::byte(offsets::MOVE_TO, to),
            ],
        )?;
        Ok(())
    }

    pub fn delete_track(&mut self, track: u8) -> Result<()> {
        tracing::debug!(track, "deleting track");
        self.send(
            &templates::DELETE_TRACK,
            &[Patch::byte(offsets::DELETE_TRACK, track)],
        )?;
        Ok(())
    }

    /// Index of the track under the playhead.
    pub fn current_track(&mut self) -> Result<u8> {
        let reply = self.send(&templates::REQUEST_PLAYBACK_STATUS, &[])?;
        frame::byte_at(&reply, layout::CURRENT_TRACK)
    }

    pub fn playback_position(&mut self) -> Result<PlaybackPosition> {
        let reply = self.send(&templates::REQUEST_PLAYBACK_STATUS, &[])?;
        Ok(PlaybackPosition {
            minutes: frame::bcd_at(&reply, layout::POSITION_MINUTE)?,
            seconds: frame::bcd_at(&reply, layout::POSITION_SECOND)?,
            hundredths: frame::bcd_at(&reply, layout::POSITION_HUNDREDTH)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::{EmulatedDevice, EmulatedTrack};

    fn device() -> NetMdDevice<EmulatedDevice> {
        let mut emulator = EmulatedDevice::with_title("0;Disc//1-2;Pair//");
        emulator.push_track(EmulatedTrack::new("First", 3, 25, 4));
        emulator.push_track(EmulatedTrack {
            encoding: Encoding::Lp2,
            protection: Protection::Protected,
            ..EmulatedTrack::new("Second", 12, 5, 0)
        });
        NetMdDevice::new(emulator)
    }

    #[test]
    fn reads_track_metadata() {
        let mut device = device();
        let info = device.track_info(1).unwrap();
        assert_eq!(info.title.as_deref(), Some("Second"));
        assert_eq!(info.time.to_string(), "12:05.0");
        assert_eq!(info.encoding, Encoding::Lp2);
        assert_eq!(info.protection, Protection::Protected);

        let first = device.request_track_time(0).unwrap();
        assert_eq!((first.minute, first.second, first.tenth), (3, 25, 4));
    }

    #[test]
    fn untitled_track_has_no_title() {
        let mut device = device();
        device.set_track_title(0, "").unwrap();
        assert_eq!(device.request_track_title(0).unwrap(), None);
    }

    #[test]
    fn disc_title_frame_echoes_lengths() {
        let mut device = device();
        device.write_disc_header("0;New//", 18).unwrap();

        let sent = device.transport().sent().last().unwrap().clone();
        assert_eq!(sent.len(), templates::WRITE_DISC_TITLE.len() + 7);
        assert_eq!(sent[offsets::NEW_LENGTH], 7);
        assert_eq!(sent[offsets::OLD_LENGTH], 18);
        assert_eq!(
            device.request_disc_title().unwrap().as_deref(),
            Some(&b"0;New//"[..])
        );
    }

    #[test]
    fn oversized_title_is_refused_before_sending() {
        let mut device = device();
        let long = "x".repeat(256);
        assert!(matches!(
            device.set_track_title(0, &long),
            Err(NetMdError::BufferTooSmall { needed: 256, .. })
        ));
        assert!(device.transport().sent().is_empty());
    }

    #[test]
    fn title_capacity_is_enforced() {
        let mut config = AppConfig::default();
        config.device.title_capacity = 4;
        let emulator = EmulatedDevice::with_title("0;Disc//");
        let mut device = NetMdDevice::with_config(emulator, config);
        assert!(matches!(
            device.request_disc_title(),
            Err(NetMdError::BufferTooSmall { needed: 8, capacity: 4 })
        ));
    }

    #[test]
    fn reads_playback_status() {
        let mut device = device();
        device.transport_mut().set_playhead(1, 2, 30, 50);
        assert_eq!(device.current_track().unwrap(), 1);
        let position = device.playback_position().unwrap();
        assert_eq!(position.as_secs_f32(), 150.5);
    }

    #[test]
    fn lookups_fall_back_to_unknown() {
        assert_eq!(Encoding::from_byte(0x91), Encoding::Unknown(0x91));
        assert_eq!(Encoding::from_byte(0x93).label(), "LP4");
        assert_eq!(Protection::from_byte(0x03).label(), "TrPROT");
        assert_eq!(Protection::from_byte(0x07).label(), "UNKNOWN");
    }

    #[test]
    fn transport_failure_is_surfaced() {
        let mut device = device();
        device.transport_mut().fail_after(0);
        assert!(matches!(
            device.request_track_time(0),
            Err(NetMdError::Transport(_))
        ));
    }
}
