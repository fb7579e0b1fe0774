//! In-memory stand-in for a recorder.
//!
//! [`EmulatedDevice`] answers every command the codec emits, keeps a log of
//! the frames it received and can be told to fail part-way through a
//! session. Its state round-trips through JSON as a [`DiscImage`], which is
//! what the command-line tool edits.

use std::{collections::VecDeque, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::device::{Encoding, Protection};
use crate::frame::{layout, proper_to_bcd, templates, templates::offsets};
use crate::transport::IDLE_STATUS;
use crate::{NetMdError, Result, Transport};

/// Status word reported once a bulk transfer has been taken in.
pub const TRANSFER_DONE_STATUS: [u8; 4] = [0x00, 0x00, 0x08, 0x00];
/// Status word reported once the TOC has been written.
pub const TOC_WRITTEN_STATUS: [u8; 4] = [0x00, 0x00, 0x01, 0x00];

/// Byte a recorder places first in an accepted reply.
const ACCEPTED: u8 = 0x09;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatedTrack {
    pub title: String,
    pub minute: u8,
    pub second: u8,
    pub tenth: u8,
    pub encoding: Encoding,
    pub protection: Protection,
    /// Bytes of audio received for tracks recorded through the emulator.
    #[serde(default)]
    pub audio_len: usize,
}

impl EmulatedTrack {
    pub fn new(title: impl Into<String>, minute: u8, second: u8, tenth: u8) -> Self {
        Self {
            title: title.into(),
            minute,
            second,
            tenth,
            encoding: Encoding::Stereo,
            protection: Protection::Unprotected,
            audio_len: 0,
        }
    }
}

/// Persistent contents of an emulated disc.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscImage {
    pub title: String,
    pub tracks: Vec<EmulatedTrack>,
}

impl DiscImage {
    /// A disc with `count` untitled one-minute tracks.
    pub fn blank(title: impl Into<String>, count: u8) -> Self {
        Self {
            title: title.into(),
            tracks: (0..count)
                .map(|i| EmulatedTrack::new(format!("Track {}", i + 1), 1, 0, 0))
                .collect(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Recording {
    track: usize,
    received: usize,
}

#[derive(Debug, Default)]
pub struct EmulatedDevice {
    image: DiscImage,
    sent: Vec<Vec<u8>>,
    bulk: Vec<Vec<u8>>,
    control_writes: Vec<Vec<u8>>,
    playhead: [u8; 4],
    recording: Option<Recording>,
    status: [u8; 4],
    completion_status: Option<[u8; 4]>,
    scripted_status: VecDeque<[u8; 4]>,
    remaining_ops: Option<usize>,
}

impl EmulatedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(title: impl Into<String>) -> Self {
        Self::from_image(DiscImage {
            title: title.into(),
            tracks: Vec::new(),
        })
    }

    pub fn from_image(image: DiscImage) -> Self {
        Self {
            image,
            ..Self::default()
        }
    }

    pub fn image(&self) -> &DiscImage {
        &self.image
    }

    pub fn into_image(self) -> DiscImage {
        self.image
    }

    pub fn push_track(&mut self, track: EmulatedTrack) {
        self.image.tracks.push(track);
    }

    /// Every frame passed to [`Transport::exchange`], oldest first.
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }

    /// Every buffer passed to [`Transport::bulk_write`].
    pub fn bulk_writes(&self) -> &[Vec<u8>] {
        &self.bulk
    }

    pub fn control_writes(&self) -> &[Vec<u8>] {
        &self.control_writes
    }

    pub fn set_playhead(&mut self, track: u8, minutes: u8, seconds: u8, hundredths: u8) {
        self.playhead = [track, minutes, seconds, hundredths];
    }

    /// Overrides the status word reported after a bulk transfer.
    pub fn set_completion_status(&mut self, status: [u8; 4]) {
        self.completion_status = Some(status);
    }

    /// Queues status words returned ahead of the device's own state.
    pub fn script_status(&mut self, words: impl IntoIterator<Item = [u8; 4]>) {
        self.scripted_status.extend(words);
    }

    /// Lets `ops` transport calls succeed, then fails every later one.
    pub fn fail_after(&mut self, ops: usize) {
        self.remaining_ops = Some(ops);
    }

    fn tick(&mut self) -> Result<()> {
        match self.remaining_ops.as_mut() {
            Some(0) => Err(NetMdError::transport("emulated transport failure")),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn track_mut(&mut self, index: u8) -> Result<&mut EmulatedTrack> {
        let count = self.image.tracks.len();
        self.image
            .tracks
            .get_mut(usize::from(index))
            .ok_or_else(|| NetMdError::transport(format!("device rejected track {index} of {count}")))
    }

    fn dispatch(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        if templates::REQUEST_DISC_TITLE.matches(request, 7) {
            return Ok(title_reply(request, &self.image.title));
        }
        if templates::REQUEST_TRACK_TITLE.matches(request, 7) {
            let track = byte(request, offsets::TRACK)?;
            let title = self
                .image
                .tracks
                .get(usize::from(track))
                .map(|t| t.title.clone())
                .unwrap_or_default();
            return Ok(title_reply(request, &title));
        }
        if templates::WRITE_DISC_TITLE.matches(request, 7) {
            self.image.title = title_payload(request)?;
            return Ok(accepted(request));
        }
        if templates::SET_TRACK_TITLE.matches(request, 7) {
            let title = title_payload(request)?;
            self.track_mut(byte(request, offsets::TRACK)?)?.title = title;
            return Ok(accepted(request));
        }
        if templates::REQUEST_TRACK_TIME.matches(request, 6) {
            let track = self.track_mut(byte(request, offsets::TRACK)?)?.clone();
            return match request.get(10..12) {
                Some([0x00, 0x01]) => {
                    let mut reply = padded(request, layout::TRACK_TENTH + 1);
                    reply[layout::TRACK_MINUTE] = proper_to_bcd(track.minute);
                    reply[layout::TRACK_SECOND] = proper_to_bcd(track.second);
                    reply[layout::TRACK_TENTH] = proper_to_bcd(track.tenth);
                    Ok(reply)
                }
                Some([0x80, 0x07]) => {
                    let mut reply = padded(request, request.len() + 10);
                    let at = reply.len() - layout::ENCODING_FROM_END;
                    reply[at] = track.encoding.as_byte();
                    Ok(reply)
                }
                _ => Err(NetMdError::transport("unsupported track query")),
            };
        }
        if templates::REQUEST_TRACK_PROTECTION.matches(request, 6) {
            let protection = self.track_mut(byte(request, offsets::TRACK)?)?.protection;
            let mut reply = padded(request, request.len() + 3);
            let at = reply.len() - layout::PROTECTION_FROM_END;
            reply[at] = protection.as_byte();
            return Ok(reply);
        }
        if templates::MOVE_TRACK.matches(request, 3) {
            let from = usize::from(byte(request, offsets::MOVE_FROM)?);
            let to = usize::from(byte(request, offsets::MOVE_TO)?);
            let count = self.image.tracks.len();
            if from >= count || to >= count {
                return Err(NetMdError::transport(format!(
                    "device rejected move {from} -> {to} of {count}"
                )));
            }
            let track = self.image.tracks.remove(from);
            self.image.tracks.insert(to, track);
            return Ok(accepted(request));
        }
        if templates::DELETE_TRACK.matches(request, 3) {
            let track = byte(request, offsets::DELETE_TRACK)?;
            self.track_mut(track)?;
            self.image.tracks.remove(usize::from(track));
            return Ok(accepted(request));
        }
        if templates::REQUEST_PLAYBACK_STATUS.matches(request, 4) {
            let mut reply = padded(request, layout::POSITION_HUNDREDTH + 2);
            reply[layout::CURRENT_TRACK] = self.playhead[0];
            reply[layout::POSITION_MINUTE] = proper_to_bcd(self.playhead[1]);
            reply[layout::POSITION_SECOND] = proper_to_bcd(self.playhead[2]);
            reply[layout::POSITION_HUNDREDTH] = proper_to_bcd(self.playhead[3]);
            return Ok(reply);
        }
        if templates::START_RECORD.matches(request, 11) {
            let track = self.image.tracks.len();
            let index = u8::try_from(track).map_err(|_| NetMdError::transport("disc is full"))?;
            self.image.tracks.push(EmulatedTrack::new("", 0, 0, 0));
            self.recording = Some(Recording { track, received: 0 });
            self.status = IDLE_STATUS;
            let mut reply = templates::START_RECORD_REPLY.bytes.to_vec();
            reply[layout::RECORD_TRACK] = index;
            return Ok(reply);
        }
        if request == templates::BEGIN_TITLE.bytes || request == templates::END_RECORD.bytes {
            return Ok(accepted(request));
        }
        Err(NetMdError::transport(format!(
            "unsupported command {:02x?}",
            &request[..request.len().min(4)]
        )))
    }
}

impl Transport for EmulatedDevice {
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        self.tick()?;
        self.sent.push(request.to_vec());
        self.dispatch(request)
    }

    fn control_read(&mut self, _timeout: Duration) -> Result<[u8; 4]> {
        self.tick()?;
        Ok(self.scripted_status.pop_front().unwrap_or(self.status))
    }

    fn control_read_block(&mut self, len: usize, _timeout: Duration) -> Result<Vec<u8>> {
        self.tick()?;
        if let Some(recording) = self.recording.take() {
            if let Some(track) = self.image.tracks.get_mut(recording.track) {
                track.audio_len = recording.received;
            }
        }
        self.status = IDLE_STATUS;
        Ok(vec![0u8; len])
    }

    fn control_write(&mut self, request: &[u8], _timeout: Duration) -> Result<usize> {
        self.tick()?;
        self.control_writes.push(request.to_vec());
        if templates::FINISH_TOC.matches(request, 11) {
            self.status = TOC_WRITTEN_STATUS;
        }
        Ok(request.len())
    }

    fn bulk_write(&mut self, data: &[u8], _timeout: Duration) -> Result<usize> {
        self.tick()?;
        let recording = self
            .recording
            .as_mut()
            .ok_or_else(|| NetMdError::transport("bulk write outside of a recording"))?;
        recording.received += data.len();
        self.bulk.push(data.to_vec());
        self.status = self.completion_status.unwrap_or(TRANSFER_DONE_STATUS);
        Ok(data.len())
    }
}

fn byte(request: &[u8], offset: usize) -> Result<u8> {
    request
        .get(offset)
        .copied()
        .ok_or_else(|| NetMdError::transport("truncated command"))
}

fn accepted(request: &[u8]) -> Vec<u8> {
    let mut reply = request.to_vec();
    if let Some(status) = reply.first_mut() {
        *status = ACCEPTED;
    }
    reply
}

fn padded(request: &[u8], len: usize) -> Vec<u8> {
    let mut reply = accepted(request);
    reply.resize(len.max(reply.len()), 0);
    reply
}

fn title_reply(request: &[u8], title: &str) -> Vec<u8> {
    if title.is_empty() {
        let mut reply = accepted(request);
        reply.resize(layout::TITLE_ABSENT_LEN, 0);
        return reply;
    }
    let mut reply = padded(request, layout::TITLE_TEXT);
    reply.truncate(layout::TITLE_TEXT);
    reply.extend_from_slice(title.as_bytes());
    reply
}

fn title_payload(request: &[u8]) -> Result<String> {
    let len = usize::from(byte(request, offsets::NEW_LENGTH)?);
    let start = templates::WRITE_DISC_TITLE.len();
    let payload = request
        .get(start..start + len)
        .ok_or_else(|| NetMdError::transport("title payload shorter than declared"))?;
    Ok(String::from_utf8_lossy(payload).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_tracks_like_a_recorder() {
        let mut device = EmulatedDevice::from_image(DiscImage::blank("", 3));
        let mut request = templates::MOVE_TRACK.bytes.to_vec();
        request[offsets::MOVE_FROM] = 0;
        request[offsets::MOVE_TO] = 2;
        device.exchange(&request).unwrap();

        let titles: Vec<_> = device.image().tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["Track 2", "Track 3", "Track 1"]);
    }

    #[test]
    fn rejects_unknown_commands() {
        let mut device = EmulatedDevice::new();
        assert!(matches!(
            device.exchange(&[0x00, 0x18, 0x77]),
            Err(NetMdError::Transport(_))
        ));
    }

    #[test]
    fn injected_failure_stops_every_call() {
        let mut device = EmulatedDevice::new();
        device.fail_after(1);
        assert!(device.control_read(Duration::ZERO).is_ok());
        assert!(device.control_read(Duration::ZERO).is_err());
        assert!(device.exchange(templates::BEGIN_TITLE.bytes).is_err());
    }

    #[test]
    fn image_survives_a_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disc.json");
        let mut image = DiscImage::blank("0;Disc//1-2;Pair//", 2);
        image.tracks[1].encoding = Encoding::Lp4;

        image.save(&path).unwrap();
        assert_eq!(DiscImage::load(&path).unwrap(), image);
    }
}
