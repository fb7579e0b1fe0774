//! Recording a new track from a raw audio payload.
//!
//! The upload is a fixed sequence of device exchanges, modelled as a state
//! machine so that each step can be driven and checked on its own:
//!
//! ```text
//! Idle -> AwaitingRecordAck -> Syncing -> Streaming
//!      -> AwaitingCompletion -> Titling -> Closed
//! ```
//!
//! Any transport failure aborts the sequence. Nothing is rolled back; the
//! recorder is left mid-recording and has to be re-queried by the caller.

use std::ops::Range;

use crate::config::DeviceConfig;
use crate::frame::{self, layout, templates, templates::offsets, Patch};
use crate::transport::{self, IDLE_STATUS};
use crate::{NetMdDevice, NetMdError, Result, Transport};

/// Payload block size the device accounts for in the record size field.
pub const RECORD_BLOCK: usize = 0x3F18;
/// Largest forward length a splice header may announce.
pub const MAX_FORWARD_LENGTH: usize = 0x3F00;

/// On-wire size announced in the start-record command.
pub fn record_size(payload_len: usize) -> usize {
    payload_len / RECORD_BLOCK * 8 + payload_len + 8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    AwaitingRecordAck,
    Syncing,
    Streaming,
    AwaitingCompletion,
    Titling,
    Closed,
}

/// A splice header inserted in front of payload offset `at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Splice {
    pub at: usize,
    /// Payload bytes until the next splice point, capped at
    /// [`MAX_FORWARD_LENGTH`].
    pub forward_length: u16,
}

impl Splice {
    pub fn header(&self) -> Result<Vec<u8>> {
        frame::build(
            &templates::SPLICE_HEADER,
            &[Patch::u16_be(offsets::SPLICE_LENGTH, self.forward_length)],
        )
    }
}

/// One bulk write: a payload range and at most one splice inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub payload: Range<usize>,
    pub splice: Option<Splice>,
}

impl Chunk {
    /// Bytes put on the wire for this chunk.
    pub fn wire_len(&self) -> usize {
        self.payload.len() + self.splice.map_or(0, |_| templates::SPLICE_HEADER.len())
    }

    /// Assembles the bytes of this chunk from the full payload.
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let data = payload.get(self.payload.clone()).ok_or(NetMdError::BufferTooSmall {
            needed: self.payload.end,
            capacity: payload.len(),
        })?;
        let Some(splice) = self.splice else {
            return Ok(data.to_vec());
        };
        let (before, after) = data.split_at(splice.at - self.payload.start);
        let mut wire = Vec::with_capacity(self.wire_len());
        wire.extend_from_slice(before);
        wire.extend_from_slice(&splice.header()?);
        wire.extend_from_slice(after);
        Ok(wire)
    }
}

/// Cuts a payload into bulk writes and places the splice headers.
///
/// Splice points sit every `interval` payload bytes starting at offset 0.
/// The distance to the next one is recomputed from the current offset before
/// every chunk.
#[derive(Debug, Clone)]
pub struct ChunkPlanner {
    len: usize,
    offset: usize,
    chunk_size: usize,
    interval: usize,
}

impl ChunkPlanner {
    pub fn new(len: usize, chunk_size: usize, interval: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(NetMdError::InvalidSize(chunk_size));
        }
        if interval <= chunk_size {
            return Err(NetMdError::InvalidSize(interval));
        }
        Ok(Self {
            len,
            offset: 0,
            chunk_size,
            interval,
        })
    }

    pub fn from_config(len: usize, config: &DeviceConfig) -> Result<Self> {
        Self::new(len, config.chunk_size, config.splice_interval)
    }

    fn distance_to_splice(&self) -> usize {
        match self.offset % self.interval {
            0 => 0,
            into => self.interval - into,
        }
    }
}

impl Iterator for ChunkPlanner {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.offset >= self.len {
            return None;
        }
        let size = self.chunk_size.min(self.len - self.offset);
        let distance = self.distance_to_splice();
        let splice = (distance < size).then(|| {
            let at = self.offset + distance;
            let forward = (self.len - at).min(self.interval).min(MAX_FORWARD_LENGTH);
            Splice {
                at,
                forward_length: forward as u16,
            }
        });
        let chunk = Chunk {
            payload: self.offset..self.offset + size,
            splice,
        };
        self.offset += size;
        Some(chunk)
    }
}

/// What a finished upload produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub track: u8,
    pub wire_bytes: usize,
    pub splices: Vec<Splice>,
    pub status: Vec<u8>,
}

/// Drives one recording. Each step checks that it runs in the right state.
pub struct Upload<'a, T> {
    device: &'a mut NetMdDevice<T>,
    payload: &'a [u8],
    title: String,
    state: UploadState,
    planner: ChunkPlanner,
    track: Option<u8>,
    wire_bytes: usize,
    splices: Vec<Splice>,
    status: Vec<u8>,
}

impl<'a, T: Transport> Upload<'a, T> {
    pub fn new(
        device: &'a mut NetMdDevice<T>,
        payload: &'a [u8],
        title: impl Into<String>,
    ) -> Result<Self> {
        // The recorder only reports completion after it has taken in data.
        if payload.is_empty() {
            return Err(NetMdError::InvalidSize(0));
        }
        let planner = ChunkPlanner::from_config(payload.len(), &device.config().device)?;
        Ok(Self {
            device,
            payload,
            title: title.into(),
            state: UploadState::Idle,
            planner,
            track: None,
            wire_bytes: 0,
            splices: Vec::new(),
            status: Vec::new(),
        })
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Track number the recorder assigned, once acknowledged.
    pub fn track(&self) -> Option<u8> {
        self.track
    }

    pub fn splices(&self) -> &[Splice] {
        &self.splices
    }

    fn expect_state(&self, allowed: &[UploadState], step: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(NetMdError::msg(format!(
                "upload step '{step}' is not valid in state {:?}",
                self.state
            )))
        }
    }

    fn require_track(&self) -> Result<u8> {
        self.track
            .ok_or_else(|| NetMdError::msg("recorder never acknowledged the recording"))
    }

    /// Idle -> AwaitingRecordAck: announces the recording and captures the
    /// new track number.
    pub fn start_record(&mut self) -> Result<u8> {
        self.expect_state(&[UploadState::Idle], "start record")?;
        let size = record_size(self.payload.len());
        if size > 0x00FF_FFFF {
            return Err(NetMdError::InvalidSize(size));
        }
        let request = frame::build(
            &templates::START_RECORD,
            &[Patch::u24_be(offsets::RECORD_SIZE, size as u32)],
        )?;
        let reply = self
            .device
            .exchange_expecting(&request, &templates::START_RECORD_REPLY)?;
        let track = frame::byte_at(&reply, layout::RECORD_TRACK)?;
        tracing::info!(track, payload = self.payload.len(), size, "recording started");

        self.track = Some(track);
        self.state = UploadState::AwaitingRecordAck;
        Ok(track)
    }

    /// AwaitingRecordAck -> Syncing: waits for the all-zero status word.
    pub fn wait_for_sync(&mut self) -> Result<()> {
        self.expect_state(&[UploadState::AwaitingRecordAck], "wait for sync")?;
        let timeout = self.device.config().timeouts.poll();
        transport::poll_until(self.device.transport_mut(), timeout, |s| *s == IDLE_STATUS)?;
        self.state = UploadState::Syncing;
        Ok(())
    }

    /// Sends the next chunk. Returns `false` once the payload is exhausted.
    pub fn stream_chunk(&mut self) -> Result<bool> {
        self.expect_state(&[UploadState::Syncing, UploadState::Streaming], "stream")?;
        self.state = UploadState::Streaming;
        let Some(chunk) = self.planner.next() else {
            return Ok(false);
        };

        let wire = chunk.encode(self.payload)?;
        tracing::debug!(
            offset = chunk.payload.start,
            payload = chunk.payload.len(),
            wire = wire.len(),
            splice = ?chunk.splice,
            "sending chunk"
        );
        let timeout = self.device.config().timeouts.bulk();
        let written = self.device.transport_mut().bulk_write(&wire, timeout)?;
        transport::expect_written(written, wire.len())?;

        self.wire_bytes += wire.len();
        self.splices.extend(chunk.splice);
        Ok(true)
    }

    /// Streams every remaining chunk.
    pub fn stream(&mut self) -> Result<()> {
        while self.stream_chunk()? {}
        Ok(())
    }

    /// Streaming -> AwaitingCompletion: waits for the recorder to report the
    /// transfer and reads its status block.
    pub fn await_completion(&mut self) -> Result<&[u8]> {
        self.expect_state(&[UploadState::Streaming], "await completion")?;
        let timeouts = self.device.config().timeouts.clone();
        let transport = self.device.transport_mut();
        let status = transport::poll_until(transport, timeouts.poll(), |s| *s != IDLE_STATUS)?;

        let size = usize::from(status[layout::STATUS_BLOCK_LEN]);
        if size < 1 {
            return Err(NetMdError::InvalidSize(size));
        }
        self.status = transport.control_read_block(size, timeouts.status())?;
        tracing::trace!(status = %hex::encode(&self.status), "transfer status");

        self.state = UploadState::AwaitingCompletion;
        Ok(&self.status)
    }

    /// AwaitingCompletion -> Titling: names the new track between the two
    /// marker commands.
    pub fn title_track(&mut self) -> Result<()> {
        self.expect_state(&[UploadState::AwaitingCompletion], "title track")?;
        let track = self.require_track()?;
        self.device.exchange(templates::BEGIN_TITLE.bytes)?;
        self.device.set_track_title(track, &self.title)?;
        self.device.exchange(templates::END_RECORD.bytes)?;
        self.state = UploadState::Titling;
        Ok(())
    }

    /// Titling -> Closed: ends TOC editing and waits for the recorder.
    pub fn close(&mut self) -> Result<()> {
        self.expect_state(&[UploadState::Titling], "close")?;
        let timeouts = self.device.config().timeouts.clone();
        let transport = self.device.transport_mut();
        let written =
            transport.control_write(templates::FINISH_TOC.bytes, timeouts.control_write())?;
        transport::expect_written(written, templates::FINISH_TOC.len())?;
        transport::poll_until(transport, timeouts.poll(), |s| *s != IDLE_STATUS)?;
        self.state = UploadState::Closed;
        Ok(())
    }

    /// Runs the whole sequence.
    pub fn run(mut self) -> Result<UploadReport> {
        self.start_record()?;
        self.wait_for_sync()?;
        self.stream()?;
        self.await_completion()?;
        self.title_track()?;
        self.close()?;

        let report = UploadReport {
            track: self.require_track()?,
            wire_bytes: self.wire_bytes,
            splices: self.splices,
            status: self.status,
        };
        tracing::info!(
            track = report.track,
            wire_bytes = report.wire_bytes,
            splices = report.splices.len(),
            "upload finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::emulator::{DiscImage, EmulatedDevice};

    const INTERVAL: usize = 0x3F10;

    fn planner(len: usize) -> ChunkPlanner {
        ChunkPlanner::from_config(len, &DeviceConfig::default()).unwrap()
    }

    fn device() -> NetMdDevice<EmulatedDevice> {
        NetMdDevice::new(EmulatedDevice::from_image(DiscImage::blank("0;Disc//", 2)))
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn two_intervals_get_exactly_two_splices() {
        let chunks: Vec<_> = planner(INTERVAL * 2).collect();
        let splices: Vec<_> = chunks.iter().filter_map(|c| c.splice).collect();

        assert_eq!(
            splices,
            vec![
                Splice { at: 0, forward_length: 0x3F00 },
                Splice { at: INTERVAL, forward_length: 0x3F00 },
            ]
        );
        assert!(chunks.iter().all(|c| c.payload.len() <= 0x1000));
    }

    #[test]
    fn short_tail_reports_its_own_length() {
        let splices: Vec<_> = planner(INTERVAL + 0x100).filter_map(|c| c.splice).collect();
        assert_eq!(splices[1], Splice { at: INTERVAL, forward_length: 0x100 });
    }

    #[test]
    fn splice_inside_chunk_widens_the_write() {
        let data = payload(0x5000);
        let chunk = planner(data.len())
            .find(|c| c.splice.is_some_and(|s| s.at == INTERVAL))
            .unwrap();
        assert_eq!(chunk.payload, 0x3000..0x4000);

        let wire = chunk.encode(&data).unwrap();
        assert_eq!(wire.len(), 0x1000 + 16);
        let cut = INTERVAL - 0x3000;
        assert_eq!(&wire[..cut], &data[0x3000..INTERVAL]);
        assert_eq!(&wire[cut + 6..cut + 8], &[0x10, 0xF0]);
        assert_eq!(&wire[cut + 8..cut + 16], &templates::SPLICE_HEADER.bytes[8..]);
        assert_eq!(&wire[cut + 16..], &data[INTERVAL..0x4000]);
    }

    #[test]
    fn planner_rejects_degenerate_sizes() {
        assert!(matches!(ChunkPlanner::new(10, 0, INTERVAL), Err(NetMdError::InvalidSize(0))));
        assert!(ChunkPlanner::new(10, 0x1000, 0x1000).is_err());
    }

    #[test]
    fn record_size_follows_device_formula() {
        assert_eq!(record_size(0), 8);
        assert_eq!(record_size(0x3F17), 0x3F17 + 8);
        assert_eq!(record_size(0x3F18), 0x3F18 + 16);
    }

    #[test]
    fn full_upload_records_and_titles_a_track() {
        let mut device = device();
        let data = payload(0x5000);
        let report = Upload::new(&mut device, &data, "New Song").unwrap().run().unwrap();

        assert_eq!(report.track, 2);
        assert_eq!(report.splices.len(), 2);
        assert_eq!(report.wire_bytes, data.len() + 2 * 16);
        assert_eq!(report.status.len(), 8);

        let emulator = device.transport();
        let start = &emulator.sent()[0];
        let size = record_size(data.len());
        assert_eq!(
            &start[27..30],
            &[(size >> 16) as u8, (size >> 8) as u8, size as u8]
        );
        assert_eq!(emulator.bulk_writes().len(), 5);
        assert_eq!(&emulator.bulk_writes()[0][6..8], &[0x3F, 0x00]);

        let track = &emulator.image().tracks[2];
        assert_eq!(track.title, "New Song");
        assert_eq!(track.audio_len, report.wire_bytes);
        assert_eq!(emulator.control_writes(), &[templates::FINISH_TOC.bytes.to_vec()]);

        let names: Vec<_> = emulator.sent().iter().skip(1).map(|f| f[..3].to_vec()).collect();
        assert_eq!(
            names,
            vec![
                templates::BEGIN_TITLE.bytes[..3].to_vec(),
                templates::SET_TRACK_TITLE.bytes[..3].to_vec(),
                templates::END_RECORD.bytes[..3].to_vec(),
            ]
        );
    }

    #[test]
    fn sync_wait_polls_until_idle() {
        let mut device = device();
        device.transport_mut().script_status([[0, 0, 1, 0], [0, 1, 0, 0]]);
        let data = payload(16);
        let mut upload = Upload::new(&mut device, &data, "x").unwrap();

        upload.start_record().unwrap();
        upload.wait_for_sync().unwrap();
        assert_eq!(upload.state(), UploadState::Syncing);
    }

    #[test]
    fn zero_status_size_is_invalid() {
        let mut device = device();
        device.transport_mut().set_completion_status([0x01, 0x00, 0x00, 0x00]);
        let data = payload(64);
        let mut upload = Upload::new(&mut device, &data, "x").unwrap();

        upload.start_record().unwrap();
        upload.wait_for_sync().unwrap();
        upload.stream().unwrap();
        assert!(matches!(upload.await_completion(), Err(NetMdError::InvalidSize(0))));
    }

    #[test]
    fn empty_payload_is_refused_up_front() {
        let mut device = device();
        assert!(matches!(
            Upload::new(&mut device, &[], "x"),
            Err(NetMdError::InvalidSize(0))
        ));
        assert!(device.transport().sent().is_empty());
        assert_eq!(device.transport().image().tracks.len(), 2);
    }

    #[test]
    fn steps_must_run_in_order() {
        let mut device = device();
        let data = payload(64);
        let mut upload = Upload::new(&mut device, &data, "x").unwrap();

        assert!(matches!(upload.stream_chunk(), Err(NetMdError::Message(_))));
        assert!(matches!(upload.close(), Err(NetMdError::Message(_))));
        assert_eq!(upload.state(), UploadState::Idle);
    }

    #[test]
    fn transport_failure_aborts_the_upload() {
        let mut device = device();
        // start record, one sync poll, then the first bulk write fails
        device.transport_mut().fail_after(2);
        let data = payload(0x2000);

        let err = Upload::new(&mut device, &data, "x").unwrap().run().unwrap_err();
        assert!(matches!(err, NetMdError::Transport(_)));
        assert!(device.transport().bulk_writes().is_empty());
    }

    proptest! {
        #[test]
        fn chunks_cover_the_payload_in_order(len in 0usize..0x12000) {
            let chunks: Vec<_> = planner(len).collect();
            let mut next = 0;
            for chunk in &chunks {
                prop_assert_eq!(chunk.payload.start, next);
                prop_assert!(chunk.payload.len() <= 0x1000);
                if let Some(splice) = chunk.splice {
                    prop_assert!(chunk.payload.contains(&splice.at));
                    prop_assert_eq!(splice.at % INTERVAL, 0);
                    prop_assert!(usize::from(splice.forward_length) <= MAX_FORWARD_LENGTH);
                }
                next = chunk.payload.end;
            }
            prop_assert_eq!(next, len);
            let splices = chunks.iter().filter(|c| c.splice.is_some()).count();
            prop_assert_eq!(splices, len.div_ceil(INTERVAL));
        }
    }
}
