//! Synthetic media backend for exercising the workers without a network
//! stream or a GPU. Packets and frames are real FFmpeg objects with made-up
//! payloads.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use ffmpeg_next::{
    Rational,
    codec::{
        Parameters,
        packet::{Flags, Packet},
    },
    format::Pixel,
    frame::Video,
};
use tokio_util::sync::CancellationToken;

use crate::{
    backend::{FrameDecoder, MediaBackend, PacketMuxer, PacketSource},
    config::PipelineConfig,
    error::StreamError,
    event::{EventReceiver, PlayerEvent},
    frame::RawVideoFrame,
    packet::RawPacket,
    stream::AvStream,
};

pub const INPUT_TIME_BASE: Rational = Rational(1, 90000);
pub const OUTPUT_TIME_BASE: Rational = Rational(1, 30000);

#[derive(Debug, Clone, Copy)]
pub struct MockPacket {
    pub pts: i64,
    pub key: bool,
    pub stream: usize,
}

/// `count` video packets on stream 0, 3000 ticks apart, keyframes at `keys`.
pub fn video_packets(count: usize, keys: &[usize]) -> Vec<MockPacket> {
    (0..count)
        .map(|i| MockPacket {
            pts: 3000 * i as i64,
            key: keys.contains(&i),
            stream: 0,
        })
        .collect()
}

pub fn raw_packet(p: MockPacket) -> RawPacket {
    let mut packet = Packet::copy(&[0, 0, 0, 1, if p.key { 0x65 } else { 0x41 }]);
    packet.set_pts(Some(p.pts));
    packet.set_dts(Some(p.pts));
    packet.set_stream(p.stream);
    if p.key {
        packet.set_flags(Flags::KEY);
    }
    RawPacket::from((packet, INPUT_TIME_BASE))
}

pub fn video_stream() -> AvStream {
    AvStream::new(0, Parameters::new(), INPUT_TIME_BASE, Rational(30, 1))
}

/// Intervals short enough for tests to run quickly.
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        stream_poll_ms: 2,
        decode_idle_ms: 2,
        record_poll_ms: 2,
        record_idle_ms: 5,
        ..PipelineConfig::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrittenPacket {
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub stream: usize,
    pub key: bool,
}

#[derive(Clone)]
pub struct MockBackend {
    pub packets: Vec<MockPacket>,
    /// Delay before every packet is handed out.
    pub spacing: Duration,
    /// Returned once the packets run out. `None` blocks until cancelled.
    pub end: Option<StreamError>,
    pub open_error: Option<StreamError>,
    pub decoder_error: Option<StreamError>,
    pub muxer_error: Option<String>,
    pub screenshot_delay: Duration,
    /// Makes `save_screenshot` panic, as a crashing encoder would.
    pub screenshot_panic: bool,
    pub written: Arc<Mutex<Vec<WrittenPacket>>>,
    pub finished: Arc<AtomicUsize>,
    pub screenshots: Arc<Mutex<Vec<(PathBuf, Option<i64>)>>>,
}

impl MockBackend {
    pub fn new(packets: Vec<MockPacket>) -> Self {
        Self {
            packets,
            spacing: Duration::ZERO,
            end: None,
            open_error: None,
            decoder_error: None,
            muxer_error: None,
            screenshot_delay: Duration::from_millis(20),
            screenshot_panic: false,
            written: Arc::new(Mutex::new(Vec::new())),
            finished: Arc::new(AtomicUsize::new(0)),
            screenshots: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn written(&self) -> Vec<WrittenPacket> {
        self.written.lock().unwrap().clone()
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn screenshots(&self) -> Vec<(PathBuf, Option<i64>)> {
        self.screenshots.lock().unwrap().clone()
    }
}

impl MediaBackend for MockBackend {
    fn open_input(
        &self,
        _url: &str,
        _config: &PipelineConfig,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn PacketSource>, StreamError> {
        if let Some(e) = &self.open_error {
            return Err(e.clone());
        }
        Ok(Box::new(MockSource {
            stream: video_stream(),
            packets: self.packets.iter().copied().collect(),
            spacing: self.spacing,
            end: self.end.clone(),
            cancel: cancel.clone(),
        }))
    }

    fn open_decoder(
        &self,
        _stream: &AvStream,
        _config: &PipelineConfig,
    ) -> Result<Box<dyn FrameDecoder>, StreamError> {
        if let Some(e) = &self.decoder_error {
            return Err(e.clone());
        }
        Ok(Box::new(MockDecoder::default()))
    }

    fn open_muxer(&self, path: &Path, _stream: &AvStream) -> anyhow::Result<Box<dyn PacketMuxer>> {
        if let Some(reason) = &self.muxer_error {
            anyhow::bail!("{}: {}", path.display(), reason);
        }
        Ok(Box::new(MockMuxer {
            written: self.written.clone(),
            finished: self.finished.clone(),
        }))
    }

    fn save_screenshot(&self, frame: &RawVideoFrame, path: &Path) -> anyhow::Result<()> {
        std::thread::sleep(self.screenshot_delay);
        if self.screenshot_panic {
            panic!("encoder crashed on {}", path.display());
        }
        self.screenshots
            .lock()
            .unwrap()
            .push((path.to_path_buf(), frame.pts()));
        Ok(())
    }
}

struct MockSource {
    stream: AvStream,
    packets: VecDeque<MockPacket>,
    spacing: Duration,
    end: Option<StreamError>,
    cancel: CancellationToken,
}

impl PacketSource for MockSource {
    fn stream(&self) -> &AvStream {
        &self.stream
    }

    fn read_packet(&mut self) -> Result<RawPacket, StreamError> {
        if let Some(p) = self.packets.pop_front() {
            std::thread::sleep(self.spacing);
            return Ok(raw_packet(p));
        }
        if let Some(e) = &self.end {
            return Err(e.clone());
        }
        while !self.cancel.is_cancelled() {
            std::thread::sleep(Duration::from_millis(2));
        }
        Err(StreamError::Timeout)
    }
}

/// One 64x48 NV12 frame per packet, carrying the packet's pts.
#[derive(Default)]
struct MockDecoder {
    pending: VecDeque<Option<i64>>,
}

impl FrameDecoder for MockDecoder {
    fn send_packet(&mut self, packet: &RawPacket) -> anyhow::Result<()> {
        self.pending.push_back(packet.pts());
        Ok(())
    }

    fn receive_frame(&mut self) -> anyhow::Result<Option<RawVideoFrame>> {
        Ok(self.pending.pop_front().map(|pts| {
            let mut frame = Video::new(Pixel::NV12, 64, 48);
            frame.set_pts(pts);
            RawVideoFrame::from(frame)
        }))
    }

    fn transfer(&mut self, frame: &RawVideoFrame) -> anyhow::Result<RawVideoFrame> {
        Ok(frame.clone())
    }
}

struct MockMuxer {
    written: Arc<Mutex<Vec<WrittenPacket>>>,
    finished: Arc<AtomicUsize>,
}

impl PacketMuxer for MockMuxer {
    fn time_base(&self) -> Rational {
        OUTPUT_TIME_BASE
    }

    fn write_interleaved(&mut self, packet: RawPacket) -> anyhow::Result<()> {
        self.written.lock().unwrap().push(WrittenPacket {
            pts: packet.pts(),
            dts: packet.dts(),
            stream: packet.index(),
            key: packet.is_key(),
        });
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

pub fn drain_events(rx: &mut EventReceiver) -> Vec<PlayerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
