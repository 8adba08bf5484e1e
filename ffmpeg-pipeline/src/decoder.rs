use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use ffmpeg_next::Rational;
use tokio::{runtime::Handle, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    backend::FrameDecoder,
    context::PipelineContext,
    event::{self, PlayerEvent},
    frame::RawVideoFrame,
    queue::{FrameQueue, PacketQueue},
    screenshot::{self, ScreenshotSlot},
    stream::StreamSlot,
};

/// Presentation-time based drop gate.
///
/// The first frame anchors wall-clock time to its PTS. A later frame is late
/// when more wall-clock time than media time has passed since the anchor, by
/// more than `threshold`. A late keyframe re-anchors instead of being dropped.
pub struct LatencyGate {
    threshold: Duration,
    time_base: Rational,
    anchor: Option<(Instant, i64)>,
}

impl LatencyGate {
    pub fn new(threshold: Duration, time_base: Rational) -> Self {
        Self {
            threshold,
            time_base,
            anchor: None,
        }
    }

    pub fn is_late(&mut self, pts: Option<i64>, is_key: bool, now: Instant) -> bool {
        let Some(pts) = pts else {
            return false;
        };
        let Some((anchor_at, anchor_pts)) = self.anchor else {
            self.anchor = Some((now, pts));
            return false;
        };

        let media = ticks_to_duration(pts - anchor_pts, self.time_base);
        let wall = now.saturating_duration_since(anchor_at);
        if wall <= media + self.threshold {
            return false;
        }
        if is_key {
            self.anchor = Some((now, pts));
            return false;
        }
        true
    }
}

fn ticks_to_duration(ticks: i64, time_base: Rational) -> Duration {
    let (num, den) = (time_base.numerator() as i128, time_base.denominator() as i128);
    if ticks <= 0 || num <= 0 || den <= 0 {
        return Duration::ZERO;
    }
    let nanos = ticks as i128 * num * 1_000_000_000 / den;
    Duration::from_nanos(nanos.min(u64::MAX as i128) as u64)
}

#[derive(Debug, Default)]
struct DecodeStats {
    packets: u64,
    displayed: u64,
    dropped_full: u64,
    dropped_late: u64,
    discarded: u64,
}

struct DecodeLoop {
    ctx: PipelineContext,
    decoder: Box<dyn FrameDecoder>,
    display: FrameQueue,
    screenshot: ScreenshotSlot,
    gate: Option<LatencyGate>,
    runtime: Handle,
    first_frame_sent: bool,
    stats: DecodeStats,
}

impl DecodeLoop {
    fn run(&mut self, decode: &PacketQueue, cancel: &CancellationToken) {
        while !cancel.is_cancelled() {
            let Some(packet) = decode.pop() else {
                std::thread::sleep(self.ctx.config.decode_idle());
                continue;
            };
            self.stats.packets += 1;

            if !self.first_frame_sent && packet.is_key() {
                self.first_frame_sent = true;
                event::emit(&self.ctx.events, PlayerEvent::FirstFrame);
            }

            let sent = self.decoder.send_packet(&packet);
            drop(packet);
            if let Err(e) = sent {
                log::debug!("send packet error: {:#}", e);
                continue;
            }

            loop {
                match self.decoder.receive_frame() {
                    Ok(Some(frame)) => self.handle_frame(frame),
                    Ok(None) => break,
                    Err(e) => {
                        log::debug!("receive frame error: {:#}", e);
                        break;
                    }
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: RawVideoFrame) {
        if let Some(gate) = self.gate.as_mut() {
            if gate.is_late(frame.pts(), frame.is_key(), Instant::now()) {
                self.stats.dropped_late += 1;
                log::trace!("drop late frame pts: {:?}", frame.pts());
                return;
            }
        }

        let host = match self.decoder.transfer(&frame) {
            Ok(host) => host,
            Err(e) => {
                self.stats.discarded += 1;
                log::warn!("{:#}", e);
                return;
            }
        };
        drop(frame);

        if !host.has_image_planes() {
            self.stats.discarded += 1;
            log::warn!("transferred frame is missing image planes: {}", host);
            return;
        }

        if let Some(path) = self.screenshot.take() {
            screenshot::spawn_job(
                &self.runtime,
                self.ctx.clone(),
                self.screenshot.clone(),
                host.clone(),
                path,
            );
        }

        match self
            .display
            .push_bounded(host, self.ctx.config.display_capacity)
        {
            Ok(()) => self.stats.displayed += 1,
            Err(dropped) => {
                self.stats.dropped_full += 1;
                log::debug!("display queue full, drop one frame pts: {:?}", dropped.pts());
            }
        }
    }
}

/// What the decode loop reads from and writes to.
struct DecodeIo {
    decode: PacketQueue,
    display: FrameQueue,
    stream_slot: StreamSlot,
    screenshot: ScreenshotSlot,
    runtime: Handle,
}

/// Hardware decode worker feeding the display queue.
pub struct DecoderTask {
    cancel: CancellationToken,
    session: CancellationToken,
    handle: Option<JoinHandle<()>>,
    screenshot: ScreenshotSlot,
}

impl DecoderTask {
    pub fn new() -> Self {
        Self::with_session(&CancellationToken::new())
    }

    /// A decoder that cannot be initialized cancels `session`, ending the
    /// other workers watching it.
    pub fn with_session(session: &CancellationToken) -> Self {
        Self {
            cancel: session.child_token(),
            session: session.clone(),
            handle: None,
            screenshot: ScreenshotSlot::new(),
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn start(
        &mut self,
        ctx: PipelineContext,
        decode: PacketQueue,
        display: FrameQueue,
        stream_slot: StreamSlot,
    ) {
        let cancel = self.cancel.clone();
        let session = self.session.clone();
        let screenshot = self.screenshot.clone();
        let runtime = Handle::current();
        self.handle = Some(tokio::task::spawn_blocking(move || {
            let io = DecodeIo {
                decode,
                display,
                stream_slot,
                screenshot,
                runtime,
            };
            Self::decoder_loop(ctx, io, cancel, session)
        }));
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                log::error!("decoder task join error: {}", e);
            }
        }
    }

    /// Returns false if the request was dropped because another one is outstanding.
    pub fn request_screenshot(&self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        let accepted = self.screenshot.request(path.clone());
        if accepted {
            log::debug!("screenshot request received for {}", path.display());
        } else {
            log::info!(
                "screenshot request for {} dropped, another one is in progress",
                path.display()
            );
        }
        accepted
    }

    fn decoder_loop(
        ctx: PipelineContext,
        io: DecodeIo,
        cancel: CancellationToken,
        session: CancellationToken,
    ) {
        let DecodeIo {
            decode,
            display,
            stream_slot,
            screenshot,
            runtime,
        } = io;

        let stream = loop {
            if cancel.is_cancelled() {
                return;
            }
            if let Some(stream) = stream_slot.get() {
                break stream.clone();
            }
            std::thread::sleep(ctx.config.stream_poll());
        };

        let decoder = match ctx.backend.open_decoder(&stream, &ctx.config) {
            Ok(decoder) => decoder,
            Err(e) => {
                log::error!("{}", e);
                // nothing would consume the decode queue any more
                session.cancel();
                decode.clear();
                event::emit(&ctx.events, PlayerEvent::StreamFailed(e));
                return;
            }
        };

        let gate = ctx
            .config
            .max_display_latency()
            .map(|threshold| LatencyGate::new(threshold, stream.time_base()));
        let mut state = DecodeLoop {
            ctx,
            decoder,
            display,
            screenshot,
            gate,
            runtime,
            first_frame_sent: false,
            stats: DecodeStats::default(),
        };
        state.run(&decode, &cancel);

        log::info!("decoder task finished: {:?}", state.stats);
    }
}

impl Default for DecoderTask {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DecoderTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[path = "decoder_test.rs"]
mod decoder_test;
