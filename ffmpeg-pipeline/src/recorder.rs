use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    backend::PacketMuxer,
    context::PipelineContext,
    event::{self, PlayerEvent},
    packet::RawPacket,
    queue::PacketQueue,
    stream::AvStream,
};

struct RecordTarget {
    path: PathBuf,
    stream: AvStream,
}

/// Armed flag plus the target handed over by the last `start_record`.
#[derive(Clone, Default)]
struct RecordControl {
    armed: Arc<AtomicBool>,
    pending: Arc<Mutex<Option<RecordTarget>>>,
}

impl RecordControl {
    fn take_pending(&self) -> Option<RecordTarget> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// One recording, from `start_record` until the file is finalized. Armed while
/// `muxer` is `None`, writing once a keyframe opened it.
struct RecordingSession {
    path: PathBuf,
    stream: AvStream,
    epoch: i64,
    muxer: Option<Box<dyn PacketMuxer>>,
    written: u64,
}

impl RecordingSession {
    fn new(target: RecordTarget) -> Self {
        Self {
            path: target.path,
            stream: target.stream,
            epoch: 0,
            muxer: None,
            written: 0,
        }
    }

    fn open(&mut self, ctx: &PipelineContext, keyframe: &RawPacket) -> anyhow::Result<()> {
        log::debug!(
            "key frame detected, starting record initialization for {}",
            self.path.display()
        );
        let muxer = ctx.backend.open_muxer(&self.path, &self.stream)?;
        self.epoch = keyframe.pts().or(keyframe.dts()).unwrap_or(0);
        self.muxer = Some(muxer);
        log::info!(
            "recording started to {}, epoch pts: {}",
            self.path.display(),
            self.epoch
        );
        Ok(())
    }

    fn write(&mut self, mut packet: RawPacket) {
        let Some(muxer) = self.muxer.as_mut() else {
            return;
        };
        packet.rebase(self.epoch);
        packet.rescale_ts(self.stream.time_base(), muxer.time_base());
        let p = packet.get_mut();
        p.set_stream(0);
        p.set_position(-1);

        match muxer.write_interleaved(packet) {
            Ok(()) => self.written += 1,
            Err(e) => log::warn!("error muxing packet: {:#}", e),
        }
    }

    fn finalize(self, ctx: &PipelineContext) {
        let Some(mut muxer) = self.muxer else {
            log::info!(
                "recording to {} stopped before any key frame arrived",
                self.path.display()
            );
            return;
        };
        if let Err(e) = muxer.finish() {
            log::warn!("{:#}", e);
        }
        // closes the output
        drop(muxer);
        log::info!(
            "recording stopped and file saved to {} ({} packets)",
            self.path.display(),
            self.written
        );
        event::emit(&ctx.events, PlayerEvent::RecordFinished { path: self.path });
    }
}

/// Remux worker: drains the record queue while idle, and once armed writes
/// everything from the next keyframe on into the target file.
pub struct RecorderTask {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    control: RecordControl,
}

impl RecorderTask {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            handle: None,
            control: RecordControl::default(),
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, ctx: PipelineContext, queue: PacketQueue) {
        let cancel = self.cancel.clone();
        let control = self.control.clone();
        self.handle = Some(tokio::task::spawn_blocking(move || {
            Self::record_loop(ctx, queue, control, cancel)
        }));
    }

    pub fn stop(&self) {
        self.cancel.cancel();
        self.control.armed.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                log::error!("record task join error: {}", e);
            }
        }
    }

    /// Arms the recorder. Returns false, changing nothing, if a recording is
    /// already active.
    pub fn start_record(&self, path: &Path, stream: AvStream) -> bool {
        if self.control.armed.load(Ordering::SeqCst) {
            return false;
        }
        *self
            .control
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(RecordTarget {
            path: path.to_path_buf(),
            stream,
        });
        self.control.armed.store(true, Ordering::SeqCst);
        log::info!("record requested to {}", path.display());
        true
    }

    pub fn stop_record(&self) {
        self.control.armed.store(false, Ordering::SeqCst);
    }

    pub fn is_recording(&self) -> bool {
        self.control.armed.load(Ordering::SeqCst)
    }

    fn record_loop(
        ctx: PipelineContext,
        queue: PacketQueue,
        control: RecordControl,
        cancel: CancellationToken,
    ) {
        let mut session: Option<RecordingSession> = None;

        while !cancel.is_cancelled() {
            if !control.armed.load(Ordering::SeqCst) {
                if let Some(finished) = session.take() {
                    finished.finalize(&ctx);
                }
                let dropped = queue.clear();
                if dropped > 0 {
                    log::trace!("record idle, discarded {} packets", dropped);
                }
                std::thread::sleep(ctx.config.record_idle());
                continue;
            }

            // a stop/start pair the loop did not observe still closes the old file
            if let Some(target) = control.take_pending() {
                if let Some(finished) = session.take() {
                    finished.finalize(&ctx);
                }
                session = Some(RecordingSession::new(target));
            }

            let Some(active) = session.as_mut() else {
                std::thread::sleep(ctx.config.record_poll());
                continue;
            };

            let Some(packet) = queue.pop() else {
                std::thread::sleep(ctx.config.record_poll());
                continue;
            };

            if active.muxer.is_none() {
                if !packet.is_key() {
                    continue;
                }
                if let Err(e) = active.open(&ctx, &packet) {
                    log::warn!("recording setup failed: {:#}", e);
                    control.armed.store(false, Ordering::SeqCst);
                    if let Some(failed) = session.take() {
                        event::emit(
                            &ctx.events,
                            PlayerEvent::RecordFailed {
                                path: failed.path,
                                reason: format!("{:#}", e),
                            },
                        );
                    }
                    continue;
                }
                event::emit(
                    &ctx.events,
                    PlayerEvent::RecordStarted {
                        path: active.path.clone(),
                    },
                );
            }

            active.write(packet);
        }

        if let Some(finished) = session.take() {
            finished.finalize(&ctx);
        }
        log::info!("record task finished");
    }
}

impl Default for RecorderTask {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RecorderTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[path = "recorder_test.rs"]
mod recorder_test;
