use std::{path::Path, pin::Pin, sync::Arc};

use futures::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use crate::{
    backend::MediaBackend,
    config::PipelineConfig,
    context::PipelineContext,
    decoder::DecoderTask,
    demux::DemuxTask,
    event::{self, EventReceiver, PlayerEvent},
    queue::{FrameQueue, PipelineQueues},
    recorder::RecorderTask,
    stream::{AvStream, StreamSlot},
};

pub type PlayerEventStream = Pin<Box<dyn Stream<Item = PlayerEvent> + Send>>;

/// Workers of one `start_play` .. `stop_play` cycle.
struct Session {
    url: String,
    cancel: CancellationToken,
    slot: StreamSlot,
    demux: DemuxTask,
    decoder: DecoderTask,
    recorder: RecorderTask,
}

impl Session {
    fn stop(&self) {
        self.cancel.cancel();
        self.demux.stop();
        self.decoder.stop();
        self.recorder.stop();
    }

    /// Demuxer first so nothing new is queued, then the consumers.
    async fn shutdown(mut self) {
        self.demux.stop();
        self.demux.join().await;
        self.decoder.stop();
        self.decoder.join().await;
        self.recorder.stop();
        self.recorder.join().await;
        log::info!("session for {} stopped", self.url);
    }
}

/// Session controller: owns the queues, starts and stops the three workers and
/// forwards recording and screenshot commands to them.
///
/// Control calls are serialized; each one returns quickly and the outcome of
/// long-running work arrives as a [`PlayerEvent`].
pub struct Player {
    ctx: PipelineContext,
    queues: PipelineQueues,
    session: tokio::sync::Mutex<Option<Session>>,
}

impl Player {
    pub fn new(backend: Arc<dyn MediaBackend>, config: PipelineConfig) -> Self {
        Self {
            ctx: PipelineContext::new(backend, config, event::channel()),
            queues: PipelineQueues::new(),
            session: tokio::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.ctx.config
    }

    /// Starts a session for `url`. Returns false, without touching anything,
    /// while a session's demuxer is still running.
    pub async fn start_play(&self, url: &str) -> bool {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            if session.demux.is_running() {
                log::info!("already playing {}, ignoring start for {}", session.url, url);
                return false;
            }
        }
        // a session whose demuxer already gave up
        if let Some(stale) = guard.take() {
            stale.shutdown().await;
            self.queues.purge_packets();
        }

        log::info!("start playing {}", url);
        let slot = StreamSlot::default();
        let cancel = CancellationToken::new();
        let mut session = Session {
            url: url.to_string(),
            slot: slot.clone(),
            demux: DemuxTask::with_session(&cancel),
            decoder: DecoderTask::with_session(&cancel),
            recorder: RecorderTask::new(),
            cancel,
        };
        session.decoder.start(
            self.ctx.clone(),
            self.queues.decode.clone(),
            self.queues.display.clone(),
            slot.clone(),
        );
        session
            .recorder
            .start(self.ctx.clone(), self.queues.record.clone());
        session.demux.start(
            url,
            self.ctx.clone(),
            self.queues.decode.clone(),
            self.queues.record.clone(),
            slot,
        );
        *guard = Some(session);
        true
    }

    /// Stops and joins every worker, finalizing an active recording, then
    /// drops all queued packets. No-op without a session.
    pub async fn stop_play(&self) {
        let Some(session) = self.session.lock().await.take() else {
            return;
        };
        session.shutdown().await;
        let purged = self.queues.purge_packets();
        log::debug!("purged {} queued packets", purged);
    }

    /// Arms the recorder for `path`. Returns false when there is no session,
    /// the stream is not known yet, or a recording is already armed.
    pub async fn start_record(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let guard = self.session.lock().await;
        let Some(session) = guard.as_ref() else {
            log::warn!("record request for {} ignored, not playing", path.display());
            return false;
        };
        let Some(stream) = session.slot.get() else {
            log::warn!(
                "record request for {} ignored, stream not opened yet",
                path.display()
            );
            return false;
        };
        session.recorder.start_record(path, stream.clone())
    }

    pub async fn stop_record(&self) {
        if let Some(session) = self.session.lock().await.as_ref() {
            session.recorder.stop_record();
        }
    }

    pub async fn is_recording(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| s.recorder.is_recording())
    }

    /// Requests a screenshot of the next displayable frame. Returns false when
    /// there is no session or another screenshot is still outstanding.
    pub async fn screenshot(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match self.session.lock().await.as_ref() {
            Some(session) => session.decoder.request_screenshot(path),
            None => {
                log::warn!("screenshot request for {} ignored, not playing", path.display());
                false
            }
        }
    }

    pub async fn is_playing(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| s.demux.is_running())
    }

    /// The selected input stream, once the demuxer has opened it.
    pub async fn stream(&self) -> Option<AvStream> {
        self.session
            .lock()
            .await
            .as_ref()
            .and_then(|s| s.slot.get().cloned())
    }

    /// Frames ready for rendering. The handle stays valid across sessions.
    pub fn display_queue(&self) -> FrameQueue {
        self.queues.display.clone()
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.ctx.events.subscribe()
    }

    /// Events as a stream; a slow reader silently skips what it lagged behind on.
    pub fn events(&self) -> PlayerEventStream {
        BroadcastStream::new(self.subscribe())
            .filter_map(|r| async move { r.ok() })
            .boxed()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().as_ref() {
            session.stop();
        }
    }
}

#[cfg(test)]
#[path = "player_test.rs"]
mod player_test;
