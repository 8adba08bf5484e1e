use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    context::PipelineContext,
    error::StreamError,
    event::{self, PlayerEvent},
    queue::PacketQueue,
    stream::StreamSlot,
};

/// Reads the input and fans every video packet out to the decode and record
/// queues.
pub struct DemuxTask {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl DemuxTask {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    /// Stops along with `session`, e.g. when another worker of the session
    /// failed for good.
    pub fn with_session(session: &CancellationToken) -> Self {
        Self {
            cancel: session.child_token(),
            handle: None,
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn start(
        &mut self,
        url: &str,
        ctx: PipelineContext,
        decode: PacketQueue,
        record: PacketQueue,
        slot: StreamSlot,
    ) {
        let url = url.to_string();
        let cancel = self.cancel.clone();
        self.handle = Some(tokio::task::spawn_blocking(move || {
            Self::demux_loop(url, ctx, decode, record, slot, cancel)
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
                log::error!("demux task join error: {}", e);
            }
        }
    }

    fn demux_loop(
        url: String,
        ctx: PipelineContext,
        decode: PacketQueue,
        record: PacketQueue,
        slot: StreamSlot,
        cancel: CancellationToken,
    ) {
        let mut source = match ctx.backend.open_input(&url, &ctx.config, &cancel) {
            Ok(source) => source,
            Err(e) => {
                if cancel.is_cancelled() {
                    log::info!("demux task cancelled while opening {}", url);
                } else {
                    event::emit(&ctx.events, PlayerEvent::StreamFailed(e));
                }
                return;
            }
        };

        let stream_index = source.stream().index();
        if slot.set(source.stream().clone()).is_err() {
            log::warn!("stream already published for this session, keeping the first one");
        }

        let mut forwarded: u64 = 0;
        let mut discarded: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match source.read_packet() {
                Ok(packet) => {
                    if packet.index() != stream_index {
                        discarded += 1;
                        continue;
                    }
                    // decode gets a deep copy, record takes the original
                    decode.push(packet.clone());
                    record.push(packet);
                    forwarded += 1;
                }
                Err(e) => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    match &e {
                        StreamError::EndOfStream => log::info!("end of stream reached: {}", url),
                        StreamError::Timeout => {
                            log::error!("read timed out by interrupt callback, stream seems to be dead: {}", url)
                        }
                        other => log::warn!("read error on {}: {}", url, other),
                    }
                    event::emit(&ctx.events, PlayerEvent::StreamFailed(e));
                    break;
                }
            }
        }

        log::info!(
            "demux task finished: {} packets forwarded, {} from other streams discarded",
            forwarded,
            discarded
        );
    }
}

impl Default for DemuxTask {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DemuxTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[path = "demux_test.rs"]
mod demux_test;
