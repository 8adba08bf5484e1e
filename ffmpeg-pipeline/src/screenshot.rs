use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
};

use tokio::runtime::Handle;

use crate::{
    context::PipelineContext,
    event::{self, PlayerEvent},
    frame::RawVideoFrame,
};

enum SlotState {
    Idle,
    Pending(PathBuf),
    InFlight,
}

/// Single-shot screenshot request shared between the UI side and the decode
/// loop. At most one request exists at a time: a request made while another is
/// pending or still being encoded is refused, not queued.
#[derive(Clone)]
pub struct ScreenshotSlot {
    state: Arc<Mutex<SlotState>>,
}

impl ScreenshotSlot {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SlotState::Idle)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns false when the request was dropped because one is outstanding.
    pub fn request(&self, path: impl Into<PathBuf>) -> bool {
        let mut state = self.lock();
        match *state {
            SlotState::Idle => {
                *state = SlotState::Pending(path.into());
                true
            }
            SlotState::Pending(_) | SlotState::InFlight => false,
        }
    }

    /// Test-and-clear: hands out the pending path once and marks it in flight.
    pub fn take(&self) -> Option<PathBuf> {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, SlotState::InFlight) {
            SlotState::Pending(path) => Some(path),
            previous => {
                *state = previous;
                None
            }
        }
    }

    pub fn complete(&self) {
        *self.lock() = SlotState::Idle;
    }

    pub fn is_idle(&self) -> bool {
        matches!(*self.lock(), SlotState::Idle)
    }
}

impl Default for ScreenshotSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Frees the slot when dropped, even if the job unwinds.
struct SlotRelease(ScreenshotSlot);

impl Drop for SlotRelease {
    fn drop(&mut self) {
        self.0.complete();
    }
}

/// Encodes `frame` to `path` on the blocking pool, reports the outcome and
/// frees the slot. Nobody waits for it.
pub(crate) fn spawn_job(
    runtime: &Handle,
    ctx: PipelineContext,
    slot: ScreenshotSlot,
    frame: RawVideoFrame,
    path: PathBuf,
) {
    runtime.spawn_blocking(move || {
        let release = SlotRelease(slot);
        log::debug!("screenshot job started for {}", path.display());
        let success = match ctx.backend.save_screenshot(&frame, &path) {
            Ok(()) => {
                log::info!(
                    "screenshot {}x{} saved to {}",
                    frame.width(),
                    frame.height(),
                    path.display()
                );
                true
            }
            Err(e) => {
                log::warn!("failed to save screenshot to {}: {:#}", path.display(), e);
                false
            }
        };
        drop(release);
        event::emit(&ctx.events, PlayerEvent::ScreenshotFinished { path, success });
    });
}
