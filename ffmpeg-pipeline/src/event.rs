use std::path::PathBuf;

use crate::error::StreamError;

pub type EventSender = tokio::sync::broadcast::Sender<PlayerEvent>;
pub type EventReceiver = tokio::sync::broadcast::Receiver<PlayerEvent>;

/// Notifications the pipeline raises towards the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// The first keyframe reached the decoder. Once per session.
    FirstFrame,
    /// The session ended because of a startup or stream failure.
    StreamFailed(StreamError),
    /// The recorder saw its first keyframe and opened the file. Once per recording.
    RecordStarted { path: PathBuf },
    RecordFinished { path: PathBuf },
    /// The output container could not be set up; the recorder went back to idle.
    RecordFailed { path: PathBuf, reason: String },
    ScreenshotFinished { path: PathBuf, success: bool },
}

pub fn channel() -> EventSender {
    let (sender, _) = tokio::sync::broadcast::channel(64);
    sender
}

/// Fire and forget: nobody listening is not an error.
pub(crate) fn emit(sender: &EventSender, event: PlayerEvent) {
    log::debug!("player event: {:?}", event);
    let _ = sender.send(event);
}
