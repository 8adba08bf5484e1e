use thiserror::Error;

/// Terminal failures of a playback session. Each one ends the worker that hit
/// it and is surfaced to the UI through [`crate::event::PlayerEvent::StreamFailed`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("failed to connect to {url}, check the network link or the stream address: {reason}")]
    Open { url: String, reason: String },

    #[error("failed to get stream information: {0}")]
    StreamInfo(String),

    #[error("no video stream found in input")]
    NoVideoStream,

    #[error("hardware decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("end of stream reached")]
    EndOfStream,

    #[error("network read timed out, the stream seems to be dead")]
    Timeout,

    #[error("stream read error, check the network connection: {0}")]
    Io(String),
}

impl StreamError {
    /// Maps a failed packet read onto the three read outcomes.
    pub fn from_read(err: ffmpeg_next::Error) -> Self {
        match err {
            ffmpeg_next::Error::Eof => StreamError::EndOfStream,
            ffmpeg_next::Error::Exit => StreamError::Timeout,
            other => StreamError::Io(other.to_string()),
        }
    }
}
