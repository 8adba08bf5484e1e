/// Registers FFmpeg components (formats, network protocols, devices). Call
/// once at startup before opening any input.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))?;
    ffmpeg_next::format::network::init();
    Ok(())
}

pub mod backend;
pub mod config;
pub mod context;
pub mod decoder;
pub mod demux;
pub mod error;
pub mod event;
pub mod ffmpeg;
pub mod frame;
pub mod hw;
pub mod input;
pub mod output;
pub mod packet;
pub mod player;
pub mod queue;
pub mod recorder;
pub mod scaler;
pub mod screenshot;
pub mod stream;

#[cfg(test)]
mod testing;

pub use backend::MediaBackend;
pub use config::PipelineConfig;
pub use error::StreamError;
pub use event::PlayerEvent;
pub use ffmpeg::FfmpegBackend;
pub use player::Player;
