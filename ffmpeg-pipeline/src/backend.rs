//! Seam between the pipeline workers and the codec/container library.
//!
//! The workers only ever talk to these traits. [`crate::ffmpeg::FfmpegBackend`]
//! is the real implementation; tests plug in synthetic ones.

use std::path::Path;

use ffmpeg_next::Rational;
use tokio_util::sync::CancellationToken;

use crate::{
    config::PipelineConfig, error::StreamError, frame::RawVideoFrame, packet::RawPacket,
    stream::AvStream,
};

/// An opened input positioned on its best video stream.
pub trait PacketSource: Send {
    fn stream(&self) -> &AvStream;

    /// Blocks until the next packet of any stream is available.
    fn read_packet(&mut self) -> Result<RawPacket, StreamError>;
}

/// A hardware decoder: packets in, GPU frames out, plus the download to host memory.
pub trait FrameDecoder: Send {
    fn send_packet(&mut self, packet: &RawPacket) -> anyhow::Result<()>;

    /// `Ok(None)` once the decoder needs more input.
    fn receive_frame(&mut self) -> anyhow::Result<Option<RawVideoFrame>>;

    fn transfer(&mut self, frame: &RawVideoFrame) -> anyhow::Result<RawVideoFrame>;
}

/// An output container with exactly one stream whose header is already written.
pub trait PacketMuxer: Send {
    /// Time base of output stream 0 as fixed by the muxer.
    fn time_base(&self) -> Rational;

    fn write_interleaved(&mut self, packet: RawPacket) -> anyhow::Result<()>;

    /// Writes the trailer. Dropping the muxer afterwards closes the file.
    fn finish(&mut self) -> anyhow::Result<()>;
}

pub trait MediaBackend: Send + Sync + 'static {
    /// `cancel` must abort a blocking open or read once it fires.
    fn open_input(
        &self,
        url: &str,
        config: &PipelineConfig,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn PacketSource>, StreamError>;

    fn open_decoder(
        &self,
        stream: &AvStream,
        config: &PipelineConfig,
    ) -> Result<Box<dyn FrameDecoder>, StreamError>;

    /// Allocates the container for `path`, copies the stream parameters, opens
    /// the file and writes the header.
    fn open_muxer(&self, path: &Path, stream: &AvStream) -> anyhow::Result<Box<dyn PacketMuxer>>;

    /// Converts to 24-bit RGB at full resolution and encodes by file extension.
    fn save_screenshot(&self, frame: &RawVideoFrame, path: &Path) -> anyhow::Result<()>;
}
