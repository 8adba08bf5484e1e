use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::{
    backend::{FrameDecoder, MediaBackend, PacketMuxer, PacketSource},
    config::PipelineConfig,
    error::StreamError,
    frame::RawVideoFrame,
    hw::HwDecoder,
    input::AvInput,
    output::AvOutput,
    scaler,
    stream::AvStream,
};

/// The production backend: FFmpeg demuxing, hardware decoding, muxing and
/// software scaling for screenshots.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegBackend;

impl MediaBackend for FfmpegBackend {
    fn open_input(
        &self,
        url: &str,
        config: &PipelineConfig,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn PacketSource>, StreamError> {
        Ok(Box::new(AvInput::open(url, config, cancel)?))
    }

    fn open_decoder(
        &self,
        stream: &AvStream,
        config: &PipelineConfig,
    ) -> Result<Box<dyn FrameDecoder>, StreamError> {
        HwDecoder::new(stream, config.hw_device_name())
            .map(|decoder| Box::new(decoder) as Box<dyn FrameDecoder>)
            .map_err(|e| StreamError::DecoderInit(format!("{:#}", e)))
    }

    fn open_muxer(&self, path: &Path, stream: &AvStream) -> anyhow::Result<Box<dyn PacketMuxer>> {
        Ok(Box::new(AvOutput::create(path, stream)?))
    }

    fn save_screenshot(&self, frame: &RawVideoFrame, path: &Path) -> anyhow::Result<()> {
        scaler::save_rgb24(frame, path)
    }
}
