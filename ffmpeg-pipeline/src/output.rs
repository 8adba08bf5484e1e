use std::path::{Path, PathBuf};

use anyhow::Context as _;
use ffmpeg_next::Rational;

use crate::{backend::PacketMuxer, packet::RawPacket, stream::AvStream};

/// Single-stream output file. The container is picked from the file extension.
pub struct AvOutput {
    inner: ffmpeg_next::format::context::Output,
    path: PathBuf,
    have_written_trailer: bool,
}

impl AvOutput {
    /// Allocates the container, opens the file, adds one stream carrying
    /// `stream`'s codec parameters and writes the header. Anything opened
    /// before a failing step is closed when the half-built context drops.
    pub fn create(path: &Path, stream: &AvStream) -> anyhow::Result<Self> {
        let mut inner = ffmpeg_next::format::output(path)
            .with_context(|| format!("could not create output context for {}", path.display()))?;

        {
            let codec_parameters = stream.parameters();
            let mut writer_stream = inner
                .add_stream(ffmpeg_next::encoder::find(codec_parameters.id()))
                .context("failed allocating output stream")?;
            writer_stream.set_parameters(codec_parameters.clone());
            writer_stream.set_time_base(stream.time_base());
            unsafe {
                // let the muxer derive the tag for its own container
                (*(*writer_stream.as_mut_ptr()).codecpar).codec_tag = 0;
            }
        }

        inner
            .write_header()
            .with_context(|| format!("error writing header to {}", path.display()))?;

        Ok(Self {
            inner,
            path: path.to_path_buf(),
            have_written_trailer: false,
        })
    }
}

impl PacketMuxer for AvOutput {
    fn time_base(&self) -> Rational {
        self.inner
            .stream(0)
            .map(|s| s.time_base())
            .unwrap_or_else(|| Rational::new(1, 90000))
    }

    fn write_interleaved(&mut self, mut packet: RawPacket) -> anyhow::Result<()> {
        packet.get_mut().write_interleaved(&mut self.inner)?;
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        if !self.have_written_trailer {
            self.have_written_trailer = true;
            self.inner
                .write_trailer()
                .with_context(|| format!("error writing trailer to {}", self.path.display()))?;
        }
        Ok(())
    }
}
