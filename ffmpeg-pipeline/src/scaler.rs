use std::path::Path;

use anyhow::Context as _;
use ffmpeg_next::{
    format::Pixel,
    software::scaling::{self, Flags},
};

use crate::frame::RawVideoFrame;

pub struct Scaler {
    context: scaling::Context,
}

impl Scaler {
    pub fn new(context: scaling::Context) -> Self {
        Self { context }
    }

    /// Same-size conversion of `frame`'s format to packed 24-bit RGB.
    pub fn to_rgb24(frame: &RawVideoFrame) -> anyhow::Result<Self> {
        let (width, height) = (frame.width(), frame.height());
        let context = scaling::Context::get(
            frame.format(),
            width,
            height,
            Pixel::RGB24,
            width,
            height,
            Flags::BILINEAR,
        )?;
        Ok(Self::new(context))
    }

    pub fn run(
        &mut self,
        frame: &ffmpeg_next::frame::Video,
        dst: &mut ffmpeg_next::frame::Video,
    ) -> anyhow::Result<()> {
        self.context.run(frame, dst).map_err(|e| e.into())
    }
}

unsafe impl Send for Scaler {}

/// Writes `frame` at full resolution as an RGB image, format by extension.
pub fn save_rgb24(frame: &RawVideoFrame, path: &Path) -> anyhow::Result<()> {
    let (width, height) = (frame.width(), frame.height());
    if width == 0 || height == 0 {
        anyhow::bail!("invalid frame size {}x{}", width, height);
    }

    let mut scaler = Scaler::to_rgb24(frame)?;
    let mut rgb = ffmpeg_next::frame::Video::empty();
    scaler.run(frame.as_video(), &mut rgb)?;

    let pixels = pack_rows(rgb.data(0), rgb.stride(0), width as usize * 3, height as usize)?;
    let image = image::RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| anyhow::anyhow!("rgb buffer does not match {}x{}", width, height))?;
    image
        .save(path)
        .with_context(|| format!("failed to save screenshot to {}", path.display()))?;
    Ok(())
}

/// Strips per-row padding from a strided plane.
fn pack_rows(data: &[u8], stride: usize, row_bytes: usize, rows: usize) -> anyhow::Result<Vec<u8>> {
    if stride < row_bytes || data.len() < stride * rows.saturating_sub(1) + row_bytes {
        anyhow::bail!(
            "plane too small: {} bytes for {} rows of {} (stride {})",
            data.len(),
            rows,
            row_bytes,
            stride
        );
    }
    let mut out = Vec::with_capacity(row_bytes * rows);
    for row in data.chunks(stride).take(rows) {
        out.extend_from_slice(&row[..row_bytes]);
    }
    Ok(out)
}
