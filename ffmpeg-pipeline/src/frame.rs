use std::fmt::{Display, Formatter};

/// A decoded picture. Before the GPU download the format is the hardware
/// surface format; after it, a host-memory layout such as NV12.
///
/// `Clone` copies the pixel data, so a clone never aliases the original.
#[derive(Clone)]
pub struct RawVideoFrame {
    frame: ffmpeg_next::frame::Video,
}

impl From<ffmpeg_next::frame::Video> for RawVideoFrame {
    fn from(frame: ffmpeg_next::frame::Video) -> Self {
        Self { frame }
    }
}

impl RawVideoFrame {
    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    pub fn format(&self) -> ffmpeg_next::format::Pixel {
        self.frame.format()
    }

    pub fn pts(&self) -> Option<i64> {
        self.frame.pts()
    }

    pub fn is_key(&self) -> bool {
        self.frame.is_key()
    }

    /// Luma plus chroma: anything less cannot be shown or converted.
    pub fn has_image_planes(&self) -> bool {
        self.frame.planes() >= 2
    }

    pub fn as_video(&self) -> &ffmpeg_next::frame::Video {
        &self.frame
    }
}

impl Display for RawVideoFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "RawVideoFrame width: {}, height: {}, format: {:?}, pts: {:?}",
            self.width(),
            self.height(),
            self.format(),
            self.pts()
        )
    }
}
