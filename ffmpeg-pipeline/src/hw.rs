//! Hardware-accelerated decoding.
//!
//! The decoder context gets a hardware device of the configured type and a
//! format callback that only accepts the surface format of that device type.
//! Frames come out as GPU surfaces and are downloaded to host memory on demand.

use std::{ffi::CString, os::raw::c_void, ptr};

use ffmpeg_next::ffi::{self, AVCodecContext, AVPixelFormat};

use crate::{backend::FrameDecoder, frame::RawVideoFrame, packet::RawPacket, stream::AvStream};

/// Resolves a device type by FFmpeg name, e.g. "cuda", "vaapi", "d3d11va".
pub fn find_device_type(name: &str) -> anyhow::Result<ffi::AVHWDeviceType> {
    let cname = CString::new(name)
        .map_err(|e| anyhow::anyhow!("invalid device name {:?}: {}", name, e))?;
    let device_type = unsafe { ffi::av_hwdevice_find_type_by_name(cname.as_ptr()) };
    if device_type == ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_NONE {
        return Err(anyhow::anyhow!("unknown hardware device type: {}", name));
    }
    Ok(device_type)
}

/// Surface format `codec` decodes into on a device of `device_type`.
fn find_hw_format(
    codec: &ffmpeg_next::Codec,
    device_type: ffi::AVHWDeviceType,
) -> anyhow::Result<AVPixelFormat> {
    let mut index = 0;
    loop {
        let config = unsafe { ffi::avcodec_get_hw_config(codec.as_ptr(), index) };
        if config.is_null() {
            return Err(anyhow::anyhow!(
                "decoder {} does not support device type {:?}",
                codec.name(),
                device_type
            ));
        }
        let (methods, config_device, pix_fmt) =
            unsafe { ((*config).methods, (*config).device_type, (*config).pix_fmt) };
        if (methods & ffi::AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX as i32) != 0
            && config_device == device_type
        {
            return Ok(pix_fmt);
        }
        index += 1;
    }
}

/// Walks the `AV_PIX_FMT_NONE`-terminated list offered by the decoder.
///
/// # Safety
/// `offered` must point at such a list.
unsafe fn pick_format(mut offered: *const AVPixelFormat, wanted: AVPixelFormat) -> AVPixelFormat {
    unsafe {
        while *offered != AVPixelFormat::AV_PIX_FMT_NONE {
            if *offered == wanted {
                return wanted;
            }
            offered = offered.add(1);
        }
    }
    AVPixelFormat::AV_PIX_FMT_NONE
}

unsafe extern "C" fn get_hw_format(
    ctx: *mut AVCodecContext,
    offered: *const AVPixelFormat,
) -> AVPixelFormat {
    let wanted = unsafe {
        let opaque = (*ctx).opaque as *const AVPixelFormat;
        if opaque.is_null() {
            return AVPixelFormat::AV_PIX_FMT_NONE;
        }
        *opaque
    };
    let picked = unsafe { pick_format(offered, wanted) };
    if picked == AVPixelFormat::AV_PIX_FMT_NONE {
        log::error!("failed to get hardware surface format {:?}", wanted);
    }
    picked
}

/// Owns the opened decoder; the device context is referenced only through it,
/// so dropping the decoder releases both.
pub struct HwDecoder {
    // declared before `_hw_format`: the context's `opaque` points at it
    decoder: ffmpeg_next::codec::decoder::Video,
    _hw_format: Box<AVPixelFormat>,
}

impl HwDecoder {
    pub fn new(stream: &AvStream, device_name: &str) -> anyhow::Result<Self> {
        let codec_id = stream.parameters().id();
        let codec = ffmpeg_next::decoder::find(codec_id)
            .ok_or_else(|| anyhow::anyhow!("failed to find decoder for codec {:?}", codec_id))?;
        let device_type = find_device_type(device_name)?;
        let hw_format = Box::new(find_hw_format(&codec, device_type)?);

        let mut decoder_ctx = ffmpeg_next::codec::Context::new_with_codec(codec);
        decoder_ctx.set_parameters(stream.parameters().clone())?;

        unsafe {
            let raw = decoder_ctx.as_mut_ptr();
            (*raw).pkt_timebase = stream.time_base().into();

            let mut device: *mut ffi::AVBufferRef = ptr::null_mut();
            let ret = ffi::av_hwdevice_ctx_create(
                &mut device,
                device_type,
                ptr::null(),
                ptr::null_mut(),
                0,
            );
            if ret < 0 || device.is_null() {
                return Err(anyhow::anyhow!(
                    "failed to create {} device context: {}",
                    device_name,
                    ffmpeg_next::Error::from(ret)
                ));
            }
            (*raw).hw_device_ctx = ffi::av_buffer_ref(device);
            ffi::av_buffer_unref(&mut device);
            (*raw).opaque = hw_format.as_ref() as *const AVPixelFormat as *mut c_void;
            (*raw).get_format = Some(get_hw_format);
        }

        let decoder = decoder_ctx.decoder().video()?;
        log::info!(
            "hardware decoder initialized: codec: {}, device: {}, surface format: {:?}",
            codec.name(),
            device_name,
            *hw_format
        );

        Ok(Self {
            decoder,
            _hw_format: hw_format,
        })
    }
}

impl FrameDecoder for HwDecoder {
    fn send_packet(&mut self, packet: &RawPacket) -> anyhow::Result<()> {
        self.decoder.send_packet(packet.packet())?;
        Ok(())
    }

    fn receive_frame(&mut self) -> anyhow::Result<Option<RawVideoFrame>> {
        let mut frame = ffmpeg_next::frame::Video::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => Ok(Some(RawVideoFrame::from(frame))),
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn transfer(&mut self, frame: &RawVideoFrame) -> anyhow::Result<RawVideoFrame> {
        let src = frame.as_video();
        // already a host frame when the driver fell back to software decoding
        if unsafe { (*src.as_ptr()).hw_frames_ctx.is_null() } {
            return Ok(frame.clone());
        }

        let mut host = ffmpeg_next::frame::Video::empty();
        unsafe {
            let ret = ffi::av_hwframe_transfer_data(host.as_mut_ptr(), src.as_ptr(), 0);
            if ret < 0 {
                return Err(anyhow::anyhow!(
                    "error transferring frame data from GPU to CPU: {}",
                    ffmpeg_next::Error::from(ret)
                ));
            }
            ffi::av_frame_copy_props(host.as_mut_ptr(), src.as_ptr());
        }
        Ok(RawVideoFrame::from(host))
    }
}
