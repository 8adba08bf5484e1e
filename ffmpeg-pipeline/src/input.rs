use std::{
    ffi::CString,
    os::raw::{c_int, c_void},
    ptr,
    sync::Mutex,
    time::{Duration, Instant},
};

use ffmpeg_next::{Dictionary, codec::packet::Packet, ffi};
use tokio_util::sync::CancellationToken;

use crate::{
    backend::PacketSource, config::PipelineConfig, error::StreamError, packet::RawPacket,
    stream::AvStream,
};

/// State read by FFmpeg's interrupt callback while a blocking open/read runs.
struct InterruptState {
    armed_at: Mutex<Instant>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl InterruptState {
    fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            armed_at: Mutex::new(Instant::now()),
            timeout,
            cancel,
        }
    }

    fn rearm(&self) {
        *self.armed_at.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn should_abort(&self) -> bool {
        if self.cancel.is_cancelled() {
            return true;
        }
        let armed_at = *self.armed_at.lock().unwrap_or_else(|e| e.into_inner());
        armed_at.elapsed() > self.timeout
    }
}

unsafe extern "C" fn interrupt_callback(opaque: *mut c_void) -> c_int {
    if opaque.is_null() {
        return 0;
    }
    let state = unsafe { &*(opaque as *const InterruptState) };
    state.should_abort() as c_int
}

/// Network/file input with an abortable read.
pub struct AvInput {
    // declared before `interrupt`: the context must be closed before the
    // callback state it points at goes away
    inner: ffmpeg_next::format::context::Input,
    interrupt: Box<InterruptState>,
    stream: AvStream,
}

impl AvInput {
    pub fn open(
        url: &str,
        config: &PipelineConfig,
        cancel: &CancellationToken,
    ) -> Result<Self, StreamError> {
        let open_error = |reason: String| StreamError::Open {
            url: url.to_string(),
            reason,
        };

        let interrupt = Box::new(InterruptState::new(config.read_timeout(), cancel.clone()));
        let c_url = CString::new(url).map_err(|e| open_error(e.to_string()))?;

        let mut options = Dictionary::new();
        if let Some(transport) = config.rtsp_transport.as_deref() {
            options.set("rtsp_transport", transport);
        }
        // socket I/O timeout, microseconds
        options.set("timeout", &(config.read_timeout_ms * 1000).to_string());

        let inner = unsafe {
            let mut ctx = ffi::avformat_alloc_context();
            if ctx.is_null() {
                return Err(open_error("could not allocate format context".to_string()));
            }
            (*ctx).interrupt_callback.callback = Some(interrupt_callback);
            (*ctx).interrupt_callback.opaque =
                interrupt.as_ref() as *const InterruptState as *mut c_void;

            let mut opts = options.disown();
            interrupt.rearm();
            let ret = ffi::avformat_open_input(&mut ctx, c_url.as_ptr(), ptr::null_mut(), &mut opts);
            // whatever the demuxer did not consume
            drop(Dictionary::own(opts));

            if ret < 0 {
                // avformat_open_input frees the context on failure
                let err = ffmpeg_next::Error::from(ret);
                let reason = if err == ffmpeg_next::Error::Exit {
                    "timed out by interrupt callback".to_string()
                } else {
                    err.to_string()
                };
                log::error!("could not open input stream {}: {}", url, reason);
                return Err(open_error(reason));
            }

            interrupt.rearm();
            let ret = ffi::avformat_find_stream_info(ctx, ptr::null_mut());
            if ret < 0 {
                ffi::avformat_close_input(&mut ctx);
                let reason = ffmpeg_next::Error::from(ret).to_string();
                log::error!("could not find stream information for {}: {}", url, reason);
                return Err(StreamError::StreamInfo(reason));
            }

            ffmpeg_next::format::context::Input::wrap(ctx)
        };

        let stream = inner
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .map(AvStream::from)
            .ok_or_else(|| {
                log::error!("could not find video stream in {}", url);
                StreamError::NoVideoStream
            })?;

        log::info!(
            "opened {}: video stream index: {}, codec: {:?}, time_base: {:?}, {}x{} @ {:.2} fps",
            url,
            stream.index(),
            stream.parameters().id(),
            stream.time_base(),
            stream.width(),
            stream.height(),
            stream.fps()
        );

        Ok(Self {
            inner,
            interrupt,
            stream,
        })
    }
}

impl PacketSource for AvInput {
    fn stream(&self) -> &AvStream {
        &self.stream
    }

    fn read_packet(&mut self) -> Result<RawPacket, StreamError> {
        self.interrupt.rearm();
        let mut packet = Packet::empty();
        match packet.read(&mut self.inner) {
            Ok(()) => {
                let time_base = self
                    .inner
                    .stream(packet.stream())
                    .map(|s| s.time_base())
                    .unwrap_or_else(|| self.stream.time_base());
                Ok(RawPacket::from((packet, time_base)))
            }
            Err(e) => Err(StreamError::from_read(e)),
        }
    }
}
