use std::time::Duration;

use serde::Deserialize;

/// Tunables for one player. Every interval is in milliseconds so the struct
/// can be loaded straight from a JSON file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Value of the `rtsp_transport` input option; `None` leaves FFmpeg's default.
    pub rtsp_transport: Option<String>,
    /// Connect/read timeout enforced by the interrupt callback and the socket option.
    pub read_timeout_ms: u64,
    /// Hardware device type name (`d3d11va`, `cuda`, `vaapi`, `videotoolbox`, ...).
    /// `None` picks the platform default.
    pub hw_device: Option<String>,
    /// Display queue capacity. Frames decoded while it is full are dropped.
    pub display_capacity: usize,
    /// Drop frames lagging wall-clock by more than this. Disabled when `None`.
    pub max_display_latency_ms: Option<u64>,
    pub stream_poll_ms: u64,
    pub decode_idle_ms: u64,
    pub record_poll_ms: u64,
    pub record_idle_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rtsp_transport: Some("tcp".to_string()),
            read_timeout_ms: 5000,
            hw_device: None,
            display_capacity: 15,
            max_display_latency_ms: None,
            stream_poll_ms: 10,
            decode_idle_ms: 10,
            record_poll_ms: 10,
            record_idle_ms: 100,
        }
    }
}

impl PipelineConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn max_display_latency(&self) -> Option<Duration> {
        self.max_display_latency_ms.map(Duration::from_millis)
    }

    pub fn stream_poll(&self) -> Duration {
        Duration::from_millis(self.stream_poll_ms)
    }

    pub fn decode_idle(&self) -> Duration {
        Duration::from_millis(self.decode_idle_ms)
    }

    pub fn record_poll(&self) -> Duration {
        Duration::from_millis(self.record_poll_ms)
    }

    pub fn record_idle(&self) -> Duration {
        Duration::from_millis(self.record_idle_ms)
    }

    /// Configured hardware device name, or the platform's usual one.
    pub fn hw_device_name(&self) -> &str {
        match self.hw_device.as_deref() {
            Some(name) => name,
            None => default_hw_device(),
        }
    }
}

fn default_hw_device() -> &'static str {
    if cfg!(target_os = "windows") {
        "d3d11va"
    } else if cfg!(target_os = "macos") {
        "videotoolbox"
    } else {
        "vaapi"
    }
}
