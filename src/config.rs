use std::path::Path;

use anyhow::Context;
use ffmpeg_pipeline::PipelineConfig;

/// Command-line values that win over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub hw_device: Option<String>,
    pub display_capacity: Option<usize>,
}

/// Reads `path` as JSON if given, falls back to defaults otherwise, then
/// applies `overrides`.
pub fn load(path: Option<&Path>, overrides: Overrides) -> anyhow::Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parse config {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };

    if let Some(hw_device) = overrides.hw_device {
        config.hw_device = Some(hw_device);
    }
    if let Some(capacity) = overrides.display_capacity {
        config.display_capacity = capacity;
    }
    if config.display_capacity == 0 {
        anyhow::bail!("display_capacity must be at least 1");
    }
    Ok(config)
}
