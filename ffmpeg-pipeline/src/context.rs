use std::sync::Arc;

use crate::{backend::MediaBackend, config::PipelineConfig, event::EventSender};

/// What every worker of a player shares: the codec backend, the tunables and
/// the event channel towards the UI.
#[derive(Clone)]
pub struct PipelineContext {
    pub backend: Arc<dyn MediaBackend>,
    pub config: Arc<PipelineConfig>,
    pub events: EventSender,
}

impl PipelineContext {
    pub fn new(backend: Arc<dyn MediaBackend>, config: PipelineConfig, events: EventSender) -> Self {
        Self {
            backend,
            config: Arc::new(config),
            events,
        }
    }
}
