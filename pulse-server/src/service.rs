use std::sync::Arc;

use pulse_config::Config;

use crate::services::health_check::HealthCheck;
use crate::services::processor::{EventProcessor, ProcessorMetrics};
use crate::services::replay_cache::{CacheError, ReplayCache};
use crate::services::sink::{MetricsSinkClient, SinkSetupError};

/// Indicates the type of failure of the server.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Initializing the replay cache failed.
    #[error("could not initialize the replay cache")]
    Cache(#[from] CacheError),

    /// Initializing the sink client failed.
    #[error("could not initialize the sink client")]
    Sink(#[from] SinkSetupError),
}

#[derive(Debug)]
struct StateInner {
    cache: ReplayCache,
    processor: EventProcessor,
    health_check: HealthCheck,
}

/// Server state shared by all endpoints.
#[derive(Clone, Debug)]
pub struct ServiceState {
    inner: Arc<StateInner>,
}

impl ServiceState {
    /// Creates the replay cache and sink client configured in `config`.
    pub fn start(config: &Config) -> Result<Self, ServiceError> {
        let cache = ReplayCache::from_config(config)?;
        let sink = MetricsSinkClient::new(config)?;
        Ok(Self::new(config, cache, sink))
    }

    /// Creates the state from existing components.
    pub fn new(config: &Config, cache: ReplayCache, sink: MetricsSinkClient) -> Self {
        let processor = EventProcessor::new(
            cache.clone(),
            sink,
            Arc::new(ProcessorMetrics::default()),
            config.environment(),
        );
        let health_check = HealthCheck::new(cache.clone());

        Self {
            inner: Arc::new(StateInner {
                cache,
                processor,
                health_check,
            }),
        }
    }

    /// Returns the replay cache.
    pub fn cache(&self) -> &ReplayCache {
        &self.inner.cache
    }

    /// Returns the event processor.
    pub fn processor(&self) -> &EventProcessor {
        &self.inner.processor
    }

    /// Returns the health check.
    pub fn health_check(&self) -> &HealthCheck {
        &self.inner.health_check
    }
}
