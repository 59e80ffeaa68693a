use std::error::Error;

use pulse_statsd::metric;
use serde::Serialize;

use crate::services::replay_cache::ReplayCache;
use crate::statsd::PulseCounters;

/// Health of the service.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The replay cache is reachable.
    Healthy,
    /// The replay cache is not reachable.
    Unhealthy,
}

impl HealthStatus {
    /// Returns `true` for [`HealthStatus::Healthy`].
    pub fn is_healthy(self) -> bool {
        self == Self::Healthy
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        }
    }
}

/// Reports service health by probing the replay cache.
///
/// Probes are read-only and may run concurrently with any number of processed events.
#[derive(Clone, Debug)]
pub struct HealthCheck {
    cache: ReplayCache,
}

impl HealthCheck {
    /// Creates a health check probing `cache`.
    pub fn new(cache: ReplayCache) -> Self {
        Self { cache }
    }

    /// Probes the replay cache.
    pub async fn check(&self) -> HealthStatus {
        let status = match self.cache.ping().await {
            Ok(()) => HealthStatus::Healthy,
            Err(error) => {
                pulse_log::warn!(
                    error = &error as &dyn Error,
                    "health check failed: replay cache unreachable"
                );
                HealthStatus::Unhealthy
            }
        };

        metric!(counter(PulseCounters::HealthCheck) += 1, status = status.as_str());
        status
    }
}
