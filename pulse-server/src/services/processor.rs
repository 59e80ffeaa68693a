//! Intake, persistence, metrics derivation and forwarding of single events.

use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pulse_statsd::metric;
use serde::Serialize;

use crate::constants::{SCHEMA_VERSION, SERVICE_NAME};
use crate::event::{Event, ValidationError};
use crate::services::replay_cache::{CacheError, ReplayCache};
use crate::services::sink::{MetricsRecord, MetricsSinkClient};
use crate::statsd::{PulseCounters, PulseDistributions, PulseGauges, PulseTimers};

/// Processing of an event stopped before it was acknowledged.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    /// The event failed schema validation. Nothing was persisted.
    #[error("event rejected")]
    Rejected(#[from] ValidationError),

    /// The event could not be written to the replay cache. No metrics were derived.
    #[error("failed to persist event")]
    Failed(#[from] CacheError),
}

/// The result reported for an acknowledged event.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingResult {
    /// The event was persisted and its metrics were derived.
    Success,
}

/// Acknowledgment of a processed event.
#[derive(Clone, Debug, Serialize)]
pub struct ProcessingOutcome {
    /// The id of the processed event.
    pub event_id: String,
    /// Time of acknowledgment.
    pub processed_timestamp: DateTime<Utc>,
    /// Always [`ProcessingResult::Success`].
    #[serde(rename = "processing_result")]
    pub result: ProcessingResult,
}

/// Maximum number of distinct `(region, type)` pairs counted by [`ProcessorMetrics`].
const MAX_TRACKED_ORIGINS: usize = 1_000;

/// Process-wide processing counters.
///
/// Region and event type are chosen by callers. Per-origin counts are therefore kept for at most
/// [`MAX_TRACKED_ORIGINS`] distinct pairs. Events from further origins still count toward the
/// totals and the statsd counters.
#[derive(Debug, Default)]
pub struct ProcessorMetrics {
    processed: AtomicU64,
    failed: AtomicU64,
    processing_nanos: AtomicU64,
    in_flight: AtomicU64,
    by_origin: Mutex<HashMap<(String, String), u64>>,
}

impl ProcessorMetrics {
    /// Number of acknowledged events.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Number of acknowledged events from `region` with type `ty`.
    pub fn processed_by(&self, region: &str, ty: &str) -> u64 {
        self.by_origin
            .lock()
            .get(&(region.to_owned(), ty.to_owned()))
            .copied()
            .unwrap_or_default()
    }

    /// Number of events that could not be persisted.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Total time spent on acknowledged events.
    pub fn processing_time(&self) -> Duration {
        Duration::from_nanos(self.processing_nanos.load(Ordering::Relaxed))
    }

    /// Number of `process` calls currently in flight.
    pub fn queue_depth(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Share of failed events among all events that reached the cache write.
    pub fn error_rate(&self) -> f64 {
        let processed = self.processed();
        let failed = self.failed();

        match processed + failed {
            0 => 0.0,
            total => failed as f64 / total as f64,
        }
    }

    fn enter(&self) -> InFlightGuard<'_> {
        let depth = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        metric!(gauge(PulseGauges::QueueDepth) = depth);
        InFlightGuard { metrics: self }
    }

    fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        metric!(counter(PulseCounters::EventFailed) += 1);
    }

    fn record_processed(&self, event: &Event, duration: Duration) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.processing_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);

        let mut by_origin = self.by_origin.lock();
        let origin = (event.source.region.clone(), event.ty.clone());
        if let Some(count) = by_origin.get_mut(&origin) {
            *count += 1;
        } else if by_origin.len() < MAX_TRACKED_ORIGINS {
            by_origin.insert(origin, 1);
        }
        drop(by_origin);

        metric!(
            counter(PulseCounters::EventProcessed) += 1,
            region = &event.source.region,
            event_type = &event.ty,
        );
        metric!(
            timer(PulseTimers::EventProcessingTime) = duration,
            region = &event.source.region,
        );
    }

    /// Derives the metrics record for an event from `region`.
    ///
    /// `processing_time` covers all previously acknowledged events and `queue_depth` includes
    /// the calling request.
    pub fn derive(&self, region: &str, environment: &str) -> MetricsRecord {
        let metrics = BTreeMap::from([
            (
                "processing_time".to_owned(),
                self.processing_time().as_secs_f64(),
            ),
            ("queue_depth".to_owned(), self.queue_depth() as f64),
            ("error_rate".to_owned(), self.error_rate()),
        ]);

        let tags = BTreeMap::from([
            ("environment".to_owned(), environment.to_owned()),
            ("service".to_owned(), SERVICE_NAME.to_owned()),
            ("version".to_owned(), SCHEMA_VERSION.to_owned()),
        ]);

        MetricsRecord {
            timestamp: Utc::now(),
            region: region.to_owned(),
            metrics,
            tags,
        }
    }
}

/// Counts a `process` call as in flight until dropped.
struct InFlightGuard<'a> {
    metrics: &'a ProcessorMetrics,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let depth = self.metrics.in_flight.fetch_sub(1, Ordering::Relaxed) - 1;
        metric!(gauge(PulseGauges::QueueDepth) = depth);
    }
}

/// Orchestrates validation, persistence, metrics derivation and forwarding of events.
#[derive(Debug)]
pub struct EventProcessor {
    cache: ReplayCache,
    sink: MetricsSinkClient,
    metrics: Arc<ProcessorMetrics>,
    environment: String,
}

impl EventProcessor {
    /// Creates a processor persisting to `cache` and forwarding to `sink`.
    pub fn new(
        cache: ReplayCache,
        sink: MetricsSinkClient,
        metrics: Arc<ProcessorMetrics>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            sink,
            metrics,
            environment: environment.into(),
        }
    }

    /// Returns the process-wide counters.
    pub fn metrics(&self) -> &ProcessorMetrics {
        &self.metrics
    }

    /// Parses an event from a JSON body and processes it.
    pub async fn process_json(&self, body: &[u8]) -> Result<ProcessingOutcome, ProcessingError> {
        metric!(distribution(PulseDistributions::EventSize) = body.len() as u64);

        let event = match Event::parse(body) {
            Ok(event) => event,
            Err(error) => return Err(self.reject(error)),
        };

        self.process(event).await
    }

    /// Processes a single event.
    ///
    /// The event is acknowledged once it is written to the replay cache. Forwarding the derived
    /// metrics is attempted before acknowledgment, but its outcome never fails the call.
    pub async fn process(&self, event: Event) -> Result<ProcessingOutcome, ProcessingError> {
        if let Err(error) = event.validate() {
            return Err(self.reject(error));
        }

        let _guard = self.metrics.enter();
        let start = Instant::now();

        pulse_log::debug!(event_id = %event.id, "event received");

        let write_start = Instant::now();
        if let Err(error) = self.cache.put_event(&event).await {
            self.metrics.record_failure();
            pulse_log::error!(
                error = &error as &dyn Error,
                event_id = %event.id,
                "failed to persist event to replay cache"
            );
            return Err(error.into());
        }
        metric!(timer(PulseTimers::CacheWriteTime) = write_start.elapsed());
        pulse_log::debug!(event_id = %event.id, "event persisted");

        let record = self
            .metrics
            .derive(&event.source.region, &self.environment);
        pulse_log::debug!(event_id = %event.id, "metrics derived");

        let forwarded = self.sink.forward(&record).await.is_ok();
        pulse_log::debug!(event_id = %event.id, forwarded, "forward attempted");

        self.metrics.record_processed(&event, start.elapsed());

        Ok(ProcessingOutcome {
            event_id: event.id,
            processed_timestamp: Utc::now(),
            result: ProcessingResult::Success,
        })
    }

    fn reject(&self, error: ValidationError) -> ProcessingError {
        pulse_log::debug!(error = &error as &dyn Error, "event rejected");
        metric!(counter(PulseCounters::EventRejected) += 1);
        error.into()
    }
}
