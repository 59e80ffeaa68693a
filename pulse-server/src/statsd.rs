use pulse_statsd::{CounterMetric, DistributionMetric, GaugeMetric, TimerMetric};

/// Gauge metrics used by Pulse.
pub enum PulseGauges {
    /// The number of `process` calls currently in flight.
    QueueDepth,
    /// The number of connections currently being managed by the Redis pool.
    RedisPoolConnections,
    /// The number of idle connections in the Redis pool.
    RedisPoolIdleConnections,
    /// Exposes the amount of currently open and handled connections by the server.
    ServerActiveConnections,
}

impl GaugeMetric for PulseGauges {
    fn name(&self) -> &'static str {
        match self {
            Self::QueueDepth => "processor.queue_depth",
            Self::RedisPoolConnections => "redis.pool.connections",
            Self::RedisPoolIdleConnections => "redis.pool.idle_connections",
            Self::ServerActiveConnections => "server.http.connections",
        }
    }
}

/// Timer metrics used by Pulse.
pub enum PulseTimers {
    /// Total time spent processing an acknowledged event, from intake to acknowledgment.
    ///
    /// This metric is tagged with:
    ///  - `region`: the region of the event source.
    EventProcessingTime,
    /// Time spent writing an event to the replay cache.
    CacheWriteTime,
    /// Time spent sending a metrics record to the analytics sink, including failed attempts.
    SinkForwardTime,
}

impl TimerMetric for PulseTimers {
    fn name(&self) -> &'static str {
        match self {
            Self::EventProcessingTime => "event.processing_time",
            Self::CacheWriteTime => "replay_cache.write_time",
            Self::SinkForwardTime => "sink.forward_time",
        }
    }
}

/// Distribution metrics used by Pulse.
pub enum PulseDistributions {
    /// Size in bytes of a request body submitted for processing, valid or not.
    EventSize,
}

impl DistributionMetric for PulseDistributions {
    fn name(&self) -> &'static str {
        match self {
            Self::EventSize => "event.size",
        }
    }
}

/// Counter metrics used by Pulse.
pub enum PulseCounters {
    /// Number of acknowledged events.
    ///
    /// This metric is tagged with:
    ///  - `region`: the region of the event source.
    ///  - `event_type`: the type of the event.
    EventProcessed,
    /// Number of events rejected by schema validation.
    EventRejected,
    /// Number of events that could not be written to the replay cache.
    EventFailed,
    /// Number of attempts to forward a metrics record to the analytics sink.
    ///
    /// This metric is tagged with:
    ///  - `outcome`: `success` or the kind of failure.
    SinkForward,
    /// Number of health probes.
    ///
    /// This metric is tagged with:
    ///  - `status`: `healthy` or `unhealthy`.
    HealthCheck,
    /// Number of times the HTTP server was started.
    ServerStarting,
}

impl CounterMetric for PulseCounters {
    fn name(&self) -> &'static str {
        match self {
            Self::EventProcessed => "event.processed",
            Self::EventRejected => "event.rejected",
            Self::EventFailed => "event.failed",
            Self::SinkForward => "sink.forward",
            Self::HealthCheck => "health.check",
            Self::ServerStarting => "server.starting",
        }
    }
}
