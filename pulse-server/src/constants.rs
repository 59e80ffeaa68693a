use std::time::Duration;

/// The value of the `Server` response header.
pub const SERVER: &str = concat!("pulse/", env!("CARGO_PKG_VERSION"));

/// Prefix of replay cache keys, followed by the event id.
pub const CACHE_KEY_PREFIX: &str = "event:";

/// Retention of events in the replay cache.
pub const CACHE_TTL: Duration = Duration::from_secs(3600);

/// Upper bound for a single request to the analytics sink.
pub const SINK_TIMEOUT: Duration = Duration::from_secs(10);

/// Value of the `service` tag attached to every derived metrics record.
pub const SERVICE_NAME: &str = "event_processor";

/// Value of the `version` tag attached to every derived metrics record.
pub const SCHEMA_VERSION: &str = "1.0";
