//! A high-level StatsD metric client built on cadence.
//!
//! ## Defining Metrics
//!
//! In order to use metrics, one needs to first define one of the metric traits on a custom enum.
//! The following types of metrics are available: `counter`, `timer`, `gauge` and `distribution`.
//! For explanations on what that means see [Metric Types].
//!
//! The metric traits serve only to provide a type safe metric name. All metric types have exactly
//! the same form, they are different only to ensure that a metric can only be used for the type for
//! which it was defined, (e.g. a counter metric cannot be used as a timer metric). See the traits
//! for more detailed examples.
//!
//! ## Initializing the Client
//!
//! Metrics can be used without initializing a statsd client. In that case, invoking `with_client`
//! or the [`metric!`] macro will become a noop. Only when configured, metrics will actually be
//! collected.
//!
//! To initialize the client, either use [`set_client`] to pass a custom client, or use
//! [`init`] to create a default client with known arguments:
//!
//! ```no_run
//! # use std::collections::BTreeMap;
//! # use pulse_statsd::MetricsClientConfig;
//! pulse_statsd::init(MetricsClientConfig {
//!     prefix: "pulse",
//!     host: "localhost:8125",
//!     default_tags: BTreeMap::new(),
//! })
//! .ok();
//! ```
//!
//! ## Macro Usage
//!
//! The recommended way to record metrics is by using the [`metric!`] macro. See the trait docs
//! for more information on how to record each type of metric.
//!
//! ```
//! use pulse_statsd::{metric, CounterMetric};
//!
//! struct MyCounter;
//!
//! impl CounterMetric for MyCounter {
//!     fn name(&self) -> &'static str {
//!         "counter"
//!     }
//! }
//!
//! metric!(counter(MyCounter) += 1);
//! ```
//!
//! [Metric Types]: https://github.com/statsd/statsd/blob/master/docs/metric_types.md

use std::collections::BTreeMap;
use std::io;
use std::net::{ToSocketAddrs, UdpSocket};
use std::ops::Deref;
use std::sync::Arc;

use cadence::{BufferedUdpMetricSink, Metric, MetricBuilder, QueuingMetricSink, StatsdClient};
use parking_lot::RwLock;

/// Maximum number of metric events that can be queued before we start dropping them.
const METRICS_MAX_QUEUE_SIZE: usize = 100_000;

/// Errors raised while initializing the metrics client.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The configured statsd host could not be resolved.
    #[error("could not resolve statsd host")]
    UnresolvedHost,
    /// The UDP socket for statsd could not be set up.
    #[error("failed to set up statsd socket")]
    Socket(#[from] io::Error),
    /// The cadence sink rejected the configuration.
    #[error("failed to create statsd sink")]
    Sink(#[from] cadence::MetricError),
}

/// Client configuration object to store globally.
#[derive(Debug)]
pub struct MetricsClient {
    /// The raw statsd client.
    pub statsd_client: StatsdClient,
    /// Default tags to apply to every metric.
    pub default_tags: BTreeMap<String, String>,
}

/// Client configuration used for initialization of [`MetricsClient`].
#[derive(Debug)]
pub struct MetricsClientConfig<'a, A> {
    /// Prefix which is appended to all metric names.
    pub prefix: &'a str,
    /// Host of the metrics upstream.
    pub host: A,
    /// Tags that are added to all metrics.
    pub default_tags: BTreeMap<String, String>,
}

impl Deref for MetricsClient {
    type Target = StatsdClient;

    fn deref(&self) -> &StatsdClient {
        &self.statsd_client
    }
}

impl MetricsClient {
    /// Send a metric with the default tags defined on this `MetricsClient`.
    #[inline(always)]
    pub fn send_metric<'a, T>(&'a self, mut metric: MetricBuilder<'a, '_, T>)
    where
        T: Metric + From<String>,
    {
        for (k, v) in &self.default_tags {
            metric = metric.with_tag(k, v);
        }

        if let Err(error) = metric.try_send() {
            pulse_log::error!(
                error = &error as &dyn std::error::Error,
                maximum_capacity = METRICS_MAX_QUEUE_SIZE,
                "error sending a metric",
            );
        }
    }
}

static METRICS_CLIENT: RwLock<Option<Arc<MetricsClient>>> = RwLock::new(None);

thread_local! {
    static CURRENT_CLIENT: std::cell::RefCell<Option<Arc<MetricsClient>>> = METRICS_CLIENT.read().clone().into();
}

/// Internal prelude for the macro
#[doc(hidden)]
pub mod _pred {
    pub use cadence::prelude::*;
}

/// The metrics prelude that is necessary to use the client.
pub mod prelude {
    pub use cadence::prelude::*;
}

/// Set a new statsd client.
pub fn set_client(client: MetricsClient) {
    *METRICS_CLIENT.write() = Some(Arc::new(client));
    CURRENT_CLIENT.with(|cell| cell.replace(METRICS_CLIENT.read().clone()));
}

/// Set a test client for the period of the called function (only affects the current thread).
pub fn with_capturing_test_client(f: impl FnOnce()) -> Vec<String> {
    let (rx, sink) = cadence::SpyMetricSink::new();
    let test_client = MetricsClient {
        statsd_client: StatsdClient::from_sink("", sink),
        default_tags: Default::default(),
    };

    CURRENT_CLIENT.with(|cell| {
        let old_client = cell.replace(Some(Arc::new(test_client)));
        f();
        cell.replace(old_client);
    });

    rx.iter()
        .map(|x| String::from_utf8_lossy(&x).into_owned())
        .collect()
}

/// Tell the metrics system to report to statsd.
pub fn init<A: ToSocketAddrs>(config: MetricsClientConfig<'_, A>) -> Result<(), MetricsError> {
    let addrs: Vec<_> = config.host.to_socket_addrs()?.collect();
    let Some(addr) = addrs.first().copied() else {
        return Err(MetricsError::UnresolvedHost);
    };

    pulse_log::info!("reporting metrics to statsd at {addr}");

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_nonblocking(true)?;

    let udp_sink = BufferedUdpMetricSink::from(addr, socket)?;
    let queuing_sink = QueuingMetricSink::with_capacity(udp_sink, METRICS_MAX_QUEUE_SIZE);
    let statsd_client = StatsdClient::from_sink(config.prefix, queuing_sink);

    set_client(MetricsClient {
        statsd_client,
        default_tags: config.default_tags,
    });

    Ok(())
}

/// Invoke a callback with the current statsd client.
///
/// If statsd is not configured the callback is not invoked.  For the most part
/// the [`metric!`] macro should be used instead.
#[inline(always)]
pub fn with_client<F, R>(f: F) -> R
where
    F: FnOnce(&MetricsClient) -> R,
    R: Default,
{
    CURRENT_CLIENT.with(|client| {
        if let Some(client) = client.borrow().as_deref() {
            f(client)
        } else {
            R::default()
        }
    })
}

/// A timing measured in milliseconds, such as the duration of a cache write.
///
/// Timers are sent as distributions, so percentiles can be computed by the receiving server.
///
/// ```
/// use std::time::Duration;
/// use pulse_statsd::{metric, TimerMetric};
///
/// struct CacheWrite;
///
/// impl TimerMetric for CacheWrite {
///     fn name(&self) -> &'static str {
///         "cache.write_time"
///     }
/// }
///
/// metric!(timer(CacheWrite) = Duration::from_millis(3), backend = "redis");
///
/// let stored = metric!(timer(CacheWrite), { true });
/// # assert!(stored);
/// ```
pub trait TimerMetric {
    /// Returns the timer metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// A count of occurrences, such as processed events. Zero increments are not sent.
///
/// ```
/// use pulse_statsd::{metric, CounterMetric};
///
/// struct EventsProcessed;
///
/// impl CounterMetric for EventsProcessed {
///     fn name(&self) -> &'static str {
///         "event.processed"
///     }
/// }
///
/// metric!(counter(EventsProcessed) += 1, region = "us-east");
/// ```
pub trait CounterMetric {
    /// Returns the counter metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// A sampled value that is not a duration, such as a payload size.
pub trait DistributionMetric {
    /// Returns the distribution metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// An instantaneous value set by the client, such as the number of requests in flight.
///
/// ```
/// use pulse_statsd::{metric, GaugeMetric};
///
/// struct InFlight;
///
/// impl GaugeMetric for InFlight {
///     fn name(&self) -> &'static str {
///         "processor.queue_depth"
///     }
/// }
///
/// metric!(gauge(InFlight) = 3u64);
/// ```
pub trait GaugeMetric {
    /// Returns the gauge metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// Emits a metric.
///
/// See [crate-level documentation](self) for examples.
#[macro_export]
macro_rules! metric {
    // counter increment
    (counter($id:expr) += $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        match $value {
            value if value != 0 => {
                $crate::with_client(|client| {
                    use $crate::_pred::*;
                    client.send_metric(
                        client.count_with_tags(&$crate::CounterMetric::name(&$id), value)
                        $(.with_tag(stringify!($($k).*), $v))*
                    )
                })
            },
            _ => {},
        };
    };

    // gauge set
    (gauge($id:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                client.gauge_with_tags(&$crate::GaugeMetric::name(&$id), $value)
                    $(.with_tag(stringify!($($k).*), $v))*
            )
        })
    };

    // distribution
    (distribution($id:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                client.distribution_with_tags(&$crate::DistributionMetric::name(&$id), $value)
                    $(.with_tag(stringify!($($k).*), $v))*
            )
        })
    };

    // timer value
    (timer($id:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                // Durations are reported in milliseconds rather than cadence's default nanoseconds.
                client.distribution_with_tags(&$crate::TimerMetric::name(&$id), $value.as_nanos() as f64 / 1e6)
                    $(.with_tag(stringify!($($k).*), $v))*
            )
        })
    };

    // timed block
    (timer($id:expr), $($($k:ident).* = $v:expr,)* $block:block) => {{
        let now = std::time::Instant::now();
        let rv = {$block};
        $crate::metric!(timer($id) = now.elapsed() $(, $($k).* = $v)*);
        rv
    }};
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cadence::{NopMetricSink, StatsdClient};

    use crate::{
        CounterMetric, DistributionMetric, GaugeMetric, MetricsClient, TimerMetric, set_client,
        with_capturing_test_client, with_client,
    };

    struct QueueDepth;

    impl GaugeMetric for QueueDepth {
        fn name(&self) -> &'static str {
            "queue_depth"
        }
    }

    struct Processed;

    impl CounterMetric for Processed {
        fn name(&self) -> &'static str {
            "processed"
        }
    }

    struct PayloadSize;

    impl DistributionMetric for PayloadSize {
        fn name(&self) -> &'static str {
            "payload_size"
        }
    }

    struct WriteTime;

    impl TimerMetric for WriteTime {
        fn name(&self) -> &'static str {
            "write_time"
        }
    }

    #[test]
    fn test_gauge_tags() {
        let captures = with_capturing_test_client(|| {
            metric!(gauge(QueueDepth) = 3u64, instance = "i-1");
            metric!(gauge(QueueDepth) = 0u64);
        });

        assert_eq!(captures, ["queue_depth:3|g|#instance:i-1", "queue_depth:0|g"]);
    }

    #[test]
    fn test_set_client_replaces_current() {
        let before = with_client(|c| format!("{c:?}"));
        set_client(MetricsClient {
            statsd_client: StatsdClient::from_sink("pulse", NopMetricSink),
            default_tags: Default::default(),
        });
        let after = with_client(|c| format!("{c:?}"));

        assert_ne!(before, after);
    }

    #[test]
    fn test_counter_dotted_tags() {
        let captures = with_capturing_test_client(|| {
            metric!(
                counter(Processed) += 2,
                event.region = "us-east",
                event_type = "click",
            );
        });

        assert_eq!(
            captures,
            ["processed:2|c|#event.region:us-east,event_type:click"]
        );
    }

    #[test]
    fn test_zero_counter_is_skipped() {
        let captures = with_capturing_test_client(|| {
            metric!(counter(Processed) += 0);
        });
        assert!(captures.is_empty());
    }

    #[test]
    fn test_distribution_tags() {
        let captures = with_capturing_test_client(|| {
            metric!(distribution(PayloadSize) = 123u64, region = "eu-west");
        });
        assert_eq!(captures, ["payload_size:123|d|#region:eu-west"]);
    }

    #[test]
    fn test_timer_in_milliseconds() {
        let captures = with_capturing_test_client(|| {
            metric!(timer(WriteTime) = Duration::from_millis(250));
        });
        assert_eq!(captures, ["write_time:250|d"]);
    }

    #[test]
    fn test_timed_block() {
        let captures = with_capturing_test_client(|| {
            let value = metric!(timer(WriteTime), { 42 });
            assert_eq!(value, 42);
        });
        assert_eq!(captures.len(), 1);
        assert!(captures[0].starts_with("write_time:"));
    }
}
