//! Delivery of derived metrics records to the external analytics sink.

use std::collections::BTreeMap;
use std::error::Error;
use std::time::Instant;

use chrono::{DateTime, Utc};
use pulse_config::Config;
use pulse_statsd::metric;
use reqwest::StatusCode;
use reqwest::header::{HeaderName, InvalidHeaderName};
use serde::Serialize;
use url::Url;

use crate::constants::SINK_TIMEOUT;
use crate::statsd::{PulseCounters, PulseTimers};

/// Aggregate metrics derived from processing an event.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricsRecord {
    /// Time at which the record was derived.
    pub timestamp: DateTime<Utc>,
    /// Region of the processed event's source.
    pub region: String,
    /// Named metric samples.
    pub metrics: BTreeMap<String, f64>,
    /// Labels describing the emitting service.
    pub tags: BTreeMap<String, String>,
}

/// The request body sent to the sink.
#[derive(Serialize)]
struct SinkPayload<'a> {
    table_name: &'a str,
    timestamp: &'a DateTime<Utc>,
    region: &'a str,
    metrics: &'a BTreeMap<String, f64>,
    tags: &'a BTreeMap<String, String>,
}

/// Forwarding a metrics record did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// Username, password or token are not configured.
    #[error("sink credentials are missing")]
    CredentialsMissing,

    /// No sink url is configured.
    #[error("sink url is not configured")]
    NotConfigured,

    /// The sink did not respond within the request timeout.
    #[error("sink request timed out")]
    Timeout,

    /// The sink responded with a non-success status.
    #[error("sink responded with status {0}")]
    Status(StatusCode),

    /// The request could not be sent or the response could not be read.
    #[error("could not send request to sink")]
    Transport(#[source] reqwest::Error),
}

impl ForwardError {
    /// Returns a short name for the kind of failure, used as metric tag.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::CredentialsMissing => "credentials_missing",
            Self::NotConfigured => "not_configured",
            Self::Timeout => "timeout",
            Self::Status(_) => "status",
            Self::Transport(_) => "transport",
        }
    }
}

impl From<reqwest::Error> for ForwardError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(error)
        }
    }
}

/// The sink client could not be created from the configuration.
#[derive(Debug, thiserror::Error)]
pub enum SinkSetupError {
    /// The configured token header is not a valid header name.
    #[error("invalid sink token header name")]
    TokenHeader(#[from] InvalidHeaderName),

    /// The HTTP client could not be initialized.
    #[error("failed to build the sink http client")]
    Client(#[from] reqwest::Error),
}

#[derive(Clone)]
struct SinkCredentials {
    username: String,
    password: String,
    token: String,
}

impl std::fmt::Debug for SinkCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkCredentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Client sending metrics records to the analytics sink.
///
/// Every call to [`forward`](Self::forward) issues at most one request, bounded by a ten second
/// timeout. Failures are logged and returned, but never retried.
#[derive(Clone, Debug)]
pub struct MetricsSinkClient {
    client: reqwest::Client,
    url: Option<Url>,
    table_name: String,
    token_header: HeaderName,
    credentials: Option<SinkCredentials>,
}

impl MetricsSinkClient {
    /// Creates a client for the sink configured in `config`.
    ///
    /// Missing credentials or a missing url are not an error here. They fail each forward
    /// attempt instead.
    pub fn new(config: &Config) -> Result<Self, SinkSetupError> {
        let client = reqwest::Client::builder().timeout(SINK_TIMEOUT).build()?;

        let credentials = match (
            config.sink_username(),
            config.sink_password(),
            config.sink_token(),
        ) {
            (Some(username), Some(password), Some(token)) => Some(SinkCredentials {
                username: username.to_owned(),
                password: password.to_owned(),
                token: token.to_owned(),
            }),
            _ => None,
        };

        Ok(Self {
            client,
            url: config.sink_url().cloned(),
            table_name: config.sink_table_name().to_owned(),
            token_header: HeaderName::try_from(config.sink_token_header())?,
            credentials,
        })
    }

    /// Sends a metrics record to the sink.
    pub async fn forward(&self, record: &MetricsRecord) -> Result<(), ForwardError> {
        let start = Instant::now();
        let result = self.send(record).await;

        let outcome = match result {
            Ok(()) => "success",
            Err(ref error) => error.outcome(),
        };

        metric!(timer(PulseTimers::SinkForwardTime) = start.elapsed());
        metric!(counter(PulseCounters::SinkForward) += 1, outcome = outcome);

        match result {
            Ok(()) => pulse_log::debug!(region = %record.region, "forwarded metrics to sink"),
            Err(ref error) => pulse_log::error!(
                error = error as &dyn Error,
                region = %record.region,
                "failed to forward metrics to sink"
            ),
        }

        result
    }

    async fn send(&self, record: &MetricsRecord) -> Result<(), ForwardError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(ForwardError::CredentialsMissing)?;
        let url = self.url.as_ref().ok_or(ForwardError::NotConfigured)?;

        let payload = SinkPayload {
            table_name: &self.table_name,
            timestamp: &record.timestamp,
            region: &record.region,
            metrics: &record.metrics,
            tags: &record.tags,
        };

        let response = self
            .client
            .post(url.clone())
            .basic_auth(&credentials.username, Some(&credentials.password))
            .header(&self.token_header, &credentials.token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ForwardError::Status(status));
        }

        Ok(())
    }
}
