use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use pulse_log::{Level, LogConfig, LogFormat};
use pulse_redis::RedisConfigOptions;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::cache::{CacheBackend, CacheConfig, RedisConnection};

/// Placeholder shown instead of secrets when dumping the configuration.
const REDACTED: &str = "********";

/// Defines the source of a config error.
#[derive(Debug)]
enum ConfigErrorSource {
    /// An error occurring independently.
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating in a field override (an env var, or a CLI parameter).
    FieldOverride(String),
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
}

impl ConfigError {
    #[inline]
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            source: ConfigErrorSource::None,
            kind,
        }
    }

    #[inline]
    fn field(field: &'static str) -> Self {
        Self {
            source: ConfigErrorSource::FieldOverride(field.to_owned()),
            kind: ConfigErrorKind::InvalidValue,
        }
    }

    #[inline]
    fn file(kind: ConfigErrorKind, p: impl AsRef<Path>) -> Self {
        Self {
            source: ConfigErrorSource::File(p.as_ref().to_path_buf()),
            kind,
        }
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            ConfigErrorSource::None => write!(f, "{}", self.kind()),
            ConfigErrorSource::File(file_name) => {
                write!(f, "{} (file {})", self.kind(), file_name.display())
            }
            ConfigErrorSource::FieldOverride(name) => write!(f, "{} (field {})", self.kind(), name),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Indicates config related errors.
#[derive(Clone, Copy, Debug, Eq, Error, Hash, PartialEq)]
#[non_exhaustive]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Failed to save a file.
    #[error("could not write config file")]
    CouldNotWriteFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Parsing JSON failed.
    #[error("could not parse json config file")]
    BadJson,
    /// Invalid config value.
    #[error("invalid config value")]
    InvalidValue,
}

/// Structure used to hold information about configuration overrides via CLI parameters or
/// environment variables.
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The host the HTTP server should bind to (network interface).
    pub host: Option<String>,
    /// The port to bind for the HTTP server.
    pub port: Option<String>,
    /// The host name of the Redis server backing the replay cache.
    pub redis_host: Option<String>,
    /// The port of the Redis server backing the replay cache.
    pub redis_port: Option<String>,
    /// The deployment environment reported in metric tags.
    pub environment: Option<String>,
    /// The url of the analytics sink.
    pub sink_url: Option<String>,
    /// The token sent to the analytics sink.
    pub sink_token: Option<String>,
    /// The table the analytics sink stores records in.
    pub sink_table_name: Option<String>,
    /// The username for basic authentication against the analytics sink.
    pub sink_username: Option<String>,
    /// The password for basic authentication against the analytics sink.
    pub sink_password: Option<String>,
    /// The log level.
    pub log_level: Option<String>,
    /// The log format.
    pub log_format: Option<String>,
    /// The graceful shutdown timeout in seconds.
    pub shutdown_timeout: Option<String>,
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
struct Http {
    /// The host to which to bind.
    host: IpAddr,
    /// The port to which to bind.
    port: u16,
    /// Seconds to wait for in-flight requests on shutdown.
    shutdown_timeout: u64,
}

impl Default for Http {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 8000,
            shutdown_timeout: 10,
        }
    }
}

/// Controls internal metrics reporting.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
struct Metrics {
    /// Hostname and port of the statsd server.
    ///
    /// Defaults to `None`, which disables metrics.
    #[serde(skip_serializing_if = "Option::is_none")]
    statsd: Option<String>,
    /// Common prefix that should be added to all metrics.
    prefix: String,
    /// Default tags to apply to all metrics.
    default_tags: BTreeMap<String, String>,
    /// Tag name to report the hostname to for each metric. Defaults to not sending such a tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    hostname_tag: Option<String>,
    /// Interval in seconds for periodic metrics such as cache pool statistics.
    ///
    /// Set to `0` to disable periodic metrics.
    periodic_secs: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            statsd: None,
            prefix: "pulse".to_owned(),
            default_tags: BTreeMap::new(),
            hostname_tag: None,
            periodic_secs: 5,
        }
    }
}

/// Settings for the analytics sink receiving derived metrics.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
struct Sink {
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<Url>,
    table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    /// Name of the header carrying the token.
    token_header: String,
}

impl Default for Sink {
    fn default() -> Self {
        Self {
            url: None,
            table_name: "metrics".to_owned(),
            username: None,
            password: None,
            token: None,
            token_header: "X-Auth-Token".to_owned(),
        }
    }
}

fn default_environment() -> String {
    "production".to_owned()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ConfigValues {
    #[serde(default)]
    http: Http,
    #[serde(default)]
    logging: LogConfig,
    #[serde(default)]
    metrics: Metrics,
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    sink: Sink,
    #[serde(default = "default_environment")]
    environment: String,
}

impl Default for ConfigValues {
    fn default() -> Self {
        Self {
            http: Http::default(),
            logging: LogConfig::default(),
            metrics: Metrics::default(),
            cache: CacheConfig::default(),
            sink: Sink::default(),
            environment: default_environment(),
        }
    }
}

impl ConfigValues {
    /// The full filename of the config file within the given folder.
    fn path(base: &Path) -> PathBuf {
        base.join("config.yml")
    }

    /// Loads the config file from the given folder.
    fn load(base: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(base);

        let contents = fs::read_to_string(&path)
            .map_err(|_| ConfigError::file(ConfigErrorKind::CouldNotOpenFile, &path))?;

        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&contents)
            .map_err(|_| ConfigError::file(ConfigErrorKind::BadYaml, &path))
    }
}

/// Treats empty strings from the environment as unset.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Config struct.
#[derive(Clone)]
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.path)
            .field("values", &self.values)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            values: ConfigValues::default(),
            path: PathBuf::new(),
        }
    }
}

impl Config {
    /// Loads a config from a given config folder.
    ///
    /// The `config.yml` file within the folder is optional. When it is missing, all values take
    /// their defaults.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = env::current_dir()
            .map(|x| x.join(path.as_ref()))
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        let values = if Self::config_exists(&path) {
            ConfigValues::load(&path)?
        } else {
            ConfigValues::default()
        };

        Ok(Config { values, path })
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Config, ConfigError> {
        Ok(Config {
            values: serde_json::from_value(value)
                .map_err(|_| ConfigError::new(ConfigErrorKind::BadJson))?,
            path: PathBuf::new(),
        })
    }

    /// Override configuration with values coming from other sources (e.g. env variables or
    /// command line parameters).
    ///
    /// Empty strings are treated as absent values.
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        let http = &mut self.values.http;

        if let Some(host) = non_empty(overrides.host) {
            http.host = host
                .parse::<IpAddr>()
                .map_err(|_| ConfigError::field("host"))?;
        }

        if let Some(port) = non_empty(overrides.port) {
            http.port = port
                .as_str()
                .parse()
                .map_err(|_| ConfigError::field("port"))?;
        }

        if let Some(shutdown_timeout) = non_empty(overrides.shutdown_timeout) {
            http.shutdown_timeout = shutdown_timeout
                .parse()
                .map_err(|_| ConfigError::field("shutdown_timeout"))?;
        }

        let cache = &mut self.values.cache;

        // Explicit host or port overrides replace a url from the config file.
        if let Some(redis_host) = non_empty(overrides.redis_host) {
            cache.host = redis_host;
            cache.url = None;
        }

        if let Some(redis_port) = non_empty(overrides.redis_port) {
            cache.port = redis_port
                .parse()
                .map_err(|_| ConfigError::field("redis_port"))?;
            cache.url = None;
        }

        if let Some(environment) = non_empty(overrides.environment) {
            self.values.environment = environment;
        }

        let sink = &mut self.values.sink;

        if let Some(sink_url) = non_empty(overrides.sink_url) {
            sink.url = Some(
                sink_url
                    .parse::<Url>()
                    .map_err(|_| ConfigError::field("sink_url"))?,
            );
        }

        if let Some(table_name) = non_empty(overrides.sink_table_name) {
            sink.table_name = table_name;
        }

        if let Some(token) = non_empty(overrides.sink_token) {
            sink.token = Some(token);
        }

        if let Some(username) = non_empty(overrides.sink_username) {
            sink.username = Some(username);
        }

        if let Some(password) = non_empty(overrides.sink_password) {
            sink.password = Some(password);
        }

        let logging = &mut self.values.logging;

        if let Some(log_level) = non_empty(overrides.log_level) {
            logging.level = log_level
                .parse::<Level>()
                .map_err(|_| ConfigError::field("log_level"))?;
        }

        if let Some(log_format) = non_empty(overrides.log_format) {
            logging.format = match log_format.to_lowercase().as_str() {
                "auto" => LogFormat::Auto,
                "pretty" => LogFormat::Pretty,
                "simplified" => LogFormat::Simplified,
                "json" => LogFormat::Json,
                _ => return Err(ConfigError::field("log_format")),
            };
        }

        Ok(self)
    }

    /// Checks if the config folder contains a config file.
    pub fn config_exists<P: AsRef<Path>>(path: P) -> bool {
        fs::metadata(ConfigValues::path(path.as_ref())).is_ok()
    }

    /// Returns the path of the config folder.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dumps out a YAML string of the values.
    ///
    /// Sink credentials are replaced with a placeholder.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        let mut values = self.values.clone();
        for secret in [&mut values.sink.password, &mut values.sink.token] {
            if secret.is_some() {
                *secret = Some(REDACTED.to_owned());
            }
        }

        serde_yaml::to_string(&values)
            .map_err(|_| ConfigError::new(ConfigErrorKind::CouldNotWriteFile))
    }

    /// Returns the socket address the HTTP server binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.values.http.host, self.values.http.port)
    }

    /// Returns the time to wait for in-flight requests during graceful shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.values.http.shutdown_timeout)
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Returns the name of the deployment environment.
    pub fn environment(&self) -> &str {
        &self.values.environment
    }

    /// Returns the address of the statsd server, if metrics are enabled.
    pub fn statsd_addr(&self) -> Option<&str> {
        self.values.metrics.statsd.as_deref()
    }

    /// Returns the prefix for all internal metrics.
    pub fn metrics_prefix(&self) -> &str {
        &self.values.metrics.prefix
    }

    /// Returns the default tags for internal metrics.
    pub fn metrics_default_tags(&self) -> &BTreeMap<String, String> {
        &self.values.metrics.default_tags
    }

    /// Returns the name of the hostname tag, if configured.
    pub fn metrics_hostname_tag(&self) -> Option<&str> {
        self.values.metrics.hostname_tag.as_deref()
    }

    /// Returns the interval for periodic metrics, or `None` if they are disabled.
    pub fn metrics_periodic_interval(&self) -> Option<Duration> {
        match self.values.metrics.periodic_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Returns the backend of the replay cache.
    pub fn cache_backend(&self) -> CacheBackend {
        self.values.cache.backend
    }

    /// Returns the Redis connection parameters of the replay cache.
    pub fn cache_connection(&self) -> RedisConnection {
        self.values.cache.connection()
    }

    /// Returns the connection pool options of the replay cache.
    pub fn cache_pool_options(&self) -> RedisConfigOptions {
        self.values.cache.pool_options()
    }

    /// Returns the timeout for read commands against the replay cache.
    pub fn cache_read_timeout(&self) -> Duration {
        self.values.cache.read_timeout()
    }

    /// Returns the timeout for write commands against the replay cache.
    pub fn cache_write_timeout(&self) -> Duration {
        self.values.cache.write_timeout()
    }

    /// Returns the url of the analytics sink, if configured.
    pub fn sink_url(&self) -> Option<&Url> {
        self.values.sink.url.as_ref()
    }

    /// Returns the table the analytics sink stores records in.
    pub fn sink_table_name(&self) -> &str {
        &self.values.sink.table_name
    }

    /// Returns the username for basic authentication against the sink.
    pub fn sink_username(&self) -> Option<&str> {
        self.values.sink.username.as_deref().filter(|s| !s.is_empty())
    }

    /// Returns the password for basic authentication against the sink.
    pub fn sink_password(&self) -> Option<&str> {
        self.values.sink.password.as_deref().filter(|s| !s.is_empty())
    }

    /// Returns the token sent to the sink.
    pub fn sink_token(&self) -> Option<&str> {
        self.values.sink.token.as_deref().filter(|s| !s.is_empty())
    }

    /// Returns the name of the header carrying the sink token.
    pub fn sink_token_header(&self) -> &str {
        &self.values.sink.token_header
    }
}
