use anyhow::Result;
use pulse_config::{CacheBackend, Config, RedisConnection};
use pulse_statsd::MetricsClientConfig;

/// Validates the configuration before the server starts.
///
/// Missing sink settings only produce warnings, since events are still accepted and cached
/// without a sink.
pub fn check_config(config: &Config) -> Result<()> {
    if config.sink_table_name().is_empty() {
        anyhow::bail!("the sink table name must not be empty");
    }

    if config.sink_url().is_none() {
        pulse_log::warn!("no sink url configured, derived metrics will not be forwarded");
    }

    if config.sink_token().is_none()
        || config.sink_username().is_none()
        || config.sink_password().is_none()
    {
        pulse_log::warn!("sink credentials are incomplete, derived metrics will not be forwarded");
    }

    Ok(())
}

/// Print spawn infos to the log.
pub fn dump_spawn_infos(config: &Config) {
    if config.path().as_os_str().is_empty() {
        pulse_log::info!("launching {} without config folder", pulse_log::RELEASE);
    } else {
        pulse_log::info!(
            "launching {} from config folder {}",
            pulse_log::RELEASE,
            config.path().display()
        );
    }

    pulse_log::info!("  environment: {}", config.environment());
    pulse_log::info!("  listen address: {}", config.listen_addr());

    match config.cache_backend() {
        CacheBackend::Memory => pulse_log::info!("  replay cache: memory"),
        CacheBackend::Redis => match config.cache_connection() {
            RedisConnection::Single(url) => pulse_log::info!("  replay cache: {url}"),
            RedisConnection::Cluster(nodes) => {
                pulse_log::info!("  replay cache: cluster of {} nodes", nodes.len())
            }
        },
    }

    match config.sink_url() {
        Some(url) => pulse_log::info!("  sink: {url} (table {})", config.sink_table_name()),
        None => pulse_log::info!("  sink: -"),
    }
    pulse_log::info!("  log level: {}", config.logging().level);
}

/// Initialize the metric system.
pub fn init_metrics(config: &Config) -> Result<()> {
    let Some(host) = config.statsd_addr() else {
        return Ok(());
    };

    let mut default_tags = config.metrics_default_tags().clone();
    if let Some(hostname_tag) = config.metrics_hostname_tag()
        && let Some(hostname) = hostname::get().ok().and_then(|s| s.into_string().ok())
    {
        default_tags.insert(hostname_tag.to_owned(), hostname);
    }

    pulse_statsd::init(MetricsClientConfig {
        prefix: config.metrics_prefix(),
        host,
        default_tags,
    })?;

    Ok(())
}
