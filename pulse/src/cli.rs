use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use pulse_config::{Config, OverridableConfig};

use crate::cliapp::make_app;
use crate::{healthcheck, setup};

/// Runs the command line application.
pub fn execute() -> Result<()> {
    let app = make_app();
    let matches = app.get_matches();
    let config_path = matches
        .get_one::<PathBuf>("config")
        .map_or(Path::new(".pulse"), PathBuf::as_path);

    let mut config = Config::from_path(config_path)?;
    config.apply_override(extract_config_args(&matches))?;

    pulse_log::init(config.logging());

    match matches.subcommand() {
        Some(("run", _)) => run(config),
        Some(("healthcheck", matches)) => healthcheck::healthcheck(&config, matches),
        Some(("config", matches)) => manage_config(&config, matches),
        _ => unreachable!(),
    }
}

/// Extracts config overrides from the command line arguments and the environment.
pub fn extract_config_args(matches: &ArgMatches) -> OverridableConfig {
    let value = |id: &str| matches.get_one::<String>(id).cloned();

    OverridableConfig {
        host: value("host"),
        port: value("port"),
        redis_host: value("redis_host"),
        redis_port: value("redis_port"),
        environment: value("environment"),
        sink_url: value("sink_url"),
        sink_token: value("sink_token"),
        sink_table_name: value("sink_table"),
        sink_username: value("sink_username"),
        sink_password: value("sink_password"),
        log_level: value("log_level"),
        log_format: value("log_format"),
        shutdown_timeout: value("shutdown_timeout"),
    }
}

#[allow(clippy::print_stdout)]
pub fn manage_config(config: &Config, matches: &ArgMatches) -> Result<()> {
    let Some(("show", matches)) = matches.subcommand() else {
        unreachable!();
    };

    match matches.get_one::<String>("format").map(String::as_str) {
        Some("debug") => println!("{config:#?}"),
        Some("yaml") => println!("{}", config.to_yaml_string()?),
        _ => bail!("unsupported format"),
    }

    Ok(())
}

pub fn run(config: Config) -> Result<()> {
    setup::check_config(&config)?;
    setup::dump_spawn_infos(&config);
    setup::init_metrics(&config).context("failed to initialize metrics")?;

    pulse_server::run(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_config_args() {
        let matches = make_app()
            .try_get_matches_from([
                "pulse",
                "config",
                "show",
                "--redis-host",
                "cache.internal",
                "--sink-password",
                "hunter2",
            ])
            .unwrap();

        let overrides = extract_config_args(&matches);
        assert_eq!(overrides.redis_host.as_deref(), Some("cache.internal"));
        assert_eq!(overrides.sink_password.as_deref(), Some("hunter2"));

        let mut config = Config::default();
        config.apply_override(overrides).unwrap();
        assert_eq!(config.sink_password(), Some("hunter2"));
    }
}
