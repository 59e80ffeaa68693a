//! This module implements the definition of the command line app.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::builder::ValueParser;
use clap::{Arg, ArgAction, Command, value_parser};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "Pulse ingests telemetry events and forwards derived metrics.";

/// Creates an argument that overrides a config value, readable from `env`.
fn override_arg(id: &'static str, long: &'static str, env: &'static str) -> Arg {
    Arg::new(id)
        .long(long)
        .env(env)
        .global(true)
        .hide_env_values(true)
        .value_parser(ValueParser::string())
}

pub fn make_app() -> Command {
    Command::new("pulse")
        .disable_help_subcommand(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .max_term_width(79)
        .version(VERSION)
        .about(ABOUT)
        .arg(
            Arg::new("config")
                .value_name("CONFIG")
                .long("config")
                .short('c')
                .global(true)
                .env("PULSE_CONFIG_PATH")
                .value_parser(value_parser!(PathBuf))
                .help("The path to the config folder."),
        )
        .arg(override_arg("host", "host", "PULSE_HOST").help("The host address to bind to."))
        .arg(override_arg("port", "port", "PULSE_PORT").help("The port to bind to."))
        .arg(
            override_arg("redis_host", "redis-host", "REDIS_HOST")
                .help("The host of the Redis server backing the replay cache."),
        )
        .arg(
            override_arg("redis_port", "redis-port", "REDIS_PORT")
                .help("The port of the Redis server backing the replay cache."),
        )
        .arg(
            override_arg("environment", "environment", "ENVIRONMENT")
                .help("The deployment environment reported with derived metrics."),
        )
        .arg(
            override_arg("sink_url", "sink-url", "SINK_URL")
                .help("The url of the analytics sink."),
        )
        .arg(
            override_arg("sink_token", "sink-token", "SINK_AUTH_TOKEN")
                .help("The token sent to the analytics sink."),
        )
        .arg(
            override_arg("sink_table", "sink-table", "SINK_TABLE_NAME")
                .help("The table the analytics sink stores records in."),
        )
        .arg(
            override_arg("sink_username", "sink-username", "SINK_USERNAME")
                .help("The username for basic authentication against the sink."),
        )
        .arg(
            override_arg("sink_password", "sink-password", "SINK_PASSWORD")
                .help("The password for basic authentication against the sink."),
        )
        .arg(
            override_arg("log_level", "log-level", "PULSE_LOG_LEVEL")
                .help("The log level: error, warn, info, debug, trace or off."),
        )
        .arg(
            override_arg("log_format", "log-format", "PULSE_LOG_FORMAT")
                .help("The log format: auto, pretty, simplified or json."),
        )
        .arg(
            override_arg("shutdown_timeout", "shutdown-timeout", "SHUTDOWN_TIMEOUT")
                .help("Seconds to wait for in-flight requests on shutdown."),
        )
        .subcommand(Command::new("run").about("Run the event processing server").after_help(
            "This runs Pulse in the foreground until it receives SIGINT or SIGTERM.  It \
             binds to the port and network interface configured in the config file.",
        ))
        .subcommand(
            Command::new("healthcheck")
                .about("Check the health of a running instance")
                .after_help(
                    "This queries the health endpoint of a running instance and exits with a \
                     non-zero status code if it is unhealthy or unreachable.",
                )
                .arg(
                    Arg::new("addr")
                        .long("addr")
                        .value_name("ADDR")
                        .value_parser(value_parser!(SocketAddr))
                        .help("The address of the instance, defaults to the listen address."),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_name("SECONDS")
                        .default_value("5")
                        .value_parser(value_parser!(u64))
                        .help("The request timeout in seconds."),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Manage the Pulse config")
                .subcommand_required(true)
                .subcommand(
                    Command::new("show")
                        .about("Show the entire config out for debugging purposes")
                        .after_help(
                            "This dumps out the entire config including the values which \
                             are not in the config file but filled in from defaults or \
                             overrides.  Sink credentials are redacted.",
                        )
                        .arg(
                            Arg::new("format")
                                .short('f')
                                .long("format")
                                .value_parser(["debug", "yaml"])
                                .default_value("yaml")
                                .action(ArgAction::Set)
                                .help("The output format"),
                        ),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_app() {
        make_app().debug_assert();
    }

    #[test]
    fn test_parse_overrides() {
        let matches = make_app()
            .try_get_matches_from([
                "pulse",
                "run",
                "--port",
                "9000",
                "--sink-table",
                "events",
            ])
            .unwrap();

        assert_eq!(
            matches.get_one::<String>("port").map(String::as_str),
            Some("9000")
        );
        assert_eq!(
            matches.get_one::<String>("sink_table").map(String::as_str),
            Some("events")
        );
    }

    #[test]
    fn test_healthcheck_args() {
        let matches = make_app()
            .try_get_matches_from(["pulse", "healthcheck", "--addr", "127.0.0.1:8000"])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();

        assert_eq!(name, "healthcheck");
        assert_eq!(
            sub.get_one::<SocketAddr>("addr"),
            Some(&"127.0.0.1:8000".parse().unwrap())
        );
        assert_eq!(sub.get_one::<u64>("timeout"), Some(&5));
    }
}
