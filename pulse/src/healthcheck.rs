use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Result, format_err};
use clap::ArgMatches;
use pulse_config::Config;
use reqwest::blocking::Client;

/// Queries the health endpoint of a running instance.
///
/// Without an explicit `--addr`, the configured listen address is used. An unspecified bind
/// address such as `0.0.0.0` is queried on the loopback interface.
pub fn healthcheck(config: &Config, matches: &ArgMatches) -> Result<()> {
    let timeout = matches.get_one::<u64>("timeout").copied().unwrap_or(5);

    let addr = matches
        .get_one::<SocketAddr>("addr")
        .copied()
        .unwrap_or_else(|| local_addr(config.listen_addr()));

    let client = Client::builder()
        .timeout(Some(Duration::from_secs(timeout)))
        .build()
        .unwrap_or_default();

    let response = client.get(format!("http://{addr}/health")).send();

    match response {
        Ok(response) => {
            if response.status().is_success() {
                pulse_log::info!("pulse is healthy");
                Ok(())
            } else {
                pulse_log::error!("pulse is unhealthy. Status code: {}", response.status());
                Err(format_err!(
                    "pulse is unhealthy. Status code: {}",
                    response.status()
                ))
            }
        }
        Err(err) => {
            pulse_log::error!("pulse is unhealthy. Error: {err}");
            Err(err.into())
        }
    }
}

fn local_addr(mut addr: SocketAddr) -> SocketAddr {
    if addr.ip().is_unspecified() {
        match addr {
            SocketAddr::V4(_) => addr.set_ip([127, 0, 0, 1].into()),
            SocketAddr::V6(_) => addr.set_ip(std::net::Ipv6Addr::LOCALHOST.into()),
        }
    }
    addr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_addr() {
        assert_eq!(
            local_addr("0.0.0.0:8000".parse().unwrap()),
            "127.0.0.1:8000".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            local_addr("10.0.0.1:8000".parse().unwrap()),
            "10.0.0.1:8000".parse::<SocketAddr>().unwrap()
        );
    }
}
