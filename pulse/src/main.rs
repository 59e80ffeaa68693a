//! The Pulse event processing service.
//!
//! Pulse accepts telemetry events over HTTP, keeps a short-lived copy of each event in a Redis
//! replay cache and forwards derived metrics to an external analytics sink.
//!
//! # Usage
//!
//! ```text
//! pulse run --config .pulse
//! pulse healthcheck --addr 127.0.0.1:8000
//! pulse config show
//! ```
//!
//! Configuration is read from `config.yml` in the config folder. Most options can also be set
//! through command line arguments or environment variables, see `pulse --help`.

mod cli;
mod cliapp;
mod healthcheck;
mod setup;

use std::process;

#[cfg(target_os = "linux")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            pulse_log::ensure_error(&err);
            1
        }
    };

    process::exit(exit_code);
}
