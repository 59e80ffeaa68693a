//! Configuration for the Pulse event processing service.
//!
//! Configuration is loaded from a folder containing an optional `config.yml`. Values missing from
//! the file fall back to defaults, and individual fields can be overridden from the command line or
//! environment through [`OverridableConfig`].
//!
//! ```yaml
//! http:
//!   host: 0.0.0.0
//!   port: 8000
//! cache:
//!   host: redis.internal
//!   port: 6379
//! sink:
//!   url: https://analytics.example.com/api/ingest
//!   table_name: metrics
//! environment: staging
//! ```
#![warn(missing_docs)]

mod cache;
mod config;

pub use self::cache::*;
pub use self::config::*;
