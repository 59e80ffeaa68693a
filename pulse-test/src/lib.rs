//! Helpers for testing the web server and services.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output is
//!    captured by the test runner. All logs emitted with [`pulse_log`] will show up for test
//!    failures or when run with `--nocapture`.
//!  - Use [`MiniSink`] in place of the analytics sink. It records every request it receives.
//!
//! # Example
//!
//! ```no_run
//! #[tokio::test]
//! async fn my_test() {
//!     pulse_test::setup();
//!
//!     let sink = pulse_test::MiniSink::start().await;
//!     pulse_log::debug!("sink listening at {}", sink.url());
//! }
//! ```

mod mini_sink;

pub use self::mini_sink::*;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from this crate and mutes all other logs.
pub fn setup() {
    pulse_log::init_test!();
}
