//! Logging facade for Pulse.
//!
//! All crates log through the macros re-exported here: [`error!`], [`warn!`], [`info!`],
//! [`debug!`] and [`trace!`]. They accept format strings as well as structured fields:
//!
//! ```
//! let event_id = "evt-1";
//! pulse_log::debug!(event_id = %event_id, "event persisted");
//! ```
//!
//! Messages start lowercase and carry no trailing punctuation. Failures that are handled, such as
//! an undeliverable metrics record, are logged where they are handled and not propagated further.
//!
//! The binary installs the subscriber once at startup with `init` (feature `init`), passing the
//! `logging` section of the config. Errors that occur before that are reported with
//! [`ensure_error`], which falls back to stderr. Wrap errors in [`LogError`] to print their causes:
//!
//! ```
//! use pulse_log::LogError;
//!
//! let error = std::io::Error::other("connection refused");
//! pulse_log::error!("cache write failed: {}", LogError(&error));
//! ```
//!
//! Tests call `init_test!` (feature `test`), which captures output of the calling crate only.

#![warn(missing_docs)]

#[cfg(feature = "init")]
mod setup;
#[cfg(feature = "init")]
pub use setup::*;

#[cfg(feature = "test")]
mod test;
#[cfg(feature = "test")]
pub use test::*;

mod utils;
pub use utils::*;

// Expose the minimal log facade.
#[doc(inline)]
pub use tracing::{debug, error, info, trace, warn};
