//! Pooled Redis and Redis cluster abstraction for Pulse.
//!
//! The pool is fully asynchronous: acquiring a connection and running a command suspend the calling
//! task instead of blocking the runtime thread.
#![warn(missing_docs)]

mod config;
mod real;

pub use self::config::*;
pub use self::real::*;
