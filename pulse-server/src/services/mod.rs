//! Services composing the event processing pipeline.

pub mod health_check;
pub mod processor;
pub mod replay_cache;
pub mod server;
pub mod sink;
