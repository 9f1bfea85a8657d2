//! Turns a runtime flight-recorder event stream into bounded-cardinality
//! Prometheus metrics.
//!
//! Events arrive as JSON lines ([`event::parse`]), are routed by type through
//! the [`handler::HandlerRegistry`] and recorded into instruments created by a
//! [`metrics::Meter`]. Per-thread handlers fan out by thread group so the
//! number of series stays bounded.

pub mod agent;
pub mod config;
pub mod event;
pub mod export;
pub mod handler;
pub mod metrics;
