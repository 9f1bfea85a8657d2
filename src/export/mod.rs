//! Prometheus exposition of handler instruments and agent health metrics.

pub mod health;

pub use health::HealthMetrics;
