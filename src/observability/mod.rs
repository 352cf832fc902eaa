//! Observability for the bridge
//!
//! Structured logging through `tracing` and in-process counters that account
//! for every frame and event that does not reach the broker.

pub mod logging;
pub mod metrics;

// Re-export for convenience
pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{MetricsCollector, MetricsSnapshot};

// Span macros for structured logging
pub use logging::{ingest_span, lifecycle_span, publish_span};
