//! idlegrid-metrics — outcome counters for scaling providers.
//!
//! Providers report every instance start (a scale-up that actually wrote a
//! new replica count) and every instance stop (a scale-down that did) to a
//! [`MetricsSink`]. The process owns the sink and hands it to providers at
//! construction.
//!
//! # Architecture
//!
//! ```text
//! MetricsSink (trait)
//!   ├── InstanceCounters ← in-process per-provider counters
//!   └── NoopSink         ← discards everything
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for a /metrics endpoint
//! ```

pub mod collector;
pub mod prometheus;
pub mod sink;

pub use collector::{InstanceCounters, ProviderCounts};
pub use prometheus::render_prometheus;
pub use sink::{MetricsSink, NoopSink};
