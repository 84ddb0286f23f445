//! The metrics collaborator providers report to.

use async_trait::async_trait;

#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// A provider started instances of a workload.
    async fn instance_started(&self, provider: &str);

    /// A provider stopped all instances of a workload.
    async fn instance_stopped(&self, provider: &str);
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl MetricsSink for NoopSink {
    async fn instance_started(&self, _provider: &str) {}

    async fn instance_stopped(&self, _provider: &str) {}
}
