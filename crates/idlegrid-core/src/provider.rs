//! The provider contract.
//!
//! Every scaling backend (cluster, container engine, swarm) implements
//! [`Provider`]. The proxy layer holds a `dyn Provider` and talks to it only
//! through identity tokens.

use async_trait::async_trait;

use crate::error::ScaleResult;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Short backend name used in logs and metrics labels.
    fn name(&self) -> &'static str;

    /// Bring the workload to its target replica count.
    ///
    /// A workload that already runs any replicas is left untouched.
    async fn scale_up(&self, token: &str) -> ScaleResult<()>;

    /// Bring the workload to zero replicas. No-op if already at zero.
    async fn scale_down(&self, token: &str) -> ScaleResult<()>;

    /// Whether the workload can serve traffic right now.
    ///
    /// Never fails: any error is logged and reported as not ready.
    async fn is_up(&self, token: &str) -> bool;
}
