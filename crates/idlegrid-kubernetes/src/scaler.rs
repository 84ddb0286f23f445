//! Kubernetes scaler — the `Provider` for Deployments and StatefulSets.
//!
//! Scale mutations are read-then-write: read the workload, leave it alone
//! if it is already where we want it, otherwise write the new replica
//! count guarded by the resource version we read. Two callers racing on the
//! same workload cannot both win; the loser gets a conflict error.
//!
//! Every operation runs under the configured request timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use idlegrid_core::{
    ControlPlaneError, IdentityCodec, IdentityError, Provider, ProviderConfig, ScaleError,
    ScaleResult, WorkloadIdentity, WorkloadKind,
};
use idlegrid_metrics::MetricsSink;

use crate::control_plane::{ControlPlane, ScaleUpdate};
use crate::correlator::ReadinessCorrelator;
use crate::target::scale_target;

/// Provider name used in logs and metrics labels.
pub const PROVIDER_NAME: &str = "kubernetes";

/// What a scale call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleOutcome {
    /// Desired replicas changed.
    Scaled { from: i32, to: i32 },
    /// Nothing written; the workload was already scaled that way.
    Unchanged { replicas: i32 },
}

pub struct KubernetesScaler<C> {
    plane: Arc<C>,
    codec: IdentityCodec,
    selector_label: String,
    request_timeout: Duration,
    metrics: Arc<dyn MetricsSink>,
}

impl<C: ControlPlane> KubernetesScaler<C> {
    pub fn new(plane: Arc<C>, config: &ProviderConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            plane,
            codec: config.identity_codec(),
            selector_label: config.selector_label.clone(),
            request_timeout: config.request_timeout,
            metrics,
        }
    }

    pub fn codec(&self) -> &IdentityCodec {
        &self.codec
    }

    /// Scale the workload up to its target unless it already runs replicas.
    pub async fn scale_up_identity(&self, identity: &WorkloadIdentity) -> ScaleResult<ScaleOutcome> {
        if identity.target_replicas == 0 {
            return Err(IdentityError::InvalidReplicaCount("0".to_string()).into());
        }
        let target = i32::try_from(identity.target_replicas)
            .map_err(|_| IdentityError::InvalidReplicaCount(identity.target_replicas.to_string()))?;

        let outcome = self
            .with_timeout(identity, self.set_replicas(identity, target, |current| current != 0))
            .await?;

        if let ScaleOutcome::Scaled { from, to } = outcome {
            info!(
                kind = %identity.kind,
                namespace = %identity.namespace,
                name = %identity.name,
                from,
                to,
                "scaled up"
            );
            self.metrics.instance_started(PROVIDER_NAME).await;
        }
        Ok(outcome)
    }

    /// Scale the workload down to zero unless it is already there.
    pub async fn scale_down_identity(
        &self,
        identity: &WorkloadIdentity,
    ) -> ScaleResult<ScaleOutcome> {
        let outcome = self
            .with_timeout(identity, self.set_replicas(identity, 0, |current| current == 0))
            .await?;

        if let ScaleOutcome::Scaled { from, to } = outcome {
            info!(
                kind = %identity.kind,
                namespace = %identity.namespace,
                name = %identity.name,
                from,
                to,
                "scaled down"
            );
            self.metrics.instance_stopped(PROVIDER_NAME).await;
        }
        Ok(outcome)
    }

    /// Whether the workload can serve traffic. Errors are returned here and
    /// folded into `false` by `Provider::is_up`.
    pub async fn readiness(&self, identity: &WorkloadIdentity) -> ScaleResult<bool> {
        self.with_timeout(identity, self.check_readiness(identity)).await
    }

    /// Read, then write `replicas` unless `settled(current)` holds.
    async fn set_replicas(
        &self,
        identity: &WorkloadIdentity,
        replicas: i32,
        settled: impl Fn(i32) -> bool + Send,
    ) -> ScaleResult<ScaleOutcome> {
        let target = scale_target(self.plane.as_ref(), identity);

        let state = target
            .read()
            .await
            .map_err(|e| ScaleError::control_plane(identity, e))?;
        let current = state.desired_replicas;

        if settled(current) {
            debug!(
                kind = %target.kind(),
                namespace = %identity.namespace,
                name = %identity.name,
                replicas = current,
                "already scaled, nothing to do"
            );
            return Ok(ScaleOutcome::Unchanged { replicas: current });
        }

        let written = target
            .write(&ScaleUpdate {
                replicas,
                resource_version: state.resource_version,
            })
            .await;

        match written {
            Ok(()) => Ok(ScaleOutcome::Scaled {
                from: current,
                to: replicas,
            }),
            // A retried write whose first attempt landed, or another caller
            // scaling the same way, both leave the workload settled.
            Err(e) if e.is_conflict() => {
                let state = target
                    .read()
                    .await
                    .map_err(|e| ScaleError::control_plane(identity, e))?;
                if settled(state.desired_replicas) {
                    debug!(
                        kind = %target.kind(),
                        namespace = %identity.namespace,
                        name = %identity.name,
                        replicas = state.desired_replicas,
                        "write conflicted but workload is already scaled"
                    );
                    Ok(ScaleOutcome::Unchanged {
                        replicas: state.desired_replicas,
                    })
                } else {
                    Err(ScaleError::control_plane(identity, e))
                }
            }
            Err(e) => Err(ScaleError::control_plane(identity, e)),
        }
    }

    async fn check_readiness(&self, identity: &WorkloadIdentity) -> ScaleResult<bool> {
        let state = scale_target(self.plane.as_ref(), identity)
            .read()
            .await
            .map_err(|e| ScaleError::control_plane(identity, e))?;

        if state.ready_replicas <= 0 {
            return Ok(false);
        }

        match identity.kind {
            WorkloadKind::StatefulSet => Ok(true),
            WorkloadKind::Deployment => {
                let value = state
                    .template_labels
                    .get(&self.selector_label)
                    .ok_or_else(|| ScaleError::MissingSelectorLabel {
                        kind: identity.kind,
                        namespace: identity.namespace.clone(),
                        name: identity.name.clone(),
                        key: self.selector_label.clone(),
                    })?;

                let correlation = ReadinessCorrelator::new(self.plane.as_ref(), &self.selector_label)
                    .correlate(identity, value)
                    .await?;
                Ok(correlation.is_ready())
            }
        }
    }

    async fn with_timeout<T>(
        &self,
        identity: &WorkloadIdentity,
        fut: impl Future<Output = ScaleResult<T>>,
    ) -> ScaleResult<T> {
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .unwrap_or_else(|_| {
                Err(ScaleError::control_plane(
                    identity,
                    ControlPlaneError::Timeout(self.request_timeout),
                ))
            })
    }

    fn decode(&self, token: &str) -> ScaleResult<WorkloadIdentity> {
        self.codec.decode(token).map_err(|e| {
            warn!(
                %token,
                delimiter = self.codec.delimiter(),
                error = %e,
                "rejected identity token"
            );
            ScaleError::from(e)
        })
    }
}

#[async_trait]
impl<C: ControlPlane + 'static> Provider for KubernetesScaler<C> {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn scale_up(&self, token: &str) -> ScaleResult<()> {
        let identity = self.decode(token)?;
        self.scale_up_identity(&identity)
            .await
            .map(|_| ())
            .inspect_err(|e| warn!(%token, error = %e, "scale up failed"))
    }

    async fn scale_down(&self, token: &str) -> ScaleResult<()> {
        let identity = self.decode(token)?;
        self.scale_down_identity(&identity)
            .await
            .map(|_| ())
            .inspect_err(|e| warn!(%token, error = %e, "scale down failed"))
    }

    async fn is_up(&self, token: &str) -> bool {
        let Ok(identity) = self.decode(token) else {
            return false;
        };

        match self.readiness(&identity).await {
            Ok(ready) => ready,
            Err(e @ (ScaleError::NoMatchingService { .. } | ScaleError::NoEndpoints { .. })) => {
                debug!(%token, reason = %e, "workload not reachable yet");
                false
            }
            Err(e) => {
                warn!(%token, error = %e, "readiness check failed");
                false
            }
        }
    }
}
