//! idlegrid-kubernetes — scale-to-zero provider for Kubernetes workloads.
//!
//! Scales Deployments and StatefulSets between zero and their target size
//! and decides whether they can serve traffic.
//!
//! # Architecture
//!
//! ```text
//! KubernetesScaler (Provider)
//!   ├── IdentityCodec        token → WorkloadIdentity, once per call
//!   ├── scale_target()       kind → DeploymentTarget | StatefulSetTarget
//!   ├── ReadinessCorrelator  services selecting the pod label ∩ endpoints
//!   └── ControlPlane (trait)
//!       └── KubeControlPlane kube-rs client + throttle + reconnect backoff
//! ```
//!
//! # Readiness
//!
//! A StatefulSet is up when it reports a ready replica. A Deployment is up
//! when it reports a ready replica *and* at least one Service selecting its
//! pods has a ready address in its Endpoints.

pub mod control_plane;
pub mod correlator;
pub mod kube_client;
pub mod scaler;
pub mod target;

#[cfg(test)]
mod testing;

pub use control_plane::{ControlPlane, EndpointReport, ScaleUpdate, ServiceSelector, WorkloadState};
pub use correlator::{Correlation, ReadinessCorrelator};
pub use kube_client::KubeControlPlane;
pub use scaler::{KubernetesScaler, ScaleOutcome};
pub use target::{DeploymentTarget, ScaleTarget, StatefulSetTarget, scale_target};
