//! Scale targets — one adapter per workload kind.
//!
//! Deployments and StatefulSets share the same capability: read the current
//! desired/ready replica counts, write a new desired count. [`scale_target`]
//! picks the adapter for an identity's kind.

use async_trait::async_trait;

use idlegrid_core::{WorkloadIdentity, WorkloadKind};

use crate::control_plane::{ControlPlane, ControlPlaneResult, ScaleUpdate, WorkloadState};

#[async_trait]
pub trait ScaleTarget: Send + Sync {
    fn kind(&self) -> WorkloadKind;

    /// Current state, read fresh from the control plane.
    async fn read(&self) -> ControlPlaneResult<WorkloadState>;

    /// Write a new desired replica count.
    async fn write(&self, update: &ScaleUpdate) -> ControlPlaneResult<()>;
}

pub struct DeploymentTarget<'a, C: ?Sized> {
    plane: &'a C,
    namespace: &'a str,
    name: &'a str,
}

impl<'a, C: ControlPlane + ?Sized> DeploymentTarget<'a, C> {
    pub fn new(plane: &'a C, namespace: &'a str, name: &'a str) -> Self {
        Self {
            plane,
            namespace,
            name,
        }
    }
}

#[async_trait]
impl<C: ControlPlane + ?Sized> ScaleTarget for DeploymentTarget<'_, C> {
    fn kind(&self) -> WorkloadKind {
        WorkloadKind::Deployment
    }

    async fn read(&self) -> ControlPlaneResult<WorkloadState> {
        self.plane.get_deployment(self.namespace, self.name).await
    }

    async fn write(&self, update: &ScaleUpdate) -> ControlPlaneResult<()> {
        self.plane
            .scale_deployment(self.namespace, self.name, update)
            .await
    }
}

pub struct StatefulSetTarget<'a, C: ?Sized> {
    plane: &'a C,
    namespace: &'a str,
    name: &'a str,
}

impl<'a, C: ControlPlane + ?Sized> StatefulSetTarget<'a, C> {
    pub fn new(plane: &'a C, namespace: &'a str, name: &'a str) -> Self {
        Self {
            plane,
            namespace,
            name,
        }
    }
}

#[async_trait]
impl<C: ControlPlane + ?Sized> ScaleTarget for StatefulSetTarget<'_, C> {
    fn kind(&self) -> WorkloadKind {
        WorkloadKind::StatefulSet
    }

    async fn read(&self) -> ControlPlaneResult<WorkloadState> {
        self.plane.get_stateful_set(self.namespace, self.name).await
    }

    async fn write(&self, update: &ScaleUpdate) -> ControlPlaneResult<()> {
        self.plane
            .scale_stateful_set(self.namespace, self.name, update)
            .await
    }
}

/// The adapter for the identity's workload kind.
pub fn scale_target<'a, C: ControlPlane + ?Sized>(
    plane: &'a C,
    identity: &'a WorkloadIdentity,
) -> Box<dyn ScaleTarget + 'a> {
    match identity.kind {
        WorkloadKind::Deployment => Box::new(DeploymentTarget::new(
            plane,
            &identity.namespace,
            &identity.name,
        )),
        WorkloadKind::StatefulSet => Box::new(StatefulSetTarget::new(
            plane,
            &identity.namespace,
            &identity.name,
        )),
    }
}
