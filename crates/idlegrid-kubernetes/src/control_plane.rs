//! The control-plane collaborator.
//!
//! Everything the provider needs from the cluster API, narrowed to plain
//! projections so scaling logic can be exercised against an in-memory fake.

use std::collections::BTreeMap;

use async_trait::async_trait;

use idlegrid_core::ControlPlaneError;

pub type ControlPlaneResult<T> = Result<T, ControlPlaneError>;

/// One read of a scalable workload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkloadState {
    /// `spec.replicas`.
    pub desired_replicas: i32,
    /// `status.readyReplicas`.
    pub ready_replicas: i32,
    /// Version token to send back with a write. A write carrying a stale
    /// version is rejected with `ControlPlaneError::Conflict`.
    pub resource_version: Option<String>,
    /// Labels on the pod template.
    pub template_labels: BTreeMap<String, String>,
}

/// A replica count to write, guarded by the version it was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleUpdate {
    pub replicas: i32,
    pub resource_version: Option<String>,
}

/// A Service and its pod selector.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceSelector {
    pub name: String,
    pub selector: BTreeMap<String, String>,
}

impl ServiceSelector {
    pub fn selects(&self, key: &str, value: &str) -> bool {
        self.selector.get(key).is_some_and(|v| v == value)
    }
}

/// An Endpoints object: ready address count per subset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndpointReport {
    pub name: String,
    pub subset_addresses: Vec<usize>,
}

impl EndpointReport {
    pub fn address_count(&self) -> usize {
        self.subset_addresses.iter().sum()
    }
}

#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> ControlPlaneResult<WorkloadState>;

    async fn scale_deployment(
        &self,
        namespace: &str,
        name: &str,
        update: &ScaleUpdate,
    ) -> ControlPlaneResult<()>;

    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> ControlPlaneResult<WorkloadState>;

    async fn scale_stateful_set(
        &self,
        namespace: &str,
        name: &str,
        update: &ScaleUpdate,
    ) -> ControlPlaneResult<()>;

    /// All Services in the namespace. Selector filtering is client-side.
    async fn list_services(&self, namespace: &str) -> ControlPlaneResult<Vec<ServiceSelector>>;

    /// All Endpoints objects in the namespace.
    async fn list_endpoints(&self, namespace: &str) -> ControlPlaneResult<Vec<EndpointReport>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_match_requires_exact_value() {
        let svc = ServiceSelector {
            name: "web".to_string(),
            selector: BTreeMap::from([("app".to_string(), "web".to_string())]),
        };
        assert!(svc.selects("app", "web"));
        assert!(!svc.selects("app", "web-canary"));
        assert!(!svc.selects("tier", "web"));
    }

    #[test]
    fn address_count_sums_subsets() {
        let report = EndpointReport {
            name: "web".to_string(),
            subset_addresses: vec![2, 0, 1],
        };
        assert_eq!(report.address_count(), 3);
        assert_eq!(EndpointReport::default().address_count(), 0);
    }
}
