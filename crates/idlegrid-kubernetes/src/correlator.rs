//! Readiness correlation between Services and Endpoints.
//!
//! A Deployment with ready pods may still be unreachable: its Service has
//! to have picked the pods up as endpoint addresses. The correlator finds
//! every Service whose selector matches the workload's label value and
//! looks for a ready address in the Endpoints object of the same name.
//!
//! ```text
//! services  = list_services(ns).filter(selector[key] == value)   // ≥1 or NoMatchingService
//! endpoints = list_endpoints(ns)                                  // ≥1 or NoEndpoints
//! ready     = endpoints.filter(name ∈ services).any(addresses > 0)
//! ```
//!
//! Neither list supports server-side filtering on this selector shape, so
//! filtering happens here.

use std::collections::HashSet;

use tracing::debug;

use idlegrid_core::{ScaleError, ScaleResult, WorkloadIdentity};

use crate::control_plane::ControlPlane;

/// Outcome of one correlation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    /// Services whose selector matched.
    pub services: Vec<String>,
    /// Ready addresses across the matching services' Endpoints.
    pub ready_addresses: usize,
}

impl Correlation {
    /// Any one matching service with an address is enough.
    pub fn is_ready(&self) -> bool {
        self.ready_addresses > 0
    }
}

pub struct ReadinessCorrelator<'a, C: ?Sized> {
    plane: &'a C,
    label_key: &'a str,
}

impl<'a, C: ControlPlane + ?Sized> ReadinessCorrelator<'a, C> {
    pub fn new(plane: &'a C, label_key: &'a str) -> Self {
        Self { plane, label_key }
    }

    /// Correlate services selecting `label_key=value` in the identity's
    /// namespace with their endpoint addresses.
    pub async fn correlate(
        &self,
        identity: &WorkloadIdentity,
        value: &str,
    ) -> ScaleResult<Correlation> {
        let namespace = identity.namespace.as_str();

        let services: Vec<String> = self
            .plane
            .list_services(namespace)
            .await
            .map_err(|e| ScaleError::control_plane(identity, e))?
            .into_iter()
            .filter(|svc| svc.selects(self.label_key, value))
            .map(|svc| svc.name)
            .collect();

        if services.is_empty() {
            return Err(ScaleError::NoMatchingService {
                namespace: namespace.to_string(),
                key: self.label_key.to_string(),
                value: value.to_string(),
            });
        }

        let endpoints = self
            .plane
            .list_endpoints(namespace)
            .await
            .map_err(|e| ScaleError::control_plane(identity, e))?;

        if endpoints.is_empty() {
            return Err(ScaleError::NoEndpoints {
                namespace: namespace.to_string(),
            });
        }

        let wanted: HashSet<&str> = services.iter().map(String::as_str).collect();
        let ready_addresses = endpoints
            .iter()
            .filter(|ep| wanted.contains(ep.name.as_str()))
            .map(|ep| ep.address_count())
            .sum();

        debug!(
            %namespace,
            key = self.label_key,
            %value,
            services = ?services,
            ready_addresses,
            "correlated services with endpoints"
        );

        Ok(Correlation {
            services,
            ready_addresses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeControlPlane;
    use idlegrid_core::{ControlPlaneError, WorkloadKind};

    fn web() -> WorkloadIdentity {
        WorkloadIdentity::new(WorkloadKind::Deployment, "shop", "web", 1)
    }

    #[tokio::test]
    async fn no_matching_service() {
        let plane = FakeControlPlane::new();
        plane.add_service("shop", "other", &[("app", "other")]);
        plane.add_endpoints("shop", "other", &[1]);

        let err = ReadinessCorrelator::new(&plane, "app")
            .correlate(&web(), "web")
            .await
            .unwrap_err();
        assert!(matches!(err, ScaleError::NoMatchingService { .. }));
    }

    #[tokio::test]
    async fn services_in_other_namespaces_are_ignored() {
        let plane = FakeControlPlane::new();
        plane.add_service("staging", "web", &[("app", "web")]);
        plane.add_endpoints("staging", "web", &[1]);

        let err = ReadinessCorrelator::new(&plane, "app")
            .correlate(&web(), "web")
            .await
            .unwrap_err();
        assert!(matches!(err, ScaleError::NoMatchingService { .. }));
    }

    #[tokio::test]
    async fn no_endpoints_in_namespace() {
        let plane = FakeControlPlane::new();
        plane.add_service("shop", "web", &[("app", "web")]);

        let err = ReadinessCorrelator::new(&plane, "app")
            .correlate(&web(), "web")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ScaleError::NoEndpoints {
                namespace: "shop".to_string()
            }
        );
    }

    #[tokio::test]
    async fn empty_endpoint_is_not_ready() {
        let plane = FakeControlPlane::new();
        plane.add_service("shop", "web", &[("app", "web")]);
        plane.add_endpoints("shop", "web", &[]);

        let c = ReadinessCorrelator::new(&plane, "app")
            .correlate(&web(), "web")
            .await
            .unwrap();
        assert_eq!(c.services, ["web"]);
        assert!(!c.is_ready());
    }

    #[tokio::test]
    async fn endpoint_with_address_is_ready() {
        let plane = FakeControlPlane::new();
        plane.add_service("shop", "web", &[("app", "web"), ("tier", "front")]);
        plane.add_endpoints("shop", "web", &[0, 2]);

        let c = ReadinessCorrelator::new(&plane, "app")
            .correlate(&web(), "web")
            .await
            .unwrap();
        assert_eq!(c.ready_addresses, 2);
        assert!(c.is_ready());
    }

    #[tokio::test]
    async fn unrelated_endpoints_do_not_count() {
        let plane = FakeControlPlane::new();
        plane.add_service("shop", "web", &[("app", "web")]);
        plane.add_service("shop", "cart", &[("app", "cart")]);
        plane.add_endpoints("shop", "web", &[0]);
        plane.add_endpoints("shop", "cart", &[4]);

        let c = ReadinessCorrelator::new(&plane, "app")
            .correlate(&web(), "web")
            .await
            .unwrap();
        assert!(!c.is_ready());
    }

    #[tokio::test]
    async fn any_matching_service_suffices() {
        let plane = FakeControlPlane::new();
        plane.add_service("shop", "web", &[("app", "web")]);
        plane.add_service("shop", "web-internal", &[("app", "web")]);
        plane.add_endpoints("shop", "web", &[]);
        plane.add_endpoints("shop", "web-internal", &[1]);

        let c = ReadinessCorrelator::new(&plane, "app")
            .correlate(&web(), "web")
            .await
            .unwrap();
        assert_eq!(c.services.len(), 2);
        assert_eq!(c.ready_addresses, 1);
        assert!(c.is_ready());
    }

    #[tokio::test]
    async fn custom_label_key() {
        let plane = FakeControlPlane::new();
        plane.add_service("shop", "web", &[("app.kubernetes.io/name", "web")]);
        plane.add_endpoints("shop", "web", &[1]);

        let c = ReadinessCorrelator::new(&plane, "app.kubernetes.io/name")
            .correlate(&web(), "web")
            .await
            .unwrap();
        assert!(c.is_ready());
    }

    #[tokio::test]
    async fn list_failure_is_control_plane_error() {
        let plane = FakeControlPlane::new();
        plane.fail_lists(ControlPlaneError::Api {
            code: 403,
            message: "forbidden".to_string(),
        });

        let err = ReadinessCorrelator::new(&plane, "app")
            .correlate(&web(), "web")
            .await
            .unwrap_err();
        assert!(matches!(err, ScaleError::ControlPlane { .. }));
    }
}
