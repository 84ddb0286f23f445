//! `ControlPlane` backed by a kube-rs client.
//!
//! Every request first takes a token from the provider's throttle. Requests
//! that fail at the transport layer are retried under the reconnect
//! backoff; API errors (not found, conflict, forbidden) are returned as-is.
//!
//! Scale writes go through the `scale` subresource with the workload's
//! resource version attached, so the API server rejects writes computed from
//! a stale read with 409 Conflict.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::autoscaling::v1::{Scale, ScaleSpec};
use k8s_openapi::api::core::v1::{Endpoints, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{ListParams, PostParams};
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info, warn};

use idlegrid_core::{ControlPlaneError, ProviderConfig, ReconnectBackoff, RequestThrottle};

use crate::control_plane::{
    ControlPlane, ControlPlaneResult, EndpointReport, ScaleUpdate, ServiceSelector, WorkloadState,
};

/// Kubernetes API client shared by all calls of one provider.
///
/// Cheap to clone; clones share the throttle.
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
    throttle: Arc<RequestThrottle>,
    /// Template copied for every call so retries never leak across calls.
    reconnect: ReconnectBackoff,
}

impl KubeControlPlane {
    /// Wrap an existing client.
    pub fn from_client(client: Client, config: &ProviderConfig) -> Self {
        Self {
            client,
            throttle: Arc::new(config.request_throttle()),
            reconnect: config.reconnect_backoff(),
        }
    }

    /// Build a client from the ambient kubeconfig or in-cluster service
    /// account and wait until the API server answers.
    ///
    /// Unreachable API servers are retried under the reconnect backoff.
    pub async fn connect(config: &ProviderConfig) -> ControlPlaneResult<Self> {
        let kube_config = kube::Config::infer()
            .await
            .map_err(|e| ControlPlaneError::Client(format!("cannot load cluster config: {e}")))?;
        let cluster_url = kube_config.cluster_url.to_string();

        let mut backoff = config.reconnect_backoff();
        loop {
            match Self::try_connect(kube_config.clone()).await {
                Ok(client) => {
                    let plane = Self::from_client(client, config);
                    info!(
                        %cluster_url,
                        qps = plane.throttle.qps(),
                        burst = plane.throttle.burst(),
                        unlimited_retries = plane.reconnect.is_unlimited(),
                        "connected to control plane"
                    );
                    return Ok(plane);
                }
                Err(e) if !e.is_transport() => return Err(e),
                Err(e) => match backoff.next_delay() {
                    Some(delay) => {
                        warn!(%cluster_url, error = %e, ?delay, "control plane unreachable, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        return Err(ControlPlaneError::Unavailable {
                            attempts: backoff.failures(),
                            last_error: e.to_string(),
                        });
                    }
                },
            }
        }
    }

    async fn try_connect(kube_config: kube::Config) -> ControlPlaneResult<Client> {
        let client = Client::try_from(kube_config).map_err(|e| map_kube_error("client", e))?;
        let version = client
            .apiserver_version()
            .await
            .map_err(|e| map_kube_error("version", e))?;
        debug!(version = %version.git_version, "control plane version");
        Ok(client)
    }

    async fn call<T, F, Fut>(&self, resource: &str, op: F) -> ControlPlaneResult<T>
    where
        F: Fn() -> Fut + Send,
        Fut: Future<Output = Result<T, kube::Error>> + Send,
        T: Send,
    {
        with_reconnect(&self.throttle, self.reconnect.clone(), resource, op).await
    }

    async fn get_workload<K>(
        &self,
        namespace: &str,
        name: &str,
        plural: &str,
        project: fn(K) -> WorkloadState,
    ) -> ControlPlaneResult<WorkloadState>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + serde::de::DeserializeOwned
            + std::fmt::Debug
            + Send
            + 'static,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let resource = format!("{plural}/{namespace}/{name}");
        let name = name.to_string();
        let workload = self
            .call(&resource, move || {
                let api = api.clone();
                let name = name.clone();
                async move { api.get(&name).await }
            })
            .await?;
        Ok(project(workload))
    }

    async fn replace_scale<K>(
        &self,
        namespace: &str,
        name: &str,
        plural: &str,
        update: &ScaleUpdate,
    ) -> ControlPlaneResult<()>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + serde::de::DeserializeOwned
            + std::fmt::Debug
            + Send
            + 'static,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let resource = format!("{plural}/{namespace}/{name}/scale");
        let body = scale_body(namespace, name, update)?;
        let name = name.to_string();
        self.call(&resource, move || {
            let api = api.clone();
            let name = name.clone();
            let body = body.clone();
            async move {
                api.replace_scale(&name, &PostParams::default(), body)
                    .await
            }
        })
        .await?;
        Ok(())
    }
}

/// Run `op` after taking a throttle token, retrying transport failures
/// under `backoff`.
async fn with_reconnect<T, F, Fut>(
    throttle: &RequestThrottle,
    mut backoff: ReconnectBackoff,
    resource: &str,
    op: F,
) -> ControlPlaneResult<T>
where
    F: Fn() -> Fut + Send,
    Fut: Future<Output = Result<T, kube::Error>> + Send,
    T: Send,
{
    loop {
        throttle.acquire().await;
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => map_kube_error(resource, e),
        };
        if !err.is_transport() {
            return Err(err);
        }
        match backoff.next_delay() {
            Some(delay) => {
                warn!(%resource, error = %err, ?delay, "control plane connection lost, retrying");
                tokio::time::sleep(delay).await;
            }
            None => {
                return Err(ControlPlaneError::Unavailable {
                    attempts: backoff.failures(),
                    last_error: err.to_string(),
                });
            }
        }
    }
}

fn map_kube_error(resource: &str, e: kube::Error) -> ControlPlaneError {
    match e {
        kube::Error::Api(resp) => match resp.code {
            404 => ControlPlaneError::NotFound {
                resource: resource.to_string(),
            },
            409 => ControlPlaneError::Conflict {
                resource: resource.to_string(),
                message: resp.message,
            },
            code => ControlPlaneError::Api {
                code,
                message: resp.message,
            },
        },
        kube::Error::HyperError(e) => ControlPlaneError::Transport(e.to_string()),
        kube::Error::Service(e) => ControlPlaneError::Transport(e.to_string()),
        other => ControlPlaneError::Client(other.to_string()),
    }
}

fn scale_body(namespace: &str, name: &str, update: &ScaleUpdate) -> ControlPlaneResult<Vec<u8>> {
    let scale = Scale {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            resource_version: update.resource_version.clone(),
            ..Default::default()
        },
        spec: Some(ScaleSpec {
            replicas: Some(update.replicas),
        }),
        status: None,
    };
    serde_json::to_vec(&scale).map_err(|e| ControlPlaneError::Encode(e.to_string()))
}

fn deployment_state(d: Deployment) -> WorkloadState {
    let spec = d.spec.unwrap_or_default();
    WorkloadState {
        // The API server defaults an unset replica count to 1.
        desired_replicas: spec.replicas.unwrap_or(1),
        ready_replicas: d.status.and_then(|s| s.ready_replicas).unwrap_or(0),
        resource_version: d.metadata.resource_version,
        template_labels: spec
            .template
            .metadata
            .and_then(|m| m.labels)
            .unwrap_or_default(),
    }
}

fn stateful_set_state(s: StatefulSet) -> WorkloadState {
    let spec = s.spec.unwrap_or_default();
    WorkloadState {
        desired_replicas: spec.replicas.unwrap_or(1),
        ready_replicas: s.status.and_then(|st| st.ready_replicas).unwrap_or(0),
        resource_version: s.metadata.resource_version,
        template_labels: spec
            .template
            .metadata
            .and_then(|m| m.labels)
            .unwrap_or_default(),
    }
}

fn service_selector(svc: Service) -> ServiceSelector {
    ServiceSelector {
        name: svc.name_any(),
        selector: svc.spec.and_then(|s| s.selector).unwrap_or_default(),
    }
}

fn endpoint_report(ep: Endpoints) -> EndpointReport {
    EndpointReport {
        name: ep.name_any(),
        subset_addresses: ep
            .subsets
            .unwrap_or_default()
            .into_iter()
            .map(|s| s.addresses.map_or(0, |a| a.len()))
            .collect(),
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> ControlPlaneResult<WorkloadState> {
        self.get_workload::<Deployment>(namespace, name, "deployments", deployment_state)
            .await
    }

    async fn scale_deployment(
        &self,
        namespace: &str,
        name: &str,
        update: &ScaleUpdate,
    ) -> ControlPlaneResult<()> {
        self.replace_scale::<Deployment>(namespace, name, "deployments", update)
            .await
    }

    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> ControlPlaneResult<WorkloadState> {
        self.get_workload::<StatefulSet>(namespace, name, "statefulsets", stateful_set_state)
            .await
    }

    async fn scale_stateful_set(
        &self,
        namespace: &str,
        name: &str,
        update: &ScaleUpdate,
    ) -> ControlPlaneResult<()> {
        self.replace_scale::<StatefulSet>(namespace, name, "statefulsets", update)
            .await
    }

    async fn list_services(&self, namespace: &str) -> ControlPlaneResult<Vec<ServiceSelector>> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let resource = format!("services/{namespace}");
        let list = self
            .call(&resource, move || {
                let api = api.clone();
                async move { api.list(&ListParams::default()).await }
            })
            .await?;
        Ok(list.items.into_iter().map(service_selector).collect())
    }

    async fn list_endpoints(&self, namespace: &str) -> ControlPlaneResult<Vec<EndpointReport>> {
        let api: Api<Endpoints> = Api::namespaced(self.client.clone(), namespace);
        let resource = format!("endpoints/{namespace}");
        let list = self
            .call(&resource, move || {
                let api = api.clone();
                async move { api.list(&ListParams::default()).await }
            })
            .await?;
        Ok(list.items.into_iter().map(endpoint_report).collect())
    }
}
