//! In-memory `ControlPlane` for tests.
//!
//! Workloads carry a numeric resource version bumped on every write; a write
//! with a stale version is rejected as a conflict, like the API server does.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use idlegrid_core::{ControlPlaneError, WorkloadKind};

use crate::control_plane::{
    ControlPlane, ControlPlaneResult, EndpointReport, ScaleUpdate, ServiceSelector, WorkloadState,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub kind: WorkloadKind,
    pub namespace: String,
    pub name: String,
    pub replicas: i32,
}

#[derive(Default)]
struct Inner {
    workloads: HashMap<(WorkloadKind, String, String), WorkloadState>,
    services: HashMap<String, Vec<ServiceSelector>>,
    endpoints: HashMap<String, Vec<EndpointReport>>,
    writes: Vec<RecordedWrite>,
    reads: usize,
    fail_reads: Option<ControlPlaneError>,
    fail_writes: Option<ControlPlaneError>,
    fail_lists: Option<ControlPlaneError>,
    /// Simulate another writer bumping the version right after the next read.
    race_next_read: bool,
    /// Apply the next write but report a conflict, like a retried write
    /// whose first attempt landed.
    conflict_after_next_write: bool,
}

#[derive(Default)]
pub struct FakeControlPlane {
    inner: Mutex<Inner>,
    delay: Option<Duration>,
}

pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn add_workload(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        name: &str,
        desired: i32,
        ready: i32,
        app: &str,
    ) {
        let state = WorkloadState {
            desired_replicas: desired,
            ready_replicas: ready,
            resource_version: Some("1".to_string()),
            template_labels: labels(&[("app", app)]),
        };
        self.inner
            .lock()
            .unwrap()
            .workloads
            .insert((kind, namespace.to_string(), name.to_string()), state);
    }

    pub fn set_template_labels(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        name: &str,
        template_labels: BTreeMap<String, String>,
    ) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(w) = inner
            .workloads
            .get_mut(&(kind, namespace.to_string(), name.to_string()))
        {
            w.template_labels = template_labels;
        }
    }

    pub fn add_service(&self, namespace: &str, name: &str, selector: &[(&str, &str)]) {
        self.inner
            .lock()
            .unwrap()
            .services
            .entry(namespace.to_string())
            .or_default()
            .push(ServiceSelector {
                name: name.to_string(),
                selector: labels(selector),
            });
    }

    pub fn add_endpoints(&self, namespace: &str, name: &str, subset_addresses: &[usize]) {
        self.inner
            .lock()
            .unwrap()
            .endpoints
            .entry(namespace.to_string())
            .or_default()
            .push(EndpointReport {
                name: name.to_string(),
                subset_addresses: subset_addresses.to_vec(),
            });
    }

    pub fn fail_reads(&self, err: ControlPlaneError) {
        self.inner.lock().unwrap().fail_reads = Some(err);
    }

    pub fn fail_writes(&self, err: ControlPlaneError) {
        self.inner.lock().unwrap().fail_writes = Some(err);
    }

    pub fn fail_lists(&self, err: ControlPlaneError) {
        self.inner.lock().unwrap().fail_lists = Some(err);
    }

    pub fn apply_next_write_then_conflict(&self) {
        self.inner.lock().unwrap().conflict_after_next_write = true;
    }

    pub fn race_next_read(&self) {
        self.inner.lock().unwrap().race_next_read = true;
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.inner.lock().unwrap().writes.clone()
    }

    pub fn reads(&self) -> usize {
        self.inner.lock().unwrap().reads
    }

    pub fn desired(&self, kind: WorkloadKind, namespace: &str, name: &str) -> Option<i32> {
        self.inner
            .lock()
            .unwrap()
            .workloads
            .get(&(kind, namespace.to_string(), name.to_string()))
            .map(|w| w.desired_replicas)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn get(&self, kind: WorkloadKind, namespace: &str, name: &str) -> ControlPlaneResult<WorkloadState> {
        let mut inner = self.inner.lock().unwrap();
        inner.reads += 1;
        if let Some(err) = inner.fail_reads.clone() {
            return Err(err);
        }
        let race = std::mem::take(&mut inner.race_next_read);
        let key = (kind, namespace.to_string(), name.to_string());
        let workload = inner
            .workloads
            .get_mut(&key)
            .ok_or_else(|| ControlPlaneError::NotFound {
                resource: format!("{kind}s/{name}"),
            })?;
        let state = workload.clone();
        if race {
            bump_version(workload);
        }
        Ok(state)
    }

    fn scale(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        name: &str,
        update: &ScaleUpdate,
    ) -> ControlPlaneResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.fail_writes.clone() {
            return Err(err);
        }
        let key = (kind, namespace.to_string(), name.to_string());
        let workload = inner
            .workloads
            .get_mut(&key)
            .ok_or_else(|| ControlPlaneError::NotFound {
                resource: format!("{kind}s/{name}"),
            })?;
        if update.resource_version.is_some() && update.resource_version != workload.resource_version {
            return Err(ControlPlaneError::Conflict {
                resource: format!("{kind}s/{name}"),
                message: "the object has been modified".to_string(),
            });
        }
        workload.desired_replicas = update.replicas;
        bump_version(workload);
        inner.writes.push(RecordedWrite {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            replicas: update.replicas,
        });
        if std::mem::take(&mut inner.conflict_after_next_write) {
            return Err(ControlPlaneError::Conflict {
                resource: format!("{kind}s/{name}"),
                message: "the object has been modified".to_string(),
            });
        }
        Ok(())
    }
}

fn bump_version(workload: &mut WorkloadState) {
    let next = workload
        .resource_version
        .as_deref()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    workload.resource_version = Some(next.to_string());
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> ControlPlaneResult<WorkloadState> {
        self.pause().await;
        self.get(WorkloadKind::Deployment, namespace, name)
    }

    async fn scale_deployment(
        &self,
        namespace: &str,
        name: &str,
        update: &ScaleUpdate,
    ) -> ControlPlaneResult<()> {
        self.pause().await;
        self.scale(WorkloadKind::Deployment, namespace, name, update)
    }

    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> ControlPlaneResult<WorkloadState> {
        self.pause().await;
        self.get(WorkloadKind::StatefulSet, namespace, name)
    }

    async fn scale_stateful_set(
        &self,
        namespace: &str,
        name: &str,
        update: &ScaleUpdate,
    ) -> ControlPlaneResult<()> {
        self.pause().await;
        self.scale(WorkloadKind::StatefulSet, namespace, name, update)
    }

    async fn list_services(&self, namespace: &str) -> ControlPlaneResult<Vec<ServiceSelector>> {
        self.pause().await;
        let inner = self.inner.lock().unwrap();
        if let Some(err) = inner.fail_lists.clone() {
            return Err(err);
        }
        Ok(inner.services.get(namespace).cloned().unwrap_or_default())
    }

    async fn list_endpoints(&self, namespace: &str) -> ControlPlaneResult<Vec<EndpointReport>> {
        self.pause().await;
        let inner = self.inner.lock().unwrap();
        if let Some(err) = inner.fail_lists.clone() {
            return Err(err);
        }
        Ok(inner.endpoints.get(namespace).cloned().unwrap_or_default())
    }
}
