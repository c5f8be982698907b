use crate::checker::AdmissionFailure;
use crate::error::Result;
use crate::quota::{WorkspaceQuota, WorkspaceUsage};
use crate::sources::{AdmissionRecorder, NodeSource, QuotaSource, UsageSource};
use async_trait::async_trait;
use polestar_core::labels::{NAMESPACE_PROJECT_LABEL, NAMESPACE_WORKSPACE_LABEL};
use polestar_core::{Namespace, Pod, ResourceQuantities, Workspace};
use polestar_scheduler::NodeLabelSnapshot;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Usage source over an in-memory snapshot of namespaces and pods
///
/// A namespace belongs to a scope through its `dice/ns-project` and
/// `dice/ns-workspace` labels. Pods that have `Succeeded` or `Failed` hold no
/// resources and are skipped.
pub struct PodSnapshotUsage {
    namespaces: Arc<RwLock<Vec<Namespace>>>,
    pods: Arc<RwLock<Vec<Pod>>>,
}

impl PodSnapshotUsage {
    pub fn new(namespaces: Vec<Namespace>, pods: Vec<Pod>) -> Self {
        Self {
            namespaces: Arc::new(RwLock::new(namespaces)),
            pods: Arc::new(RwLock::new(pods)),
        }
    }

    /// Replace the pod snapshot
    pub async fn set_pods(&self, pods: Vec<Pod>) {
        *self.pods.write().await = pods;
    }

    async fn scope_namespaces(&self, project: &str, workspace: Workspace) -> BTreeSet<String> {
        let namespaces = self.namespaces.read().await;
        namespaces
            .iter()
            .filter(|ns| {
                let Some(ns_labels) = ns.metadata.labels.as_ref() else {
                    return false;
                };
                let in_project = ns_labels
                    .get(NAMESPACE_PROJECT_LABEL)
                    .is_some_and(|p| p == project);
                let in_workspace = ns_labels
                    .get(NAMESPACE_WORKSPACE_LABEL)
                    .and_then(|w| w.parse::<Workspace>().ok())
                    .is_some_and(|w| w == workspace);
                in_project && in_workspace
            })
            .filter_map(|ns| ns.metadata.name.clone())
            .collect()
    }
}

fn is_terminal(pod: &Pod) -> bool {
    matches!(
        pod.status.as_ref().and_then(|s| s.phase.as_deref()),
        Some("Succeeded") | Some("Failed")
    )
}

fn pod_requests(pod: &Pod) -> Result<ResourceQuantities> {
    let mut total = ResourceQuantities::default();

    let Some(spec) = &pod.spec else {
        return Ok(total);
    };

    for container in &spec.containers {
        if let Some(requests) = container.resources.as_ref().and_then(|r| r.requests.as_ref()) {
            total = total.checked_add(ResourceQuantities::from_k8s_resource_map(requests)?)?;
        }
    }

    Ok(total)
}

#[async_trait]
impl UsageSource for PodSnapshotUsage {
    async fn sum_live_requests(
        &self,
        project: &str,
        workspace: Workspace,
    ) -> Result<WorkspaceUsage> {
        let namespaces = self.scope_namespaces(project, workspace).await;
        let pods = self.pods.read().await;

        let mut usage = ResourceQuantities::default();
        let mut counted = 0usize;

        for pod in pods.iter() {
            let in_scope = pod
                .metadata
                .namespace
                .as_ref()
                .is_some_and(|ns| namespaces.contains(ns));
            if !in_scope || is_terminal(pod) {
                continue;
            }
            usage = usage.checked_add(pod_requests(pod)?)?;
            counted += 1;
        }

        debug!(
            "Mock: {}/{} uses {}m/{} bytes across {} pods in {} namespaces",
            project,
            workspace,
            usage.cpu_millicores,
            usage.memory_bytes,
            counted,
            namespaces.len()
        );
        Ok(usage)
    }
}

/// Quota source backed by an in-memory table
#[derive(Default)]
pub struct StaticQuotaSource {
    quotas: RwLock<HashMap<(String, Workspace), WorkspaceQuota>>,
}

impl StaticQuotaSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_quota(&self, project: &str, workspace: Workspace, quota: WorkspaceQuota) {
        self.quotas
            .write()
            .await
            .insert((project.to_string(), workspace), quota);
    }
}

#[async_trait]
impl QuotaSource for StaticQuotaSource {
    async fn get_quota(
        &self,
        project: &str,
        workspace: Workspace,
    ) -> Result<Option<WorkspaceQuota>> {
        let quotas = self.quotas.read().await;
        Ok(quotas.get(&(project.to_string(), workspace)).copied())
    }
}

/// Recorder that keeps failures in memory
#[derive(Default)]
pub struct MemoryRecorder {
    failures: RwLock<Vec<AdmissionFailure>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn failures(&self) -> Vec<AdmissionFailure> {
        self.failures.read().await.clone()
    }
}

#[async_trait]
impl AdmissionRecorder for MemoryRecorder {
    async fn record_admission_failure(&self, failure: &AdmissionFailure) -> Result<()> {
        self.failures.write().await.push(failure.clone());
        debug!("Mock: recorded admission failure {}", failure.id);
        Ok(())
    }
}

/// Node source over a fixed list
pub struct StaticNodeSource {
    nodes: Vec<NodeLabelSnapshot>,
}

impl StaticNodeSource {
    pub fn new(nodes: Vec<NodeLabelSnapshot>) -> Self {
        Self { nodes }
    }
}

#[async_trait]
impl NodeSource for StaticNodeSource {
    async fn list_nodes(&self) -> Result<Vec<NodeLabelSnapshot>> {
        Ok(self.nodes.clone())
    }
}
