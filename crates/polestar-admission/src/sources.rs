use crate::checker::AdmissionFailure;
use crate::error::Result;
use crate::quota::{WorkspaceQuota, WorkspaceUsage};
use async_trait::async_trait;
use polestar_core::Workspace;
use polestar_scheduler::NodeLabelSnapshot;

/// Cluster node labels, as gathered by an external collector
#[async_trait]
pub trait NodeSource: Send + Sync {
    /// Every node with its label set
    async fn list_nodes(&self) -> Result<Vec<NodeLabelSnapshot>>;
}

/// Live resource usage of a (project, workspace) scope
#[async_trait]
pub trait UsageSource: Send + Sync {
    /// Summed requests of all non-terminal pods in the scope's namespaces
    async fn sum_live_requests(&self, project: &str, workspace: Workspace)
        -> Result<WorkspaceUsage>;
}

/// Configured quotas
#[async_trait]
pub trait QuotaSource: Send + Sync {
    /// Quota of the scope; `None` means no quota is configured
    async fn get_quota(&self, project: &str, workspace: Workspace)
        -> Result<Option<WorkspaceQuota>>;
}

/// Audit sink for rejected admissions
#[async_trait]
pub trait AdmissionRecorder: Send + Sync {
    async fn record_admission_failure(&self, failure: &AdmissionFailure) -> Result<()>;
}
