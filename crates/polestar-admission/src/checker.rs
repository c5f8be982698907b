use crate::config::Locale;
use crate::error::Result;
use crate::quota::{evaluate, QuotaDecision, QuotaScope};
use crate::sources::{AdmissionRecorder, QuotaSource, UsageSource};
use chrono::{DateTime, Utc};
use polestar_core::{ResourceQuantities, Workspace};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identity of the workload asking for admission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub id: String,
    #[serde(default)]
    pub service: Option<String>,
}

impl WorkloadRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            service: None,
        }
    }
}

/// Audit record of a rejected admission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionFailure {
    pub id: Uuid,
    pub workload_id: String,
    pub human_message: String,
    pub machine_message: String,
    pub at: DateTime<Utc>,
}

/// Workspace admission over external usage and quota sources.
///
/// Usage is read fresh on every check and nothing is reserved, so two
/// concurrent checks against the same scope can both be admitted.
pub struct QuotaChecker {
    usage: Arc<dyn UsageSource>,
    quotas: Arc<dyn QuotaSource>,
    recorder: Arc<dyn AdmissionRecorder>,
    locale: Locale,
}

impl QuotaChecker {
    pub fn new(
        usage: Arc<dyn UsageSource>,
        quotas: Arc<dyn QuotaSource>,
        recorder: Arc<dyn AdmissionRecorder>,
    ) -> Self {
        Self {
            usage,
            quotas,
            recorder,
            locale: Locale::default(),
        }
    }

    /// Language of the human message in rejections
    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    /// Decide whether `delta` fits in the scope's remaining quota.
    ///
    /// Rejections are returned as a decision, not an error, and recorded
    /// with the recorder.
    pub async fn check_quota(
        &self,
        project: &str,
        workspace: Workspace,
        delta: ResourceQuantities,
        workload: &WorkloadRef,
    ) -> Result<QuotaDecision> {
        let scope = QuotaScope::new(project, workspace);

        if delta.cpu_millicores <= 0 && delta.memory_bytes <= 0 {
            debug!(
                "Workload {} does not grow {}/{}, admitted",
                workload.id, project, workspace
            );
            return Ok(QuotaDecision::unconstrained(scope, delta));
        }

        let Some(quota) = self.quotas.get_quota(project, workspace).await? else {
            debug!("No quota for {}/{}, admitting {}", project, workspace, workload.id);
            return Ok(QuotaDecision::unconstrained(scope, delta));
        };

        let usage = self.usage.sum_live_requests(project, workspace).await?;
        let decision = evaluate(&scope, &quota, &usage, &delta, self.locale);

        if decision.admitted {
            debug!(
                "Admitted {} in {}/{}: {}m/{} bytes requested",
                workload.id, project, workspace, delta.cpu_millicores, delta.memory_bytes
            );
            return Ok(decision);
        }

        let failure = AdmissionFailure {
            id: Uuid::new_v4(),
            workload_id: workload.id.clone(),
            human_message: decision.human_message.clone().unwrap_or_default(),
            machine_message: decision.machine_message.clone().unwrap_or_default(),
            at: Utc::now(),
        };
        info!(
            "Rejected {} in {}/{}: {}",
            workload.id, project, workspace, failure.machine_message
        );

        if let Err(e) = self.recorder.record_admission_failure(&failure).await {
            warn!("Failed to record admission failure {}: {}", failure.id, e);
        }

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdmissionError;
    use crate::mock::{MemoryRecorder, StaticQuotaSource};
    use crate::quota::WorkspaceUsage;
    use async_trait::async_trait;
    use polestar_core::ResourceKind;

    const GIB: i64 = 1024 * 1024 * 1024;

    struct FixedUsage(WorkspaceUsage);

    #[async_trait]
    impl UsageSource for FixedUsage {
        async fn sum_live_requests(&self, _: &str, _: Workspace) -> Result<WorkspaceUsage> {
            Ok(self.0)
        }
    }

    struct BrokenUsage;

    #[async_trait]
    impl UsageSource for BrokenUsage {
        async fn sum_live_requests(&self, _: &str, _: Workspace) -> Result<WorkspaceUsage> {
            Err(AdmissionError::source_error("usage", "api unreachable"))
        }
    }

    async fn checker(
        usage: Arc<dyn UsageSource>,
        quota: Option<ResourceQuantities>,
    ) -> (QuotaChecker, Arc<MemoryRecorder>) {
        let quotas = Arc::new(StaticQuotaSource::new());
        if let Some(q) = quota {
            quotas.set_quota("42", Workspace::Dev, q).await;
        }
        let recorder = Arc::new(MemoryRecorder::new());
        (
            QuotaChecker::new(usage, quotas, recorder.clone()),
            recorder,
        )
    }

    #[tokio::test]
    async fn test_rejection_is_recorded() {
        let usage = Arc::new(FixedUsage(ResourceQuantities::new(9_500, 4 * GIB)));
        let (checker, recorder) =
            checker(usage, Some(ResourceQuantities::new(10_000, 16 * GIB))).await;

        let decision = checker
            .check_quota(
                "42",
                Workspace::Dev,
                ResourceQuantities::new(1_000, GIB),
                &WorkloadRef::new("runtime-7/web"),
            )
            .await
            .unwrap();

        assert!(!decision.admitted);
        assert_eq!(decision.exceeded, vec![ResourceKind::Cpu]);

        let failures = recorder.failures().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].workload_id, "runtime-7/web");
        assert!(failures[0].human_message.contains("1.00"));
        assert!(failures[0].human_message.contains("0.50"));
        assert!(failures[0].machine_message.contains("requested_cpu=1.00"));
        assert!(failures[0].machine_message.contains("remaining_cpu=0.50"));
    }

    #[tokio::test]
    async fn test_admitted_is_not_recorded() {
        let usage = Arc::new(FixedUsage(ResourceQuantities::new(1_000, GIB)));
        let (checker, recorder) =
            checker(usage, Some(ResourceQuantities::new(10_000, 16 * GIB))).await;

        let decision = checker
            .check_quota(
                "42",
                Workspace::Dev,
                ResourceQuantities::new(1_000, GIB),
                &WorkloadRef::new("w"),
            )
            .await
            .unwrap();
        assert!(decision.admitted);
        assert!(recorder.failures().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_quota_is_unconstrained() {
        let (checker, _) = checker(Arc::new(BrokenUsage), None).await;

        let decision = checker
            .check_quota(
                "42",
                Workspace::Dev,
                ResourceQuantities::new(64_000, 64 * GIB),
                &WorkloadRef::new("w"),
            )
            .await
            .unwrap();
        assert!(decision.admitted);
        assert!(decision.remaining.is_none());
    }

    #[tokio::test]
    async fn test_scale_down_skips_sources() {
        let (checker, _) =
            checker(Arc::new(BrokenUsage), Some(ResourceQuantities::new(1_000, GIB))).await;

        let decision = checker
            .check_quota(
                "42",
                Workspace::Dev,
                ResourceQuantities::new(-1_000, 0),
                &WorkloadRef::new("w"),
            )
            .await
            .unwrap();
        assert!(decision.admitted);
    }

    #[tokio::test]
    async fn test_usage_failure_propagates() {
        let (checker, _) =
            checker(Arc::new(BrokenUsage), Some(ResourceQuantities::new(1_000, GIB))).await;

        let err = checker
            .check_quota(
                "42",
                Workspace::Dev,
                ResourceQuantities::new(100, 0),
                &WorkloadRef::new("w"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::SourceError { .. }));
    }
}
