use crate::config::Locale;
use crate::error::{AdmissionError, Result};
use polestar_core::{ResourceKind, ResourceQuantities, Workspace};
use serde::Serialize;

/// Configured ceiling of a (project, workspace) scope
pub type WorkspaceQuota = ResourceQuantities;

/// Summed requests of the live pods in a (project, workspace) scope
pub type WorkspaceUsage = ResourceQuantities;

/// The (project, workspace) pair a quota applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct QuotaScope {
    pub project: String,
    pub workspace: Workspace,
}

impl QuotaScope {
    pub fn new(project: impl Into<String>, workspace: Workspace) -> Self {
        Self {
            project: project.into(),
            workspace,
        }
    }
}

/// Quota left, clamped so an over-quota scope reports zero
pub fn remaining(quota: &WorkspaceQuota, usage: &WorkspaceUsage) -> ResourceQuantities {
    ResourceQuantities::new(
        quota.cpu_millicores.saturating_sub(usage.cpu_millicores),
        quota.memory_bytes.saturating_sub(usage.memory_bytes),
    )
    .clamp_non_negative()
}

/// Outcome of one admission check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaDecision {
    pub scope: QuotaScope,
    pub admitted: bool,
    pub requested: ResourceQuantities,
    /// `None` when the scope has no quota or the check was skipped
    pub remaining: Option<ResourceQuantities>,
    pub exceeded: Vec<ResourceKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_message: Option<String>,
}

impl QuotaDecision {
    /// Admitted without comparing against a quota
    pub fn unconstrained(scope: QuotaScope, requested: ResourceQuantities) -> Self {
        Self {
            scope,
            admitted: true,
            requested,
            remaining: None,
            exceeded: Vec::new(),
            human_message: None,
            machine_message: None,
        }
    }

    /// Turn a rejection into a `QuotaExceeded` error
    pub fn into_result(self) -> Result<Self> {
        if self.admitted {
            return Ok(self);
        }
        Err(AdmissionError::quota_exceeded(
            self.scope.project.clone(),
            self.scope.workspace.as_str(),
            self.machine_message.clone().unwrap_or_default(),
        ))
    }
}

/// Compare a delta against what is left of the quota.
///
/// Deltas that do not grow the scope are always admitted.
pub fn evaluate(
    scope: &QuotaScope,
    quota: &WorkspaceQuota,
    usage: &WorkspaceUsage,
    delta: &ResourceQuantities,
    locale: Locale,
) -> QuotaDecision {
    if delta.cpu_millicores <= 0 && delta.memory_bytes <= 0 {
        return QuotaDecision::unconstrained(scope.clone(), *delta);
    }

    let left = remaining(quota, usage);

    let mut exceeded = Vec::new();
    if delta.cpu_millicores > left.cpu_millicores {
        exceeded.push(ResourceKind::Cpu);
    }
    if delta.memory_bytes > left.memory_bytes {
        exceeded.push(ResourceKind::Mem);
    }

    let (human_message, machine_message) = if exceeded.is_empty() {
        (None, None)
    } else {
        (
            Some(human_message(scope, delta, &left, &exceeded, locale)),
            Some(machine_message(scope, quota, usage, delta, &left, &exceeded)),
        )
    };

    QuotaDecision {
        scope: scope.clone(),
        admitted: exceeded.is_empty(),
        requested: *delta,
        remaining: Some(left),
        exceeded,
        human_message,
        machine_message,
    }
}

fn human_message(
    scope: &QuotaScope,
    delta: &ResourceQuantities,
    left: &ResourceQuantities,
    exceeded: &[ResourceKind],
    locale: Locale,
) -> String {
    let parts: Vec<String> = exceeded
        .iter()
        .map(|kind| {
            let (asked, free) = figures(*kind, delta, left);
            match (locale, kind) {
                (Locale::En, ResourceKind::Cpu) => {
                    format!("CPU requested {} cores, {} cores remaining", asked, free)
                }
                (Locale::En, ResourceKind::Mem) => {
                    format!("memory requested {}, {} remaining", asked, free)
                }
                (Locale::Zh, ResourceKind::Cpu) => {
                    format!("CPU 申请 {} 核，剩余 {} 核", asked, free)
                }
                (Locale::Zh, ResourceKind::Mem) => format!("内存申请 {}，剩余 {}", asked, free),
            }
        })
        .collect();

    match locale {
        Locale::En => format!(
            "Insufficient quota in workspace {} of project {}: {}",
            scope.workspace,
            scope.project,
            parts.join("; ")
        ),
        Locale::Zh => format!(
            "项目 {} 的 {} 环境配额不足：{}",
            scope.project,
            scope.workspace,
            parts.join("；")
        ),
    }
}

fn machine_message(
    scope: &QuotaScope,
    quota: &WorkspaceQuota,
    usage: &WorkspaceUsage,
    delta: &ResourceQuantities,
    left: &ResourceQuantities,
    exceeded: &[ResourceKind],
) -> String {
    let kinds: Vec<&str> = exceeded.iter().map(ResourceKind::as_str).collect();
    format!(
        "quota exceeded: project={} workspace={} exceeded={} \
         requested_cpu={} remaining_cpu={} quota_cpu={} used_cpu={} \
         requested_mem={} remaining_mem={} quota_mem={} used_mem={}",
        scope.project,
        scope.workspace,
        kinds.join(","),
        ResourceQuantities::format_cores(delta.cpu_millicores),
        ResourceQuantities::format_cores(left.cpu_millicores),
        ResourceQuantities::format_cores(quota.cpu_millicores),
        ResourceQuantities::format_cores(usage.cpu_millicores),
        ResourceQuantities::format_memory(delta.memory_bytes),
        ResourceQuantities::format_memory(left.memory_bytes),
        ResourceQuantities::format_memory(quota.memory_bytes),
        ResourceQuantities::format_memory(usage.memory_bytes),
    )
}

fn figures(
    kind: ResourceKind,
    delta: &ResourceQuantities,
    left: &ResourceQuantities,
) -> (String, String) {
    match kind {
        ResourceKind::Cpu => (
            ResourceQuantities::format_cores(delta.cpu_millicores),
            ResourceQuantities::format_cores(left.cpu_millicores),
        ),
        ResourceKind::Mem => (
            ResourceQuantities::format_memory(delta.memory_bytes),
            ResourceQuantities::format_memory(left.memory_bytes),
        ),
    }
}
