use crate::error::{AdmissionError, Result};
use crate::ratio::OversubscriptionRatios;
use k8s_openapi::api::core::v1::ResourceRequirements;
use polestar_core::{ResourceKind, ResourceQuantities, Workspace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Smallest CPU ask, in cores
pub const MIN_CPU_CORES: f64 = 0.1;

/// Smallest memory ask, in MiB
pub const MIN_MEM_MIB: f64 = 10.0;

/// How the CPU limit of a grant is derived
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CpuQuotaPolicy {
    /// Round the original ask up with `adjust_cpu_size`
    Auto,
    /// No CPU limit
    Unlimited,
    /// Limit to the ask when the ceiling covers it
    Ceiling(f64),
}

impl CpuQuotaPolicy {
    /// Parse the `CPU_NUM_QUOTA` option: -1 auto, 0 or missing unlimited
    pub fn from_option(raw: Option<&str>) -> Result<Self> {
        let Some(raw) = raw else {
            return Ok(CpuQuotaPolicy::Unlimited);
        };

        let value: f64 = raw
            .trim()
            .parse()
            .map_err(|_| AdmissionError::invalid_config("CPU_NUM_QUOTA", raw, "not a number"))?;

        if value == -1.0 {
            Ok(CpuQuotaPolicy::Auto)
        } else if value == 0.0 {
            Ok(CpuQuotaPolicy::Unlimited)
        } else if value > 0.0 && value.is_finite() {
            Ok(CpuQuotaPolicy::Ceiling(value))
        } else {
            Err(AdmissionError::invalid_config(
                "CPU_NUM_QUOTA",
                raw,
                "expected -1, 0 or a positive number",
            ))
        }
    }
}

/// CPU limit for an ask under the auto policy.
///
/// One and a half times the ask, rounded up to a tenth of a core:
/// 0.1 -> 0.2, 0.25 -> 0.4, 1.0 -> 1.5. Never smaller than the input and
/// monotonic in it.
pub fn adjust_cpu_size(cores: f64) -> f64 {
    let millicores = (cores * 1000.0).round().max(0.0) as i64;
    let scaled = millicores.saturating_mul(3).saturating_add(1) / 2;
    let rounded = scaled.saturating_add(99) / 100 * 100;
    rounded as f64 / 1000.0
}

/// What a container asks for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAsk {
    /// CPU in cores
    pub cpu: f64,
    /// Memory in MiB
    pub mem_mib: f64,
    /// Explicit CPU limit; disables CPU oversubscription
    #[serde(default)]
    pub max_cpu: Option<f64>,
    /// Explicit memory limit; disables memory oversubscription
    #[serde(default)]
    pub max_mem_mib: Option<f64>,
    /// Per-workload CPU ratio override
    #[serde(default)]
    pub cpu_ratio: Option<f64>,
    /// Per-workload memory ratio override
    #[serde(default)]
    pub mem_ratio: Option<f64>,
}

impl ResourceAsk {
    pub fn new(cpu: f64, mem_mib: f64) -> Self {
        Self {
            cpu,
            mem_mib,
            max_cpu: None,
            max_mem_mib: None,
            cpu_ratio: None,
            mem_ratio: None,
        }
    }
}

/// What a container is granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGrant {
    /// Reserved request after oversubscription
    pub request: ResourceQuantities,
    /// CPU limit in millicores; `None` means unlimited
    pub cpu_limit_millicores: Option<i64>,
    /// Memory limit in bytes; never below the original ask
    pub memory_limit_bytes: i64,
}

impl ResourceGrant {
    /// Kubernetes container resources
    pub fn to_k8s(&self) -> ResourceRequirements {
        let mut requests = BTreeMap::new();
        requests.insert(
            "cpu".to_string(),
            ResourceQuantities::cpu_quantity(self.request.cpu_millicores),
        );
        requests.insert(
            "memory".to_string(),
            ResourceQuantities::memory_quantity(self.request.memory_bytes),
        );

        let mut limits = BTreeMap::new();
        if let Some(cpu) = self.cpu_limit_millicores {
            limits.insert("cpu".to_string(), ResourceQuantities::cpu_quantity(cpu));
        }
        limits.insert(
            "memory".to_string(),
            ResourceQuantities::memory_quantity(self.memory_limit_bytes),
        );

        ResourceRequirements {
            requests: Some(requests),
            limits: Some(limits),
            ..Default::default()
        }
    }
}

/// Turns asks into grants under the configured ratios and CPU policy
#[derive(Debug, Clone)]
pub struct GrantShaper {
    ratios: OversubscriptionRatios,
    cpu_policy: CpuQuotaPolicy,
    min_cpu_cores: f64,
    min_mem_mib: f64,
}

impl GrantShaper {
    pub fn new(ratios: OversubscriptionRatios, cpu_policy: CpuQuotaPolicy) -> Self {
        Self {
            ratios,
            cpu_policy,
            min_cpu_cores: MIN_CPU_CORES,
            min_mem_mib: MIN_MEM_MIB,
        }
    }

    /// Override the ask floors
    pub fn with_floors(mut self, min_cpu_cores: f64, min_mem_mib: f64) -> Self {
        self.min_cpu_cores = min_cpu_cores;
        self.min_mem_mib = min_mem_mib;
        self
    }

    pub fn ratios(&self) -> &OversubscriptionRatios {
        &self.ratios
    }

    /// Shape one container ask for `workspace`
    pub fn shape(&self, ask: &ResourceAsk, workspace: Workspace) -> Result<ResourceGrant> {
        if !ask.cpu.is_finite() || ask.cpu < self.min_cpu_cores {
            return Err(AdmissionError::invalid_ask(
                "cpu",
                ask.cpu,
                format!("below the {} core floor", self.min_cpu_cores),
            ));
        }
        if !ask.mem_mib.is_finite() || ask.mem_mib < self.min_mem_mib {
            return Err(AdmissionError::invalid_ask(
                "memory",
                ask.mem_mib,
                format!("below the {} MiB floor", self.min_mem_mib),
            ));
        }

        let (request_cpu, limit_cpu) = match ask.max_cpu {
            Some(max) if !max.is_finite() || max < ask.cpu => {
                return Err(AdmissionError::invalid_ask(
                    "cpu",
                    ask.cpu,
                    format!("max {} is below the ask", max),
                ));
            }
            Some(max) => (ask.cpu, Some(max)),
            None => {
                let ratio = self
                    .ratios
                    .effective(workspace, ResourceKind::Cpu, ask.cpu_ratio);
                (ask.cpu / ratio, self.cpu_limit(ask.cpu))
            }
        };

        let (request_mem, limit_mem) = match ask.max_mem_mib {
            Some(max) if !max.is_finite() || max < ask.mem_mib => {
                return Err(AdmissionError::invalid_ask(
                    "memory",
                    ask.mem_mib,
                    format!("max {} MiB is below the ask", max),
                ));
            }
            Some(max) => (ask.mem_mib, max),
            None => {
                let ratio = self
                    .ratios
                    .effective(workspace, ResourceKind::Mem, ask.mem_ratio);
                (ask.mem_mib / ratio, ask.mem_mib)
            }
        };

        let request = ResourceQuantities::from_cores_mib(request_cpu, request_mem);
        let grant = ResourceGrant {
            request,
            cpu_limit_millicores: limit_cpu
                .map(|cores| ResourceQuantities::from_cores_mib(cores, 0.0).cpu_millicores),
            memory_limit_bytes: ResourceQuantities::from_cores_mib(0.0, limit_mem).memory_bytes,
        };

        debug!(
            "Shaped ask cpu={} mem={}Mi in {} to request {}m/{} bytes, cpu limit {:?}",
            ask.cpu,
            ask.mem_mib,
            workspace,
            grant.request.cpu_millicores,
            grant.request.memory_bytes,
            grant.cpu_limit_millicores
        );

        Ok(grant)
    }

    fn cpu_limit(&self, cores: f64) -> Option<f64> {
        match self.cpu_policy {
            CpuQuotaPolicy::Auto => Some(adjust_cpu_size(cores)),
            CpuQuotaPolicy::Unlimited => None,
            CpuQuotaPolicy::Ceiling(ceiling) if ceiling >= cores => Some(cores),
            CpuQuotaPolicy::Ceiling(_) => None,
        }
    }
}
