//! Polestar Admission - Resource grants and workspace quota admission
//!
//! This crate provides:
//! - Oversubscription ratios per workspace and resource kind
//! - Grant shaping (request, limit) for container asks
//! - Quota evaluation with clamped remaining quota
//! - `QuotaChecker` over pluggable usage, quota and audit sources
//! - In-memory sources for offline evaluation and tests

pub mod checker;
pub mod config;
pub mod error;
pub mod mock;
pub mod quota;
pub mod ratio;
pub mod shaping;
pub mod sources;

// Re-export commonly used types
pub use checker::{AdmissionFailure, QuotaChecker, WorkloadRef};
pub use config::{AdmissionConfig, Locale};
pub use error::{AdmissionError, Result};
pub use mock::{MemoryRecorder, PodSnapshotUsage, StaticNodeSource, StaticQuotaSource};
pub use quota::{evaluate, remaining, QuotaDecision, QuotaScope, WorkspaceQuota, WorkspaceUsage};
pub use ratio::OversubscriptionRatios;
pub use shaping::{adjust_cpu_size, CpuQuotaPolicy, GrantShaper, ResourceAsk, ResourceGrant};
pub use sources::{AdmissionRecorder, NodeSource, QuotaSource, UsageSource};
