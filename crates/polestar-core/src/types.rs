use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Deployment environment a workload belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Workspace {
    Prod,
    Dev,
    Test,
    Staging,
}

impl Workspace {
    pub const ALL: [Workspace; 4] = [
        Workspace::Prod,
        Workspace::Dev,
        Workspace::Test,
        Workspace::Staging,
    ];

    /// Canonical upper-case name (e.g. "PROD")
    pub fn as_str(&self) -> &'static str {
        match self {
            Workspace::Prod => "PROD",
            Workspace::Dev => "DEV",
            Workspace::Test => "TEST",
            Workspace::Staging => "STAGING",
        }
    }

    /// Lower-case form used inside node labels (e.g. "workspace-dev")
    pub fn label_value(&self) -> &'static str {
        match self {
            Workspace::Prod => "prod",
            Workspace::Dev => "dev",
            Workspace::Test => "test",
            Workspace::Staging => "staging",
        }
    }
}

impl fmt::Display for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Workspace {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PROD" => Ok(Workspace::Prod),
            "DEV" => Ok(Workspace::Dev),
            "TEST" => Ok(Workspace::Test),
            "STAGING" => Ok(Workspace::Staging),
            _ => Err(CoreError::unknown_value(
                "workspace",
                s,
                "PROD, DEV, TEST, STAGING",
            )),
        }
    }
}

/// Resource dimension subject to oversubscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceKind {
    Cpu,
    Mem,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cpu => "CPU",
            ResourceKind::Mem => "MEM",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Orchestration backend a constraint is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Structured node/pod affinity
    Kubernetes,
    /// Legacy backend matching a regex against the node attribute string
    Marathon,
    /// Legacy job backend sharing the Marathon constraint language
    Metronome,
}

impl Backend {
    /// Whether this backend consumes the single-regex rendering
    pub fn is_regex_target(&self) -> bool {
        matches!(self, Backend::Marathon | Backend::Metronome)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Kubernetes => "kubernetes",
            Backend::Marathon => "marathon",
            Backend::Metronome => "metronome",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Backend {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kubernetes" | "k8s" => Ok(Backend::Kubernetes),
            "marathon" => Ok(Backend::Marathon),
            "metronome" => Ok(Backend::Metronome),
            _ => Err(CoreError::unknown_value(
                "backend",
                s,
                "kubernetes, marathon, metronome",
            )),
        }
    }
}
