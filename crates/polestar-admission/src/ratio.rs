use crate::error::{AdmissionError, Result};
use polestar_core::{ResourceKind, Workspace};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Ratio applied when nothing is configured
pub const DEFAULT_RATIO: f64 = 1.0;

/// Option key for a (workspace, kind) ratio.
///
/// PROD uses the bare key, e.g. `CPU_SUBSCRIBE_RATIO`; other workspaces are
/// prefixed, e.g. `DEV_MEM_SUBSCRIBE_RATIO`.
pub fn option_key(workspace: Workspace, kind: ResourceKind) -> String {
    match workspace {
        Workspace::Prod => format!("{}_SUBSCRIBE_RATIO", kind.as_str()),
        ws => format!("{}_{}_SUBSCRIBE_RATIO", ws.as_str(), kind.as_str()),
    }
}

/// Oversubscription ratios per (workspace, resource kind)
#[derive(Debug, Clone, PartialEq)]
pub struct OversubscriptionRatios {
    table: BTreeMap<(Workspace, ResourceKind), f64>,
}

impl Default for OversubscriptionRatios {
    fn default() -> Self {
        let mut table = BTreeMap::new();
        for ws in Workspace::ALL {
            for kind in [ResourceKind::Cpu, ResourceKind::Mem] {
                table.insert((ws, kind), DEFAULT_RATIO);
            }
        }
        Self { table }
    }
}

impl OversubscriptionRatios {
    /// Read ratios from executor-style options.
    ///
    /// Missing keys keep 1.0. A value below 1.0 is ignored with a warning;
    /// a value that is not a number is an error.
    pub fn from_options(options: &BTreeMap<String, String>) -> Result<Self> {
        let mut ratios = Self::default();

        for ws in Workspace::ALL {
            for kind in [ResourceKind::Cpu, ResourceKind::Mem] {
                let key = option_key(ws, kind);
                let Some(raw) = options.get(&key) else {
                    continue;
                };

                let value: f64 = raw.trim().parse().map_err(|_| {
                    AdmissionError::invalid_config(&key, raw, "not a decimal number")
                })?;
                if !value.is_finite() {
                    return Err(AdmissionError::invalid_config(&key, raw, "not a finite number"));
                }

                if value < DEFAULT_RATIO {
                    warn!(
                        "Ignoring {}={}: ratios below {} are not allowed",
                        key, raw, DEFAULT_RATIO
                    );
                    continue;
                }

                debug!("Oversubscription ratio {}={}", key, value);
                ratios.table.insert((ws, kind), value);
            }
        }

        Ok(ratios)
    }

    /// Set one ratio; values below 1.0 are clamped to 1.0
    pub fn with_ratio(mut self, workspace: Workspace, kind: ResourceKind, ratio: f64) -> Self {
        self.table.insert((workspace, kind), ratio.max(DEFAULT_RATIO));
        self
    }

    /// Configured default for (workspace, kind)
    pub fn get(&self, workspace: Workspace, kind: ResourceKind) -> f64 {
        self.table
            .get(&(workspace, kind))
            .copied()
            .unwrap_or(DEFAULT_RATIO)
    }

    /// Ratio in effect for one workload.
    ///
    /// A per-workload override replaces the default only when it is at least
    /// 1.0; an override can widen oversubscription but never remove it.
    pub fn effective(
        &self,
        workspace: Workspace,
        kind: ResourceKind,
        override_ratio: Option<f64>,
    ) -> f64 {
        match override_ratio {
            Some(r) if r.is_finite() && r >= DEFAULT_RATIO => r,
            _ => self.get(workspace, kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_option_keys() {
        assert_eq!(
            option_key(Workspace::Prod, ResourceKind::Cpu),
            "CPU_SUBSCRIBE_RATIO"
        );
        assert_eq!(
            option_key(Workspace::Staging, ResourceKind::Mem),
            "STAGING_MEM_SUBSCRIBE_RATIO"
        );
    }

    #[test]
    fn test_from_options() {
        let ratios = OversubscriptionRatios::from_options(&options(&[
            ("CPU_SUBSCRIBE_RATIO", "2"),
            ("DEV_CPU_SUBSCRIBE_RATIO", "4.0"),
            ("TEST_MEM_SUBSCRIBE_RATIO", "0.5"),
        ]))
        .unwrap();

        assert_eq!(ratios.get(Workspace::Prod, ResourceKind::Cpu), 2.0);
        assert_eq!(ratios.get(Workspace::Dev, ResourceKind::Cpu), 4.0);
        assert_eq!(ratios.get(Workspace::Dev, ResourceKind::Mem), 1.0);
        // Below 1.0 is ignored
        assert_eq!(ratios.get(Workspace::Test, ResourceKind::Mem), 1.0);
    }

    #[test]
    fn test_unparseable_ratio_is_an_error() {
        let err = OversubscriptionRatios::from_options(&options(&[("DEV_MEM_SUBSCRIBE_RATIO", "lots")]))
            .unwrap_err();
        assert!(matches!(err, AdmissionError::InvalidConfig { .. }));
    }

    #[test]
    fn test_override_only_widens() {
        let ratios =
            OversubscriptionRatios::default().with_ratio(Workspace::Dev, ResourceKind::Cpu, 2.0);

        assert_eq!(ratios.effective(Workspace::Dev, ResourceKind::Cpu, None), 2.0);
        assert_eq!(
            ratios.effective(Workspace::Dev, ResourceKind::Cpu, Some(3.0)),
            3.0
        );
        // Replaces the default even when smaller, as long as it is >= 1.0
        assert_eq!(
            ratios.effective(Workspace::Dev, ResourceKind::Cpu, Some(1.5)),
            1.5
        );
        assert_eq!(
            ratios.effective(Workspace::Dev, ResourceKind::Cpu, Some(0.5)),
            2.0
        );
    }
}
