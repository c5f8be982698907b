use crate::constraint::Constraint;
use crate::filter::{default_filters, FilterPredicate};
use crate::render::StructuredConstraint;
use crate::types::NodeLabelSnapshot;
use crate::{Result, SchedulerError};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Feasibility verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrecheckStatus {
    Ok,
    Unschedulable,
}

/// Verdict for one service
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrecheck {
    pub status: PrecheckStatus,
    pub feasible_nodes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Aggregate verdict over every service
#[derive(Debug, Clone, Serialize)]
pub struct PrecheckReport {
    pub status: PrecheckStatus,
    pub services: BTreeMap<String, ServicePrecheck>,
}

impl PrecheckReport {
    pub fn is_ok(&self) -> bool {
        self.status == PrecheckStatus::Ok
    }

    /// Services no node can host
    pub fn unschedulable(&self) -> Vec<String> {
        self.services
            .iter()
            .filter(|(_, s)| s.status == PrecheckStatus::Unschedulable)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Explanations of every unschedulable service, one per line
    pub fn explanation(&self) -> String {
        self.services
            .iter()
            .filter_map(|(name, s)| {
                s.explanation
                    .as_ref()
                    .map(|e| format!("service {}: {}", name, e))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Turn an unschedulable verdict into an error
    pub fn into_result(self) -> Result<Self> {
        if self.is_ok() {
            return Ok(self);
        }
        Err(SchedulerError::unschedulable(
            self.unschedulable(),
            self.explanation(),
        ))
    }
}

/// Checks compiled constraints against a node label snapshot
pub struct PrecheckEngine {
    filters: Vec<Box<dyn FilterPredicate>>,
}

impl Default for PrecheckEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PrecheckEngine {
    /// Create an engine with the default filters
    pub fn new() -> Self {
        Self {
            filters: default_filters(),
        }
    }

    /// Create an engine with custom filters
    pub fn with_filters(filters: Vec<Box<dyn FilterPredicate>>) -> Self {
        Self { filters }
    }

    /// Evaluate every service against every node
    pub fn precheck(
        &self,
        services: &BTreeMap<String, Constraint>,
        nodes: &BTreeMap<String, NodeLabelSnapshot>,
    ) -> PrecheckReport {
        let mut results = BTreeMap::new();

        for (service, constraint) in services {
            let structured = constraint.structured();
            let result = self.precheck_service(service, &structured, nodes);
            results.insert(service.clone(), result);
        }

        let status = if results
            .values()
            .all(|r| r.status == PrecheckStatus::Ok)
        {
            PrecheckStatus::Ok
        } else {
            PrecheckStatus::Unschedulable
        };

        PrecheckReport {
            status,
            services: results,
        }
    }

    fn precheck_service(
        &self,
        service: &str,
        constraint: &StructuredConstraint,
        nodes: &BTreeMap<String, NodeLabelSnapshot>,
    ) -> ServicePrecheck {
        let mut feasible_nodes = Vec::new();

        for (node_id, node) in nodes {
            let mut passed = true;

            for filter in &self.filters {
                let result = filter.filter(constraint, node);
                if !result.passed {
                    debug!(
                        "Node {} filtered out by {} for service {}: {}",
                        node_id,
                        filter.name(),
                        service,
                        result.reason.unwrap_or_default()
                    );
                    passed = false;
                    break;
                }
            }

            if passed {
                feasible_nodes.push(node_id.clone());
            }
        }

        if !feasible_nodes.is_empty() {
            debug!(
                "Service {} has {} feasible nodes",
                service,
                feasible_nodes.len()
            );
            return ServicePrecheck {
                status: PrecheckStatus::Ok,
                feasible_nodes,
                explanation: None,
            };
        }

        let requirements = constraint.describe();
        let explanation = if nodes.is_empty() {
            format!("no nodes in the cluster; requires {}", requirements)
        } else {
            format!("no node satisfies {}", requirements)
        };
        info!("Service {} is unschedulable", service);

        ServicePrecheck {
            status: PrecheckStatus::Unschedulable,
            feasible_nodes,
            explanation: Some(explanation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ConstraintBuilder;
    use polestar_core::{Backend, Pin, PolicySpec, Workspace};

    fn dev_stateless() -> BTreeMap<String, Constraint> {
        let spec = PolicySpec {
            workspace: Pin::Pinned(vec![Workspace::Dev]),
            is_stateless: true,
            ..PolicySpec::new("web")
        };
        BTreeMap::from([(
            "web".to_string(),
            ConstraintBuilder::compile(&spec, None, Backend::Kubernetes),
        )])
    }

    fn nodes(entries: &[(&str, &[&str])]) -> BTreeMap<String, NodeLabelSnapshot> {
        entries
            .iter()
            .map(|(name, keys)| {
                (
                    name.to_string(),
                    NodeLabelSnapshot::new(*name, *name, keys.iter().copied()),
                )
            })
            .collect()
    }

    #[test]
    fn test_dev_stateless_lands_on_matching_node() {
        let cluster = nodes(&[
            ("node-a", &["dice/workspace-dev", "dice/stateless-service"]),
            ("node-b", &["dice/workspace-test", "dice/stateless-service"]),
        ]);

        let report = PrecheckEngine::new().precheck(&dev_stateless(), &cluster);

        assert!(report.is_ok());
        let web = &report.services["web"];
        assert_eq!(web.status, PrecheckStatus::Ok);
        assert_eq!(web.feasible_nodes, vec!["node-a".to_string()]);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_zero_nodes_is_unschedulable() {
        let report = PrecheckEngine::new().precheck(&dev_stateless(), &BTreeMap::new());

        assert_eq!(report.status, PrecheckStatus::Unschedulable);
        assert_eq!(report.unschedulable(), vec!["web".to_string()]);
        assert!(report.explanation().contains("no nodes in the cluster"));
    }

    #[test]
    fn test_unschedulable_explanation_lists_groups() {
        let cluster = nodes(&[("node-b", &["dice/workspace-test"])]);
        let report = PrecheckEngine::new().precheck(&dev_stateless(), &cluster);

        let explanation = report.explanation();
        assert!(explanation.starts_with("service web: no node satisfies"));
        assert!(explanation.contains("must carry labels {dice/workspace-dev}"));
        assert!(explanation.contains("must not carry labels {dice/org-*}"));
        assert!(explanation.contains(" AND "));

        match report.into_result() {
            Err(SchedulerError::Unschedulable { services, explanation }) => {
                assert_eq!(services, vec!["web".to_string()]);
                assert!(explanation.contains("dice/stateless-service"));
            }
            other => panic!("expected Unschedulable, got {:?}", other),
        }
    }

    #[test]
    fn test_global_status_requires_every_service() {
        let mut services = dev_stateless();
        let job = PolicySpec {
            is_job: true,
            ..PolicySpec::new("batch")
        };
        services.insert(
            "batch".to_string(),
            ConstraintBuilder::compile(&job, None, Backend::Kubernetes),
        );

        let cluster = nodes(&[("node-a", &["dice/workspace-dev", "dice/stateless-service"])]);
        let report = PrecheckEngine::new().precheck(&services, &cluster);

        assert!(!report.is_ok());
        assert_eq!(report.services["web"].status, PrecheckStatus::Ok);
        assert_eq!(report.unschedulable(), vec!["batch".to_string()]);
    }

    #[test]
    fn test_no_services_is_ok() {
        let report = PrecheckEngine::new().precheck(&BTreeMap::new(), &BTreeMap::new());
        assert!(report.is_ok());
    }
}
