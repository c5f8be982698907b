use crate::render::StructuredConstraint;
use crate::types::{FilterResult, NodeLabelSnapshot};
use tracing::debug;

/// Filter predicate trait
pub trait FilterPredicate: Send + Sync {
    /// Filter a node for the given constraint
    fn filter(&self, constraint: &StructuredConstraint, node: &NodeLabelSnapshot) -> FilterResult;

    /// Name of the filter
    fn name(&self) -> &str;
}

/// Filter for explicit host pins
pub struct HostPinMatch;

impl FilterPredicate for HostPinMatch {
    fn filter(&self, constraint: &StructuredConstraint, node: &NodeLabelSnapshot) -> FilterResult {
        let node_name = node.name().to_string();

        if constraint.matches_host(node) {
            return FilterResult::pass(node_name);
        }

        FilterResult::fail(
            node_name,
            format!(
                "Host {} is not one of {}",
                node.hostname(),
                constraint.host_pins.join(", ")
            ),
        )
    }

    fn name(&self) -> &str {
        "HostPinMatch"
    }
}

/// Filter for the per-dimension label requirements
pub struct LabelRequirementsMatch;

impl FilterPredicate for LabelRequirementsMatch {
    fn filter(&self, constraint: &StructuredConstraint, node: &NodeLabelSnapshot) -> FilterResult {
        let node_name = node.name().to_string();

        match constraint.failing_requirement(node) {
            None => FilterResult::pass(node_name),
            Some(requirement) => {
                debug!(
                    "Node {} fails {:?} for service {}",
                    node_name, requirement.dimension, constraint.service
                );
                FilterResult::fail(
                    node_name,
                    format!("{:?}: {}", requirement.dimension, requirement.describe()),
                )
            }
        }
    }

    fn name(&self) -> &str {
        "LabelRequirementsMatch"
    }
}

/// Get default filter predicates
pub fn default_filters() -> Vec<Box<dyn FilterPredicate>> {
    vec![Box::new(HostPinMatch), Box::new(LabelRequirementsMatch)]
}
