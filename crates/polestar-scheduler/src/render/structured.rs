use crate::constraint::{Combinator, Constraint, Dimension, DimensionTerm, PodSpreadTerm, Polarity, TagValue};
use crate::types::NodeLabelSnapshot;
use k8s_openapi::api::core::v1::{
    Affinity, NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm,
    PodAffinityTerm, PodAntiAffinity, WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use polestar_core::labels;
use serde::Serialize;
use std::collections::BTreeMap;

/// One AND-combination of label presence tests.
///
/// Keys are structured label keys (`dice/<tag>`); prefix entries name a
/// whole tag family (`dice/org-`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermGroup {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub require: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub require_prefixes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub forbid: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub forbid_prefixes: Vec<String>,
}

impl TermGroup {
    pub fn require<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            require: keys.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn forbid<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            forbid: keys.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// No tests at all: matches every node
    pub fn is_empty(&self) -> bool {
        self.require.is_empty()
            && self.require_prefixes.is_empty()
            && self.forbid.is_empty()
            && self.forbid_prefixes.is_empty()
    }

    /// All required labels present and no forbidden label present.
    ///
    /// Prefix entries test the family marker, exactly as the Kubernetes
    /// export does.
    pub fn matches(&self, node: &NodeLabelSnapshot) -> bool {
        self.require.iter().all(|k| node.has(labels::tag_of(k)))
            && self
                .require_prefixes
                .iter()
                .all(|p| node.has_family(labels::tag_of(p)))
            && !self.forbid.iter().any(|k| node.has(labels::tag_of(k)))
            && !self
                .forbid_prefixes
                .iter()
                .any(|p| node.has_family(labels::tag_of(p)))
    }

    /// "must carry labels {..}, must not carry labels {..}"
    pub fn describe(&self) -> String {
        let carry: Vec<String> = self
            .require
            .iter()
            .cloned()
            .chain(self.require_prefixes.iter().map(|p| format!("{}*", p)))
            .collect();
        let avoid: Vec<String> = self
            .forbid
            .iter()
            .cloned()
            .chain(self.forbid_prefixes.iter().map(|p| format!("{}*", p)))
            .collect();

        format!(
            "must carry labels {{{}}}, must not carry labels {{{}}}",
            carry.join(", "),
            avoid.join(", ")
        )
    }

    fn node_requirements(&self) -> Vec<NodeSelectorRequirement> {
        let exists = |key: String| NodeSelectorRequirement {
            key,
            operator: "Exists".to_string(),
            values: None,
        };
        let absent = |key: String| NodeSelectorRequirement {
            key,
            operator: "DoesNotExist".to_string(),
            values: None,
        };

        self.require
            .iter()
            .cloned()
            .map(exists)
            .chain(
                self.require_prefixes
                    .iter()
                    .map(|p| labels::family_marker(p))
                    .map(exists),
            )
            .chain(self.forbid.iter().cloned().map(absent))
            .chain(self.forbid_prefixes.iter().flat_map(|p| {
                // Closed families are also forbidden member by member
                let members = labels::closed_family_members(p).unwrap_or_default();
                std::iter::once(labels::family_marker(p))
                    .chain(members)
                    .map(absent)
            }))
            .collect()
    }
}

/// OR of term groups for one dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AffinityExpression {
    pub dimension: Dimension,
    pub groups: Vec<TermGroup>,
}

impl AffinityExpression {
    /// Whether some group admits the node
    pub fn matches(&self, node: &NodeLabelSnapshot) -> bool {
        if self.is_unconstrained() {
            return true;
        }
        self.groups.iter().any(|g| g.matches(node))
    }

    /// Contains a group with no tests, so every node matches
    pub fn is_unconstrained(&self) -> bool {
        self.groups.is_empty() || self.groups.iter().any(TermGroup::is_empty)
    }

    pub fn describe(&self) -> String {
        let groups: Vec<String> = self.groups.iter().map(TermGroup::describe).collect();
        groups.join(" OR ")
    }
}

/// Structured rendering: requirements are ANDed, each an OR of groups
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredConstraint {
    pub service: String,
    pub requirements: Vec<AffinityExpression>,
    /// Node must be one of these hosts (empty = any)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub host_pins: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pod_spread: Vec<PodSpreadTerm>,
}

impl StructuredConstraint {
    pub fn matches_host(&self, node: &NodeLabelSnapshot) -> bool {
        self.host_pins.is_empty() || self.host_pins.iter().any(|h| h == node.hostname())
    }

    /// First requirement the node fails, if any
    pub fn failing_requirement(&self, node: &NodeLabelSnapshot) -> Option<&AffinityExpression> {
        self.requirements.iter().find(|r| !r.matches(node))
    }

    pub fn matches(&self, node: &NodeLabelSnapshot) -> bool {
        self.matches_host(node) && self.failing_requirement(node).is_none()
    }

    /// Every requirement rendered, joined by AND
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.host_pins.is_empty() {
            parts.push(format!("must run on one of hosts {{{}}}", self.host_pins.join(", ")));
        }
        parts.extend(
            self.requirements
                .iter()
                .filter(|r| !r.is_unconstrained())
                .map(|r| format!("({})", r.describe())),
        );
        parts.join(" AND ")
    }

    /// Kubernetes affinity for the pod spec.
    ///
    /// Kubernetes ORs node selector terms and ANDs expressions inside a term,
    /// so the per-dimension requirements are multiplied out here and only here.
    pub fn to_k8s_affinity(&self) -> Option<Affinity> {
        let node_affinity = self.node_affinity();
        let pod_anti_affinity = self.pod_anti_affinity();

        if node_affinity.is_none() && pod_anti_affinity.is_none() {
            return None;
        }

        Some(Affinity {
            node_affinity,
            pod_anti_affinity,
            ..Default::default()
        })
    }

    fn node_affinity(&self) -> Option<NodeAffinity> {
        let mut combos: Vec<Vec<NodeSelectorRequirement>> = vec![Vec::new()];

        for requirement in self.requirements.iter().filter(|r| !r.is_unconstrained()) {
            let mut next = Vec::with_capacity(combos.len() * requirement.groups.len());
            for combo in &combos {
                for group in &requirement.groups {
                    let mut expressions = combo.clone();
                    expressions.extend(group.node_requirements());
                    next.push(expressions);
                }
            }
            combos = next;
        }

        let mut terms = Vec::new();
        for expressions in combos {
            let match_expressions = (!expressions.is_empty()).then_some(expressions);
            if self.host_pins.is_empty() {
                if match_expressions.is_some() {
                    terms.push(NodeSelectorTerm {
                        match_expressions,
                        match_fields: None,
                    });
                }
                continue;
            }
            for host in &self.host_pins {
                terms.push(NodeSelectorTerm {
                    match_expressions: match_expressions.clone(),
                    match_fields: Some(vec![NodeSelectorRequirement {
                        key: "metadata.name".to_string(),
                        operator: "In".to_string(),
                        values: Some(vec![host.clone()]),
                    }]),
                });
            }
        }

        if terms.is_empty() {
            return None;
        }

        Some(NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: terms,
            }),
            ..Default::default()
        })
    }

    fn pod_anti_affinity(&self) -> Option<PodAntiAffinity> {
        if self.pod_spread.is_empty() {
            return None;
        }

        let mut required = Vec::new();
        let mut preferred = Vec::new();

        for spread in &self.pod_spread {
            let label_selector = match &spread.label_value {
                Some(value) => LabelSelector {
                    match_labels: Some(BTreeMap::from([(spread.label_key.clone(), value.clone())])),
                    ..Default::default()
                },
                None => LabelSelector {
                    match_expressions: Some(vec![LabelSelectorRequirement {
                        key: spread.label_key.clone(),
                        operator: "Exists".to_string(),
                        values: None,
                    }]),
                    ..Default::default()
                },
            };

            let term = PodAffinityTerm {
                label_selector: Some(label_selector),
                topology_key: spread.topology_key.clone(),
                ..Default::default()
            };

            if spread.required {
                required.push(term);
            } else {
                preferred.push(WeightedPodAffinityTerm {
                    weight: spread.weight,
                    pod_affinity_term: term,
                });
            }
        }

        Some(PodAntiAffinity {
            required_during_scheduling_ignored_during_execution: (!required.is_empty())
                .then_some(required),
            preferred_during_scheduling_ignored_during_execution: (!preferred.is_empty())
                .then_some(preferred),
        })
    }
}

/// Render a constraint into required/forbidden label groups
pub fn render(constraint: &Constraint) -> StructuredConstraint {
    let mut host_pins = Vec::new();
    let mut requirements = Vec::new();

    for term in &constraint.terms {
        if term.dimension == Dimension::SpecificHost {
            host_pins.extend(term.values.iter().map(|v| match v {
                TagValue::Exact(h) | TagValue::Prefix(h) => h.clone(),
            }));
            continue;
        }
        requirements.push(AffinityExpression {
            dimension: term.dimension,
            groups: term_groups(term),
        });
    }

    StructuredConstraint {
        service: constraint.service.clone(),
        requirements,
        host_pins,
        pod_spread: constraint.pod_spread.clone(),
    }
}

fn term_groups(term: &DimensionTerm) -> Vec<TermGroup> {
    match (term.polarity, term.combinator) {
        (Polarity::Like, Combinator::Any) => term
            .values
            .iter()
            .map(|v| {
                let mut group = TermGroup::default();
                push_value(v, &mut group.require, &mut group.require_prefixes);
                group
            })
            .collect(),
        (Polarity::Like, Combinator::All) => {
            let mut group = TermGroup::default();
            for v in &term.values {
                push_value(v, &mut group.require, &mut group.require_prefixes);
            }
            vec![group]
        }
        (Polarity::Unlike, _) => {
            let mut group = TermGroup::default();
            for v in &term.values {
                push_value(v, &mut group.forbid, &mut group.forbid_prefixes);
            }
            vec![group]
        }
    }
}

fn push_value(value: &TagValue, exact: &mut Vec<String>, prefixes: &mut Vec<String>) {
    match value {
        TagValue::Exact(tag) => exact.push(labels::structured_key(tag)),
        TagValue::Prefix(prefix) => prefixes.push(labels::structured_key(prefix)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ConstraintBuilder;
    use polestar_core::{Backend, Pin, PolicySpec, Workspace};

    fn node(keys: &[&str]) -> NodeLabelSnapshot {
        NodeLabelSnapshot::new("n1", "n1", keys.iter().copied())
    }

    #[test]
    fn test_or_of_and_groups() {
        let labels = node(&["a", "b", "c"]);

        let rejecting = AffinityExpression {
            dimension: Dimension::RequiredTags,
            groups: vec![TermGroup {
                require: vec!["b".to_string(), "c".to_string()],
                forbid: vec!["a".to_string()],
                ..Default::default()
            }],
        };
        assert!(!rejecting.matches(&labels));

        let accepting = AffinityExpression {
            dimension: Dimension::RequiredTags,
            groups: vec![TermGroup::require(["a", "b"])],
        };
        assert!(accepting.matches(&labels));

        // Any single satisfied group is enough
        let either = AffinityExpression {
            dimension: Dimension::RequiredTags,
            groups: vec![TermGroup::forbid(["a"]), TermGroup::require(["c"])],
        };
        assert!(either.matches(&labels));

        let neither = AffinityExpression {
            dimension: Dimension::RequiredTags,
            groups: vec![TermGroup::forbid(["a"]), TermGroup::require(["d"])],
        };
        assert!(!neither.matches(&labels));
    }

    #[test]
    fn test_empty_group_short_circuits() {
        let expr = AffinityExpression {
            dimension: Dimension::Org,
            groups: vec![TermGroup::require(["missing"]), TermGroup::default()],
        };
        assert!(expr.is_unconstrained());
        assert!(expr.matches(&node(&[])));
    }

    #[test]
    fn test_prefix_forbid() {
        let expr = AffinityExpression {
            dimension: Dimension::Org,
            groups: vec![TermGroup {
                forbid_prefixes: vec!["dice/org-".to_string()],
                ..Default::default()
            }],
        };
        assert!(expr.matches(&node(&["dice/workspace-dev"])));
        assert!(!expr.matches(&node(&["dice/org-3"])));
    }

    #[test]
    fn test_like_values_become_separate_groups() {
        let spec = PolicySpec {
            workspace: Pin::Pinned(vec![Workspace::Dev, Workspace::Test]),
            ..PolicySpec::new("web")
        };
        let rendered = ConstraintBuilder::compile(&spec, None, Backend::Kubernetes).structured();

        let ws = rendered
            .requirements
            .iter()
            .find(|r| r.dimension == Dimension::Workspace)
            .unwrap();
        assert_eq!(
            ws.groups,
            vec![
                TermGroup::require(["dice/workspace-dev"]),
                TermGroup::require(["dice/workspace-test"]),
            ]
        );
        // One requirement per dimension, no cross product in the neutral form
        assert_eq!(rendered.requirements.len(), 10);
    }

    #[test]
    fn test_describe() {
        let expr = AffinityExpression {
            dimension: Dimension::Workspace,
            groups: vec![
                TermGroup::require(["dice/workspace-dev"]),
                TermGroup {
                    require: vec!["dice/workspace-test".to_string()],
                    forbid_prefixes: vec!["dice/org-".to_string()],
                    ..Default::default()
                },
            ],
        };
        assert_eq!(
            expr.describe(),
            "must carry labels {dice/workspace-dev}, must not carry labels {} OR \
             must carry labels {dice/workspace-test}, must not carry labels {dice/org-*}"
        );
    }

    #[test]
    fn test_k8s_affinity_export() {
        let spec = PolicySpec {
            specific_hosts: vec!["node-1".to_string(), "node-2".to_string()],
            workspace: Pin::Pinned(vec![Workspace::Dev, Workspace::Test]),
            is_stateless: true,
            ..PolicySpec::new("web")
        };
        let rendered = ConstraintBuilder::compile(&spec, None, Backend::Kubernetes).structured();
        let affinity = rendered.to_k8s_affinity().unwrap();

        let terms = affinity
            .node_affinity
            .unwrap()
            .required_during_scheduling_ignored_during_execution
            .unwrap()
            .node_selector_terms;

        // 2 workspace groups x 2 hosts
        assert_eq!(terms.len(), 4);
        for term in &terms {
            let fields = term.match_fields.as_ref().unwrap();
            assert_eq!(fields.len(), 1);
            assert_eq!(fields[0].key, "metadata.name");
            assert_eq!(fields[0].values.as_ref().unwrap().len(), 1);

            let exprs = term.match_expressions.as_ref().unwrap();
            assert!(exprs
                .iter()
                .any(|e| e.key == "dice/org" && e.operator == "DoesNotExist"));
            assert!(exprs
                .iter()
                .any(|e| e.key == "dice/stateless-service" && e.operator == "Exists"));
        }
        assert!(affinity.pod_anti_affinity.is_none());
    }

    /// Node selector terms evaluated the way the Kubernetes scheduler does
    fn k8s_admits(affinity: Option<&Affinity>, keys: &[String]) -> bool {
        let Some(selector) = affinity
            .and_then(|a| a.node_affinity.as_ref())
            .and_then(|n| n.required_during_scheduling_ignored_during_execution.as_ref())
        else {
            return true;
        };
        selector.node_selector_terms.iter().any(|term| {
            term.match_expressions.iter().flatten().all(|e| {
                let present = keys.contains(&e.key);
                match e.operator.as_str() {
                    "Exists" => present,
                    "DoesNotExist" => !present,
                    other => panic!("unexpected operator {}", other),
                }
            })
        })
    }

    #[test]
    fn test_k8s_export_agrees_with_precheck() {
        let rendered =
            ConstraintBuilder::compile(&PolicySpec::new("web"), None, Backend::Kubernetes)
                .structured();
        let affinity = rendered.to_k8s_affinity();

        let cases: [(Vec<String>, bool); 6] = [
            (Vec::new(), true),
            (labels::with_family_markers(["dice/gpu"]), true),
            (labels::with_family_markers(["dice/org-1"]), false),
            (labels::with_family_markers(["dice/location-sh", "dice/gpu"]), false),
            (labels::with_family_markers(["dice/project-7"]), false),
            // Closed family, labelled without its marker
            (vec!["dice/workspace-dev".to_string()], false),
        ];

        for (keys, eligible) in &cases {
            let snapshot = NodeLabelSnapshot::new("n1", "n1", keys.iter());
            assert_eq!(rendered.matches(&snapshot), *eligible, "precheck on {:?}", keys);
            assert_eq!(
                k8s_admits(affinity.as_ref(), keys),
                *eligible,
                "export on {:?}",
                keys
            );
        }
    }

    #[test]
    fn test_closed_family_forbidden_member_by_member() {
        let rendered =
            ConstraintBuilder::compile(&PolicySpec::new("web"), None, Backend::Kubernetes)
                .structured();
        let affinity = rendered.to_k8s_affinity().unwrap();
        let terms = affinity
            .node_affinity
            .unwrap()
            .required_during_scheduling_ignored_during_execution
            .unwrap()
            .node_selector_terms;
        assert_eq!(terms.len(), 1);

        let absent: Vec<&str> = terms[0]
            .match_expressions
            .iter()
            .flatten()
            .filter(|e| e.operator == "DoesNotExist")
            .map(|e| e.key.as_str())
            .collect();
        for key in [
            "dice/org",
            "dice/location",
            "dice/project",
            "dice/workspace",
            "dice/workspace-prod",
            "dice/workspace-dev",
            "dice/workspace-test",
            "dice/workspace-staging",
        ] {
            assert!(absent.contains(&key), "missing {}", key);
        }
        assert!(!absent.contains(&"dice/org-"));
    }

    #[test]
    fn test_k8s_pod_anti_affinity() {
        let spec = PolicySpec {
            is_job: true,
            ..PolicySpec::new("batch")
        };
        let rendered = ConstraintBuilder::compile(&spec, None, Backend::Kubernetes).structured();
        let anti = rendered.to_k8s_affinity().unwrap().pod_anti_affinity.unwrap();

        assert!(anti.required_during_scheduling_ignored_during_execution.is_none());
        let preferred = anti.preferred_during_scheduling_ignored_during_execution.unwrap();
        assert_eq!(preferred.len(), 1);
        assert_eq!(preferred[0].weight, 100);
        assert_eq!(
            preferred[0].pod_affinity_term.topology_key,
            "kubernetes.io/hostname"
        );
    }
}
