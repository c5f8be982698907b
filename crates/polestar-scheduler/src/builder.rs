use crate::constraint::{Constraint, Dimension, DimensionTerm, PodSpreadTerm, TagValue};
use polestar_core::labels;
use polestar_core::{Backend, Pin, PodLabelsForAffinity, PolicySpec};
use tracing::{debug, warn};

/// Weight of every preferred pod anti-affinity term
pub const SPREAD_WEIGHT: i32 = 100;

/// Compiles a `PolicySpec` into the backend-neutral `Constraint`
pub struct ConstraintBuilder;

impl ConstraintBuilder {
    /// Compile `spec` for `backend`.
    ///
    /// Every isolation dimension produces exactly one term; an absent
    /// dimension becomes an UNLIKE over its whole tag family.
    pub fn compile(
        spec: &PolicySpec,
        instance_labels: Option<&[PodLabelsForAffinity]>,
        backend: Backend,
    ) -> Constraint {
        let mut terms = Vec::new();

        if !spec.specific_hosts.is_empty() {
            terms.push(DimensionTerm::like(
                Dimension::SpecificHost,
                dedup(spec.specific_hosts.iter().cloned())
                    .into_iter()
                    .map(TagValue::Exact)
                    .collect(),
            ));
        }

        terms.push(flag_term(Dimension::Platform, spec.is_platform, labels::TAG_PLATFORM));

        // Unlocked workloads avoid locked nodes; locked ones require them
        terms.push(flag_term(Dimension::Unlock, !spec.is_unlocked, labels::TAG_LOCKED));

        terms.push(location_term(spec));

        terms.push(scalar_pin_term(
            Dimension::Org,
            &spec.org,
            labels::ORG_PREFIX,
            &spec.service_name,
        ));

        terms.push(workspace_term(spec));

        terms.push(class_term(Dimension::Job, spec.is_job, spec.prefer_job, labels::TAG_JOB));
        terms.push(class_term(
            Dimension::Stateful,
            spec.is_stateful,
            spec.prefer_stateful,
            labels::TAG_STATEFUL,
        ));
        terms.push(class_term(
            Dimension::Stateless,
            spec.is_stateless,
            spec.prefer_stateless,
            labels::TAG_STATELESS,
        ));
        terms.push(class_term(
            Dimension::BigData,
            spec.is_big_data,
            false,
            labels::TAG_BIGDATA,
        ));

        terms.push(scalar_pin_term(
            Dimension::Project,
            &spec.project,
            labels::PROJECT_PREFIX,
            &spec.service_name,
        ));

        if !spec.required_tags.is_empty() {
            terms.push(DimensionTerm::like_all(
                Dimension::RequiredTags,
                dedup(spec.required_tags.iter().cloned())
                    .into_iter()
                    .map(TagValue::Exact)
                    .collect(),
            ));
        }

        let pod_spread = spread_terms(spec, instance_labels.unwrap_or_default());

        debug!(
            "Compiled {} terms and {} spread hints for service {} ({})",
            terms.len(),
            pod_spread.len(),
            spec.service_name,
            backend
        );

        Constraint {
            backend,
            service: spec.service_name.clone(),
            terms,
            pod_spread,
        }
    }
}

/// LIKE `tag` when `wanted`, UNLIKE `tag` otherwise
fn flag_term(dimension: Dimension, wanted: bool, tag: &str) -> DimensionTerm {
    let values = vec![TagValue::exact(tag)];
    if wanted {
        DimensionTerm::like(dimension, values)
    } else {
        DimensionTerm::unlike(dimension, values)
    }
}

/// Workload-class tag; `prefer` also accepts nodes tagged `any`
fn class_term(dimension: Dimension, set: bool, prefer: bool, tag: &str) -> DimensionTerm {
    if !set {
        return DimensionTerm::unlike(dimension, vec![TagValue::exact(tag)]);
    }

    let mut values = Vec::with_capacity(2);
    if prefer {
        values.push(TagValue::exact(labels::TAG_ANY));
    }
    values.push(TagValue::exact(tag));
    DimensionTerm::like(dimension, values)
}

fn location_term(spec: &PolicySpec) -> DimensionTerm {
    match spec.own_location() {
        Some(selector) => {
            let values = dedup(selector.values.iter().cloned())
                .into_iter()
                .map(|v| TagValue::Exact(format!("{}{}", labels::LOCATION_PREFIX, v)))
                .collect();
            if selector.not {
                DimensionTerm::unlike(Dimension::Location, values)
            } else {
                DimensionTerm::like(Dimension::Location, values)
            }
        }
        None => DimensionTerm::unlike(
            Dimension::Location,
            vec![TagValue::prefix(labels::LOCATION_PREFIX)],
        ),
    }
}

fn scalar_pin_term(
    dimension: Dimension,
    pin: &Pin<String>,
    prefix: &str,
    service: &str,
) -> DimensionTerm {
    match pin {
        Pin::Pinned(value) if !value.trim().is_empty() => DimensionTerm::like(
            dimension,
            vec![TagValue::Exact(format!("{}{}", prefix, value.trim()))],
        ),
        Pin::Pinned(_) => {
            warn!(
                "Service {} pins {:?} to an empty value, treating it as absent",
                service, dimension
            );
            DimensionTerm::unlike(dimension, vec![TagValue::prefix(prefix)])
        }
        Pin::Absent => DimensionTerm::unlike(dimension, vec![TagValue::prefix(prefix)]),
    }
}

fn workspace_term(spec: &PolicySpec) -> DimensionTerm {
    match &spec.workspace {
        Pin::Pinned(workspaces) if !workspaces.is_empty() => {
            let values = dedup(
                workspaces
                    .iter()
                    .map(|ws| format!("{}{}", labels::WORKSPACE_PREFIX, ws.label_value())),
            )
            .into_iter()
            .map(TagValue::Exact)
            .collect();
            DimensionTerm::like(Dimension::Workspace, values)
        }
        Pin::Pinned(_) => {
            warn!(
                "Service {} pins workspace to an empty set, treating it as absent",
                spec.service_name
            );
            DimensionTerm::unlike(
                Dimension::Workspace,
                vec![TagValue::prefix(labels::WORKSPACE_PREFIX)],
            )
        }
        Pin::Absent => DimensionTerm::unlike(
            Dimension::Workspace,
            vec![TagValue::prefix(labels::WORKSPACE_PREFIX)],
        ),
    }
}

fn spread_terms(spec: &PolicySpec, instance_labels: &[PodLabelsForAffinity]) -> Vec<PodSpreadTerm> {
    let mut out = Vec::new();

    for group in instance_labels {
        for (key, value) in &group.labels {
            for topology in [labels::TOPOLOGY_ZONE, labels::TOPOLOGY_HOSTNAME] {
                out.push(PodSpreadTerm {
                    label_key: key.clone(),
                    label_value: Some(value.clone()),
                    topology_key: topology.to_string(),
                    required: group.required,
                    weight: SPREAD_WEIGHT,
                });
            }
        }
    }

    if spec.is_job || spec.is_big_data {
        out.push(PodSpreadTerm {
            label_key: labels::structured_key(labels::TAG_JOB),
            label_value: None,
            topology_key: labels::TOPOLOGY_HOSTNAME.to_string(),
            required: false,
            weight: SPREAD_WEIGHT,
        });
    }

    out
}

/// Drop repeated values, keeping first occurrence order
fn dedup<I: IntoIterator<Item = String>>(values: I) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for v in values {
        if !out.contains(&v) {
            out.push(v);
        }
    }
    out
}
