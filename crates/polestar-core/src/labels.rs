//! Node label vocabulary shared by every backend.
//!
//! A tag such as `workspace-dev` appears as the label key `dice/workspace-dev`
//! on structured backends and as an element of the comma-separated
//! `dice_tags` attribute on the regex backends.

use crate::types::Workspace;

/// Prefix of every scheduling label key on structured backends
pub const LABEL_PREFIX: &str = "dice/";

/// Node attribute carrying the tag list on regex backends
pub const TAGS_ATTRIBUTE: &str = "dice_tags";

/// Node attribute matched by host pins on regex backends
pub const HOSTNAME_ATTRIBUTE: &str = "hostname";

pub const TAG_PLATFORM: &str = "platform";
pub const TAG_LOCKED: &str = "locked";
pub const TAG_ANY: &str = "any";
pub const TAG_JOB: &str = "job";
pub const TAG_STATEFUL: &str = "stateful-service";
pub const TAG_STATELESS: &str = "stateless-service";
pub const TAG_BIGDATA: &str = "bigdata";

pub const LOCATION_PREFIX: &str = "location-";
pub const ORG_PREFIX: &str = "org-";
pub const WORKSPACE_PREFIX: &str = "workspace-";
pub const PROJECT_PREFIX: &str = "project-";

/// Namespace labels tying a namespace to its (project, workspace) scope
pub const NAMESPACE_PROJECT_LABEL: &str = "dice/ns-project";
pub const NAMESPACE_WORKSPACE_LABEL: &str = "dice/ns-workspace";

/// Topology keys used for spreading replicas
pub const TOPOLOGY_ZONE: &str = "dice/topology-zone";
pub const TOPOLOGY_HOSTNAME: &str = "kubernetes.io/hostname";

/// Label key for a tag on structured backends
pub fn structured_key(tag: &str) -> String {
    format!("{}{}", LABEL_PREFIX, tag)
}

/// Strip the structured prefix, if present
pub fn tag_of(key: &str) -> &str {
    key.strip_prefix(LABEL_PREFIX).unwrap_or(key)
}

/// Tag families that a policy can exclude as a whole
pub const TAG_FAMILIES: [&str; 4] = [LOCATION_PREFIX, ORG_PREFIX, WORKSPACE_PREFIX, PROJECT_PREFIX];

/// Family marker for a prefix family: `org-` -> `org`, `dice/org-` -> `dice/org`.
///
/// Structured backends cannot test for "any key starting with", so family
/// tests are expressed against the marker. A node labelled with a family
/// member must also carry the marker; collectors label nodes through
/// [`with_family_markers`].
pub fn family_marker(prefix: &str) -> String {
    prefix.trim_end_matches('-').to_string()
}

/// Add the family markers implied by a label set.
///
/// Keys may be bare tags or `dice/` keys; a marker takes the form of the key
/// that implies it.
pub fn with_family_markers<I, S>(keys: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = keys.into_iter().map(Into::into).collect();

    let mut markers = Vec::new();
    for key in &out {
        let tag = tag_of(key);
        for family in TAG_FAMILIES {
            if tag.len() > family.len() && tag.starts_with(family) {
                let marker = family_marker(family);
                if tag.len() == key.len() {
                    markers.push(marker);
                } else {
                    markers.push(structured_key(&marker));
                }
            }
        }
    }

    out.extend(markers);
    out.sort();
    out.dedup();
    out
}

/// Every member of a closed family, in the form of `prefix`.
///
/// Only the workspace family is closed; open families return `None`.
pub fn closed_family_members(prefix: &str) -> Option<Vec<String>> {
    (tag_of(prefix) == WORKSPACE_PREFIX).then(|| {
        Workspace::ALL
            .iter()
            .map(|ws| format!("{}{}", prefix, ws.label_value()))
            .collect()
    })
}
