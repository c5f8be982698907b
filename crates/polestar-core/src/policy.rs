use crate::error::{CoreError, Result};
use crate::types::Workspace;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// State of an isolation dimension: pinned to value(s), or absent.
///
/// An absent dimension is never permissive: it compiles to a rule that
/// avoids every node carrying any label of that dimension.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<T>", into = "Option<T>")]
pub enum Pin<T: Clone> {
    Pinned(T),
    #[default]
    Absent,
}

impl<T: Clone> Pin<T> {
    pub fn as_pinned(&self) -> Option<&T> {
        match self {
            Pin::Pinned(v) => Some(v),
            Pin::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Pin::Absent)
    }
}

impl<T: Clone> From<Option<T>> for Pin<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Pin::Pinned(v),
            None => Pin::Absent,
        }
    }
}

impl<T: Clone> From<Pin<T>> for Option<T> {
    fn from(value: Pin<T>) -> Self {
        match value {
            Pin::Pinned(v) => Some(v),
            Pin::Absent => None,
        }
    }
}

/// Zone selector for one service
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LocationSelector {
    /// Location names, e.g. ["hangzhou-a"]
    #[serde(default)]
    pub values: Vec<String>,
    /// true = match none of `values`, false = match any of `values`
    #[serde(default)]
    pub not: bool,
}

/// Pod labels of one replica group, used to spread replicas apart
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PodLabelsForAffinity {
    pub labels: BTreeMap<String, String>,
    /// Hard (required) anti-affinity rather than a weighted preference
    #[serde(default)]
    pub required: bool,
}

fn default_unlocked() -> bool {
    true
}

/// Backend-neutral scheduling intent for one workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    /// Service the policy belongs to; keys the location map
    pub service_name: String,
    /// Hosts the workload must land on, any of them (empty = unconstrained)
    #[serde(default)]
    pub specific_hosts: Vec<String>,
    #[serde(default)]
    pub is_platform: bool,
    #[serde(default = "default_unlocked")]
    pub is_unlocked: bool,
    #[serde(default)]
    pub is_job: bool,
    #[serde(default)]
    pub prefer_job: bool,
    #[serde(default)]
    pub is_stateful: bool,
    #[serde(default)]
    pub prefer_stateful: bool,
    #[serde(default)]
    pub is_stateless: bool,
    #[serde(default)]
    pub prefer_stateless: bool,
    #[serde(default)]
    pub is_big_data: bool,
    /// Per-service location selectors, keyed by service name
    #[serde(default)]
    pub location: BTreeMap<String, LocationSelector>,
    #[serde(default)]
    pub org: Pin<String>,
    #[serde(default)]
    pub workspace: Pin<Vec<Workspace>>,
    #[serde(default)]
    pub project: Pin<String>,
    /// Custom tags a node must carry, all of them
    #[serde(default)]
    pub required_tags: Vec<String>,
}

impl PolicySpec {
    /// An unconstrained policy for `service_name`
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            specific_hosts: Vec::new(),
            is_platform: false,
            is_unlocked: true,
            is_job: false,
            prefer_job: false,
            is_stateful: false,
            prefer_stateful: false,
            is_stateless: false,
            prefer_stateless: false,
            is_big_data: false,
            location: BTreeMap::new(),
            org: Pin::Absent,
            workspace: Pin::Absent,
            project: Pin::Absent,
            required_tags: Vec::new(),
        }
    }

    /// Location selector designated for this policy's own service
    pub fn own_location(&self) -> Option<&LocationSelector> {
        self.location
            .get(&self.service_name)
            .filter(|s| !s.values.is_empty())
    }

    /// Reject contradictory policies.
    ///
    /// A dimension pinned to nothing is neither pinned nor absent, and tag
    /// values that would split the comma-separated attribute list are refused.
    pub fn validate(&self) -> Result<()> {
        let svc = &self.service_name;

        if let Pin::Pinned(org) = &self.org {
            if org.trim().is_empty() {
                return Err(CoreError::invalid_policy(svc, "org is pinned to an empty value"));
            }
        }
        if let Pin::Pinned(project) = &self.project {
            if project.trim().is_empty() {
                return Err(CoreError::invalid_policy(
                    svc,
                    "project is pinned to an empty value",
                ));
            }
        }
        if let Pin::Pinned(workspaces) = &self.workspace {
            if workspaces.is_empty() {
                return Err(CoreError::invalid_policy(
                    svc,
                    "workspace is pinned to an empty set",
                ));
            }
        }

        let tag_like = self
            .required_tags
            .iter()
            .chain(self.specific_hosts.iter())
            .chain(self.location.values().flat_map(|s| s.values.iter()));
        for value in tag_like {
            if value.trim().is_empty() || value.contains(',') {
                return Err(CoreError::invalid_policy(
                    svc,
                    format!("'{}' is not a valid tag value", value),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_unlocked_and_absent() {
        let spec = PolicySpec::new("web");
        assert!(spec.is_unlocked);
        assert!(spec.org.is_absent());
        assert!(spec.workspace.is_absent());
        assert!(spec.project.is_absent());
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_pins() {
        let spec = PolicySpec {
            workspace: Pin::Pinned(vec![]),
            ..PolicySpec::new("web")
        };
        assert!(matches!(
            spec.validate(),
            Err(CoreError::InvalidPolicy { .. })
        ));

        let spec = PolicySpec {
            org: Pin::Pinned("  ".to_string()),
            ..PolicySpec::new("web")
        };
        assert!(spec.validate().is_err());

        let spec = PolicySpec {
            required_tags: vec!["gpu,ssd".to_string()],
            ..PolicySpec::new("web")
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_deserialize_camel_case() {
        let json = r#"{
            "serviceName": "api",
            "isStateless": true,
            "org": "1",
            "workspace": ["DEV", "TEST"],
            "location": {"api": {"values": ["hz"], "not": false}}
        }"#;
        let spec: PolicySpec = serde_json::from_str(json).unwrap();
        assert!(spec.is_stateless);
        assert!(spec.is_unlocked);
        assert_eq!(spec.org, Pin::Pinned("1".to_string()));
        assert_eq!(
            spec.workspace,
            Pin::Pinned(vec![Workspace::Dev, Workspace::Test])
        );
        assert!(spec.project.is_absent());
        assert_eq!(spec.own_location().unwrap().values, vec!["hz"]);
    }

    #[test]
    fn test_own_location_ignores_other_services() {
        let mut spec = PolicySpec::new("api");
        spec.location.insert(
            "worker".to_string(),
            LocationSelector {
                values: vec!["hz".to_string()],
                not: false,
            },
        );
        assert!(spec.own_location().is_none());
    }
}
