use polestar_core::labels;
use polestar_core::Node;
use serde::{Deserialize, Serialize};

/// Result of filtering a node
#[derive(Debug, Clone)]
pub struct FilterResult {
    /// Node name
    pub node_name: String,
    /// Whether the node passed the filter
    pub passed: bool,
    /// Reason for failure (if any)
    pub reason: Option<String>,
}

impl FilterResult {
    /// Create a passing filter result
    pub fn pass(node_name: String) -> Self {
        Self {
            node_name,
            passed: true,
            reason: None,
        }
    }

    /// Create a failing filter result
    pub fn fail(node_name: String, reason: String) -> Self {
        Self {
            node_name,
            passed: false,
            reason: Some(reason),
        }
    }
}

/// Label set of one node at collection time.
///
/// Tags are stored without the structured prefix and kept sorted so every
/// membership test is a binary search. The family markers implied by the
/// tags are added on construction, the same way collectors label nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawSnapshot", into = "RawSnapshot")]
pub struct NodeLabelSnapshot {
    name: String,
    hostname: String,
    tags: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct RawSnapshot {
    name: String,
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
}

impl From<RawSnapshot> for NodeLabelSnapshot {
    fn from(raw: RawSnapshot) -> Self {
        let hostname = raw.hostname.unwrap_or_else(|| raw.name.clone());
        Self::new(raw.name, hostname, raw.labels)
    }
}

impl From<NodeLabelSnapshot> for RawSnapshot {
    fn from(snapshot: NodeLabelSnapshot) -> Self {
        Self {
            name: snapshot.name,
            hostname: Some(snapshot.hostname),
            labels: snapshot.tags,
        }
    }
}

impl NodeLabelSnapshot {
    /// Build a snapshot; labels may be given as tags or as `dice/` keys
    pub fn new<I, S>(name: impl Into<String>, hostname: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags = labels::with_family_markers(
            keys.into_iter()
                .map(|l| labels::tag_of(l.as_ref().trim()).to_string())
                .filter(|t| !t.is_empty()),
        );

        Self {
            name: name.into(),
            hostname: hostname.into(),
            tags,
        }
    }

    /// Build from a legacy comma-separated tag attribute
    pub fn from_tag_attribute(name: impl Into<String>, attribute: &str) -> Self {
        let name = name.into();
        Self::new(name.clone(), name, attribute.split(','))
    }

    /// Build from a Kubernetes node; only `dice/` label keys are tags
    pub fn from_node(node: &Node) -> Self {
        let name = node
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| "unknown".to_string());

        let node_labels = node.metadata.labels.clone().unwrap_or_default();
        let hostname = node_labels
            .get(labels::TOPOLOGY_HOSTNAME)
            .cloned()
            .unwrap_or_else(|| name.clone());

        let tags = node_labels
            .keys()
            .filter(|k| k.starts_with(labels::LABEL_PREFIX))
            .map(|k| k.as_str());

        Self::new(name, hostname, tags)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Sorted tags
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Whether the node carries `tag`
    pub fn has(&self, tag: &str) -> bool {
        self.tags
            .binary_search_by(|t| t.as_str().cmp(tag))
            .is_ok()
    }

    /// Whether the node carries the marker of the `prefix` family
    pub fn has_family(&self, prefix: &str) -> bool {
        self.has(&labels::family_marker(prefix))
    }

    /// Tags joined the way legacy backends expose them
    pub fn tag_attribute(&self) -> String {
        self.tags.join(",")
    }
}
