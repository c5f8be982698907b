//! Backend-neutral compiled constraint.
//!
//! A `Constraint` is an ordered list of dimension terms. Both backend
//! renderings are derived from the same terms; nothing backend-specific is
//! stored here.

use crate::render::regex::{self as regex_render, RegexConstraint};
use crate::render::structured::{self, StructuredConstraint};
use polestar_core::labels;
use polestar_core::Backend;
use serde::Serialize;
use std::fmt;

/// Whether the values are wanted or avoided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Polarity {
    Like,
    Unlike,
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarity::Like => write!(f, "LIKE"),
            Polarity::Unlike => write!(f, "UNLIKE"),
        }
    }
}

/// How the values of one term combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    /// At least one value (OR)
    Any,
    /// Every value at once (AND)
    All,
}

/// One value of a term: a whole tag, or every tag of a family
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TagValue {
    Exact(String),
    Prefix(String),
}

impl TagValue {
    pub fn exact(tag: impl Into<String>) -> Self {
        TagValue::Exact(tag.into())
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        TagValue::Prefix(prefix.into())
    }

    /// Whether `tag` is covered by this value
    pub fn covers(&self, tag: &str) -> bool {
        match self {
            TagValue::Exact(v) => v == tag,
            TagValue::Prefix(p) => tag.len() > p.len() && tag.starts_with(p.as_str()),
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Exact(v) => write!(f, "{}", v),
            TagValue::Prefix(p) => write!(f, "{}*", p),
        }
    }
}

/// Scheduling dimensions, in compile order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dimension {
    SpecificHost,
    Platform,
    Unlock,
    Location,
    Org,
    Workspace,
    Job,
    Stateful,
    Stateless,
    BigData,
    Project,
    RequiredTags,
}

impl Dimension {
    /// Node attribute the dimension is matched against
    pub fn key(&self) -> &'static str {
        match self {
            Dimension::SpecificHost => labels::HOSTNAME_ATTRIBUTE,
            _ => labels::TAGS_ATTRIBUTE,
        }
    }
}

/// One compiled dimension: key, polarity and a non-empty ordered value list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionTerm {
    pub dimension: Dimension,
    pub polarity: Polarity,
    pub combinator: Combinator,
    pub values: Vec<TagValue>,
}

impl DimensionTerm {
    /// Node must carry at least one of `values`
    pub fn like(dimension: Dimension, values: Vec<TagValue>) -> Self {
        Self {
            dimension,
            polarity: Polarity::Like,
            combinator: Combinator::Any,
            values,
        }
    }

    /// Node must carry every one of `values`
    pub fn like_all(dimension: Dimension, values: Vec<TagValue>) -> Self {
        Self {
            dimension,
            polarity: Polarity::Like,
            combinator: Combinator::All,
            values,
        }
    }

    /// Node must carry none of `values`
    pub fn unlike(dimension: Dimension, values: Vec<TagValue>) -> Self {
        Self {
            dimension,
            polarity: Polarity::Unlike,
            combinator: Combinator::Any,
            values,
        }
    }

    pub fn key(&self) -> &'static str {
        self.dimension.key()
    }
}

impl fmt::Display for DimensionTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = match self.combinator {
            Combinator::Any => " | ",
            Combinator::All => " & ",
        };
        let values: Vec<String> = self.values.iter().map(ToString::to_string).collect();
        write!(f, "{} {} {}", self.key(), self.polarity, values.join(sep))
    }
}

/// Pod-level anti-affinity hint for spreading replicas
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodSpreadTerm {
    pub label_key: String,
    /// `None` means "any pod carrying the key"
    pub label_value: Option<String>,
    pub topology_key: String,
    pub required: bool,
    pub weight: i32,
}

/// Compiled scheduling constraint for one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Constraint {
    pub backend: Backend,
    pub service: String,
    pub terms: Vec<DimensionTerm>,
    pub pod_spread: Vec<PodSpreadTerm>,
}

/// Backend-specific rendering of a constraint
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Rendered {
    Structured(StructuredConstraint),
    Regex { constraints: Vec<RegexConstraint> },
}

impl Constraint {
    /// Term for `dimension`, if one was emitted
    pub fn term(&self, dimension: Dimension) -> Option<&DimensionTerm> {
        self.terms.iter().find(|t| t.dimension == dimension)
    }

    /// Structured rendering (required/forbidden label groups)
    pub fn structured(&self) -> StructuredConstraint {
        structured::render(self)
    }

    /// Single-regex rendering for the legacy backends
    pub fn regex(&self) -> Vec<RegexConstraint> {
        regex_render::render(&self.terms)
    }

    /// Rendering for the backend this constraint was compiled for
    pub fn render(&self) -> Rendered {
        if self.backend.is_regex_target() {
            Rendered::Regex {
                constraints: self.regex(),
            }
        } else {
            Rendered::Structured(self.structured())
        }
    }
}
