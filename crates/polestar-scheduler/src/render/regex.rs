//! Single-expression rendering for the legacy backends.
//!
//! The backends match one regex against a node attribute: the hostname, or
//! the comma-separated tag list. Every tag alternative is delimited by commas,
//! so a tag only matches a whole list element. Values of a term are OR'd as
//! an alternation. AND over one attribute repeats the alternation once per
//! required value; each repetition consumes the list up to and including the
//! element it matched, so the repetitions match distinct elements.

use crate::constraint::{Combinator, Dimension, DimensionTerm, Polarity, TagValue};
use crate::error::{Result, SchedulerError};
use crate::types::NodeLabelSnapshot;
use polestar_core::labels;
use ::regex::Regex;
use serde::Serialize;

/// Skips whole list elements ahead of the one being matched
const SKIP_ELEMENTS: &str = "(?:[^,]*,)*";

/// Ends a list element
const ELEMENT_END: &str = "(?:,|$)";

/// One `[attribute, LIKE|UNLIKE, pattern]` constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegexConstraint {
    pub attribute: String,
    pub polarity: Polarity,
    pub pattern: String,
}

impl RegexConstraint {
    /// Wire form used by the legacy backends
    pub fn to_triple(&self) -> [String; 3] {
        [
            self.attribute.clone(),
            self.polarity.to_string(),
            self.pattern.clone(),
        ]
    }

    /// Compile once for evaluation against many attribute values
    pub fn compile(&self) -> Result<RegexMatcher> {
        let anchored = format!("^(?:{})$", self.pattern);
        let re = Regex::new(&anchored)
            .map_err(|e| SchedulerError::invalid_regex(&self.pattern, e.to_string()))?;

        Ok(RegexMatcher {
            host: self.attribute == labels::HOSTNAME_ATTRIBUTE,
            polarity: self.polarity,
            re,
        })
    }

    /// Evaluate against an attribute value with whole-string matching
    pub fn matches(&self, value: &str) -> Result<bool> {
        Ok(self.compile()?.matches(value))
    }

    /// Evaluate against the attribute a node exposes for this constraint
    pub fn matches_node(&self, node: &NodeLabelSnapshot) -> Result<bool> {
        Ok(self.compile()?.matches_node(node))
    }
}

/// A compiled `RegexConstraint`
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    host: bool,
    polarity: Polarity,
    re: Regex,
}

impl RegexMatcher {
    pub fn matches(&self, value: &str) -> bool {
        let hit = self.re.is_match(value);
        match self.polarity {
            Polarity::Like => hit,
            Polarity::Unlike => !hit,
        }
    }

    pub fn matches_node(&self, node: &NodeLabelSnapshot) -> bool {
        if self.host {
            self.matches(node.hostname())
        } else {
            self.matches(&node.tag_attribute())
        }
    }
}

/// Render terms one constraint each, in term order
pub fn render(terms: &[DimensionTerm]) -> Vec<RegexConstraint> {
    terms
        .iter()
        .map(|term| RegexConstraint {
            attribute: term.key().to_string(),
            polarity: term.polarity,
            pattern: term_pattern(term),
        })
        .collect()
}

fn term_pattern(term: &DimensionTerm) -> String {
    let alternatives: Vec<String> = term
        .values
        .iter()
        .map(|v| value_pattern(term.dimension, v))
        .collect();
    let alternation = alternatives.join("|");

    if term.dimension == Dimension::SpecificHost {
        return alternation;
    }

    match term.combinator {
        Combinator::All if alternatives.len() > 1 => {
            format!("(?:{}){{{}}}.*", alternation, alternatives.len())
        }
        _ => format!("(?:{}).*", alternation),
    }
}

fn value_pattern(dimension: Dimension, value: &TagValue) -> String {
    match (dimension, value) {
        (Dimension::SpecificHost, TagValue::Exact(host)) => ::regex::escape(host),
        (_, TagValue::Exact(tag)) => {
            format!("{}{}{}", SKIP_ELEMENTS, ::regex::escape(tag), ELEMENT_END)
        }
        (_, TagValue::Prefix(prefix)) => {
            format!("{}{}[^,]+{}", SKIP_ELEMENTS, ::regex::escape(prefix), ELEMENT_END)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ConstraintBuilder;
    use polestar_core::{Backend, Pin, PolicySpec, Workspace};

    fn required(tags: &[&str]) -> RegexConstraint {
        let term = DimensionTerm::like_all(
            Dimension::RequiredTags,
            tags.iter().map(|t| TagValue::exact(*t)).collect(),
        );
        render(&[term]).remove(0)
    }

    #[test]
    fn test_and_group_requires_both_in_any_order() {
        let c = required(&["gpu", "ssd"]);
        assert_eq!(
            c.pattern,
            r"(?:(?:[^,]*,)*gpu(?:,|$)|(?:[^,]*,)*ssd(?:,|$)){2}.*"
        );

        let m = c.compile().unwrap();
        assert!(m.matches("gpu,ssd"));
        assert!(m.matches("ssd,gpu"));
        assert!(m.matches("any,ssd,job,gpu"));
        assert!(m.matches("x-gpu,gpu,ssd"));
        assert!(!m.matches("gpu"));
        assert!(!m.matches("ssd,job"));
        // One element cannot satisfy two repetitions
        assert!(!m.matches("gpu,x-gpu"));
        assert!(!m.matches("gpu-ssd,gpu"));
    }

    #[test]
    fn test_like_alternation() {
        let term = DimensionTerm::like(
            Dimension::Job,
            vec![TagValue::exact("any"), TagValue::exact("job")],
        );
        let c = render(&[term]).remove(0);
        assert_eq!(c.attribute, "dice_tags");
        assert_eq!(c.pattern, r"(?:(?:[^,]*,)*any(?:,|$)|(?:[^,]*,)*job(?:,|$)).*");
        assert!(c.matches("job").unwrap());
        assert!(c.matches("platform,any").unwrap());
        assert!(c.matches("any,platform").unwrap());
        assert!(!c.matches("bigdata").unwrap());
        assert!(!c.matches("company,jobs").unwrap());
    }

    #[test]
    fn test_unlike_prefix() {
        let term = DimensionTerm::unlike(Dimension::Org, vec![TagValue::prefix("org-")]);
        let c = render(&[term]).remove(0);
        assert_eq!(c.pattern, r"(?:(?:[^,]*,)*org\-[^,]+(?:,|$)).*");
        assert!(c.matches("workspace-dev,job").unwrap());
        assert!(!c.matches("job,org-12").unwrap());
        assert!(!c.matches("org-12,job").unwrap());
        assert!(c.matches("org-,job").unwrap());
        assert!(c.matches("my-org-1").unwrap());
        assert_eq!(c.to_triple()[1], "UNLIKE");
    }

    #[test]
    fn test_exact_tag_matches_whole_elements_only() {
        let term = DimensionTerm::unlike(Dimension::Unlock, vec![TagValue::exact("locked")]);
        let c = render(&[term]).remove(0);
        assert!(c.matches("unlocked").unwrap());
        assert!(c.matches("gpu-locked").unwrap());
        assert!(c.matches("locked-gpu,any").unwrap());
        assert!(!c.matches("any,locked").unwrap());
        assert!(!c.matches("locked").unwrap());
    }

    #[test]
    fn test_compiled_matcher_reused_across_nodes() {
        let c = required(&["gpu", "ssd"]);
        let m = c.compile().unwrap();
        let nodes = [
            NodeLabelSnapshot::new("a", "a", ["gpu", "ssd"]),
            NodeLabelSnapshot::new("b", "b", ["gpu", "x-gpu"]),
            NodeLabelSnapshot::new("c", "c", ["ssd", "org-1", "gpu"]),
        ];
        let hits: Vec<bool> = nodes.iter().map(|n| m.matches_node(n)).collect();
        assert_eq!(hits, vec![true, false, true]);
        assert_eq!(hits[0], c.matches_node(&nodes[0]).unwrap());
    }

    #[test]
    fn test_host_pin_is_exact() {
        let term = DimensionTerm::like(
            Dimension::SpecificHost,
            vec![TagValue::exact("10.0.0.1"), TagValue::exact("10.0.0.2")],
        );
        let c = render(&[term]).remove(0);
        assert_eq!(c.attribute, "hostname");
        assert!(c.matches("10.0.0.2").unwrap());
        assert!(!c.matches("10.0.0.12").unwrap());
        assert!(!c.matches("10a0.0.1").unwrap());
    }

    #[test]
    fn test_renderers_agree_on_nodes() {
        let spec = PolicySpec {
            workspace: Pin::Pinned(vec![Workspace::Dev]),
            is_stateless: true,
            ..PolicySpec::new("web")
        };
        let constraint = ConstraintBuilder::compile(&spec, None, Backend::Marathon);
        let structured = constraint.structured();
        let regexes = constraint.regex();

        let nodes = [
            NodeLabelSnapshot::new("a", "a", ["workspace-dev", "stateless-service"]),
            NodeLabelSnapshot::new("b", "b", ["workspace-test", "stateless-service"]),
            NodeLabelSnapshot::new("c", "c", ["workspace-dev", "stateless-service", "org-1"]),
            NodeLabelSnapshot::new("d", "d", ["workspace-dev", "locked", "stateless-service"]),
            NodeLabelSnapshot::new("e", "e", ["workspace-dev", "gpu-locked", "stateless-service"]),
            NodeLabelSnapshot::new("f", "f", ["workspace-dev", "x-stateless-service"]),
            NodeLabelSnapshot::new("g", "g", ["workspace-dev-2", "stateless-service"]),
        ];

        let matchers: Vec<RegexMatcher> = regexes
            .iter()
            .map(RegexConstraint::compile)
            .collect::<Result<_>>()
            .unwrap();

        for node in &nodes {
            let by_regex = matchers.iter().all(|m| m.matches_node(node));
            assert_eq!(by_regex, structured.matches(node), "node {}", node.name());
        }
        assert!(structured.matches(&nodes[4]));
        assert!(!structured.matches(&nodes[5]));
        assert!(structured.matches(&nodes[0]));
        assert!(!structured.matches(&nodes[1]));
    }

    #[test]
    fn test_invalid_pattern() {
        let c = RegexConstraint {
            attribute: "dice_tags".to_string(),
            polarity: Polarity::Like,
            pattern: "(unclosed".to_string(),
        };
        assert!(matches!(
            c.matches("x"),
            Err(SchedulerError::InvalidRegex { .. })
        ));
    }
}
