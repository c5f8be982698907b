//! Polestar Scheduler - Placement constraints and feasibility prechecks
//!
//! This crate provides:
//! - The backend-neutral constraint compiler (`ConstraintBuilder`)
//! - Structured (affinity) and regex renderers
//! - Filter predicates over node label snapshots
//! - The OR-of-AND feasibility precheck

pub mod builder;
pub mod constraint;
pub mod error;
pub mod filter;
pub mod precheck;
pub mod render;
pub mod types;

// Re-export commonly used types
pub use builder::ConstraintBuilder;
pub use constraint::{Combinator, Constraint, Dimension, DimensionTerm, Polarity, Rendered, TagValue};
pub use error::{Result, SchedulerError};
pub use precheck::{PrecheckEngine, PrecheckReport, PrecheckStatus, ServicePrecheck};
pub use render::{RegexConstraint, RegexMatcher, StructuredConstraint};
pub use types::{FilterResult, NodeLabelSnapshot};
