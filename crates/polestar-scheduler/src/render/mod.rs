//! Backend renderers over the neutral `Constraint` terms.
//!
//! Each renderer is a pure mapping from dimension terms to one backend's
//! constraint language.

pub mod regex;
pub mod structured;

pub use self::regex::{RegexConstraint, RegexMatcher};
pub use self::structured::{AffinityExpression, StructuredConstraint, TermGroup};
