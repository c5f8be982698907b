// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Scheduler error type
#[derive(Error, Debug, Diagnostic)]
pub enum SchedulerError {
    /// No node satisfies one or more services
    #[error("Unschedulable: no node satisfies {}", .services.join(", "))]
    #[diagnostic(
        code(polestar::scheduler::unschedulable),
        help("{explanation}")
    )]
    Unschedulable {
        services: Vec<String>,
        explanation: String,
    },

    /// A rendered pattern failed to compile
    #[error("Invalid constraint pattern '{pattern}': {message}")]
    #[diagnostic(
        code(polestar::scheduler::invalid_regex),
        help("Tag values are escaped during rendering; this pattern was built by hand or corrupted")
    )]
    InvalidRegex { pattern: String, message: String },

    /// Core error (e.g. a contradictory policy)
    #[error(transparent)]
    #[diagnostic(transparent)]
    CoreError(#[from] polestar_core::CoreError),
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    /// Create an Unschedulable error
    pub fn unschedulable(services: Vec<String>, explanation: impl Into<String>) -> Self {
        Self::Unschedulable {
            services,
            explanation: explanation.into(),
        }
    }

    /// Create an InvalidRegex error
    pub fn invalid_regex(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRegex {
            pattern: pattern.into(),
            message: message.into(),
        }
    }
}
