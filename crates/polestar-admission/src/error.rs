// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Admission error type for grant shaping and quota checks
#[derive(Error, Debug, Diagnostic)]
pub enum AdmissionError {
    /// Resource ask below the floor or malformed
    #[error("Invalid {resource} ask {value}: {reason}")]
    #[diagnostic(
        code(polestar::admission::invalid_ask),
        help("Ask for at least 0.1 CPU and 10 MiB of memory, and keep any max at or above the ask")
    )]
    InvalidAsk {
        #[allow(unused)]
        resource: String,
        #[allow(unused)]
        value: String,
        #[allow(unused)]
        reason: String,
    },

    /// Admission option could not be interpreted
    #[error("Invalid admission option {key}='{value}': {reason}")]
    #[diagnostic(
        code(polestar::admission::invalid_config),
        help("Ratios are decimal numbers >= 1.0; CPU_NUM_QUOTA is -1 (auto), 0 (unlimited) or a positive ceiling")
    )]
    InvalidConfig {
        #[allow(unused)]
        key: String,
        #[allow(unused)]
        value: String,
        #[allow(unused)]
        reason: String,
    },

    /// Workspace quota would be exceeded
    #[error("Quota exceeded for project {project} workspace {workspace}: {message}")]
    #[diagnostic(
        code(polestar::admission::quota_exceeded),
        help("Release resources in the workspace, shrink the ask, or raise the workspace quota")
    )]
    QuotaExceeded {
        #[allow(unused)]
        project: String,
        #[allow(unused)]
        workspace: String,
        #[allow(unused)]
        message: String,
    },

    /// External capability failed
    #[error("{source_name} failed: {message}")]
    #[diagnostic(
        code(polestar::admission::source_error),
        help("The usage, quota or node source is unavailable; retry the admission once it recovers")
    )]
    SourceError {
        #[allow(unused)]
        source_name: String,
        #[allow(unused)]
        message: String,
    },

    /// Core error
    #[error(transparent)]
    #[diagnostic(transparent)]
    CoreError(#[from] polestar_core::CoreError),
}

/// Result type alias for admission operations
pub type Result<T> = std::result::Result<T, AdmissionError>;

impl AdmissionError {
    /// Create an InvalidAsk error
    pub fn invalid_ask(
        resource: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidAsk {
            resource: resource.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidConfig error
    pub fn invalid_config(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a QuotaExceeded error
    pub fn quota_exceeded(
        project: impl Into<String>,
        workspace: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::QuotaExceeded {
            project: project.into(),
            workspace: workspace.into(),
            message: message.into(),
        }
    }

    /// Create a SourceError
    pub fn source_error(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceError {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}
