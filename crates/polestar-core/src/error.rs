// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for Polestar operations
#[derive(Error, Debug, Diagnostic)]
pub enum CoreError {
    /// Policy is contradictory or malformed
    #[error("Invalid scheduling policy for {service}: {reason}")]
    #[diagnostic(
        code(polestar::invalid_policy),
        help("Pin the dimension to at least one value, or leave it absent so nodes carrying that label family are avoided")
    )]
    InvalidPolicy {
        #[allow(unused)]
        service: String,
        #[allow(unused)]
        reason: String,
    },

    /// Quantity string could not be parsed
    #[error("Invalid {resource} quantity '{value}': {reason}")]
    #[diagnostic(
        code(polestar::invalid_quantity),
        help("Use Kubernetes quantity notation, e.g. '500m' or '0.5' for CPU and '128Mi' or '1Gi' for memory")
    )]
    InvalidQuantity {
        #[allow(unused)]
        resource: String,
        #[allow(unused)]
        value: String,
        #[allow(unused)]
        reason: String,
    },

    /// Unknown value for a closed enumeration
    #[error("Unknown {kind}: '{value}'")]
    #[diagnostic(code(polestar::unknown_value), help("Expected one of: {expected}"))]
    UnknownValue {
        #[allow(unused)]
        kind: String,
        #[allow(unused)]
        value: String,
        #[allow(unused)]
        expected: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(polestar::serialization_error),
        help("Ensure the input is valid JSON or YAML")
    )]
    SerializationError {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type alias for Polestar core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create an InvalidPolicy error
    pub fn invalid_policy(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPolicy {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidQuantity error
    pub fn invalid_quantity(
        resource: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidQuantity {
            resource: resource.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create an UnknownValue error
    pub fn unknown_value(
        kind: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::UnknownValue {
            kind: kind.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CoreError::invalid_policy("web", "workspace pinned to an empty set");
        assert!(matches!(err, CoreError::InvalidPolicy { .. }));
        assert!(err.to_string().contains("web"));

        let err = CoreError::invalid_quantity("cpu", "abc", "not a number");
        assert!(matches!(err, CoreError::InvalidQuantity { .. }));
        assert!(err.to_string().contains("'abc'"));
    }
}
