//! Polestar Core - Shared types for the Polestar scheduling-policy engine
//!
//! This crate provides:
//! - The backend-neutral `PolicySpec` scheduling intent
//! - Closed enumerations (workspace, resource kind, backend)
//! - The node label vocabulary
//! - Resource quantity parsing and formatting
//! - Error types with miette diagnostics

pub mod error;
pub mod labels;
pub mod policy;
pub mod resources;
pub mod types;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use policy::{LocationSelector, Pin, PodLabelsForAffinity, PolicySpec};
pub use resources::ResourceQuantities;
pub use types::{Backend, ResourceKind, Workspace};

// Re-export k8s-openapi types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::{Namespace, Node, Pod};

use std::path::Path;

/// Serialize a value to pretty JSON
pub fn to_json_pretty<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| {
        CoreError::serialization_error(
            format!("Failed to serialize to JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a value from JSON
pub fn from_json<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| {
        CoreError::serialization_error(
            format!("Failed to deserialize from JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a value from YAML
pub fn from_yaml<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_yaml::from_str(data).map_err(|e| {
        CoreError::serialization_error(
            format!("Failed to deserialize from YAML: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Load a JSON or YAML file, chosen by extension (YAML otherwise)
pub fn load_file<T: for<'de> serde::Deserialize<'de>>(path: &Path) -> Result<T> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        CoreError::serialization_error(
            format!("Failed to read {}: {}", path.display(), e),
            Some(Box::new(e)),
        )
    })?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => from_json(&data),
        _ => from_yaml(&data),
    }
}
