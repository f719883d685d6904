// Serialization utilities for project persistence and agent payloads

use crate::project::types::*;
use crate::project::ProjectError;
use ron::ser::PrettyConfig;

/// Serialize project state to RON format
pub fn serialize_to_ron(project: &Project) -> Result<String, ProjectError> {
    ron::ser::to_string_pretty(project, PrettyConfig::default()).map_err(|e| {
        ProjectError::SerializationError(format!("Failed to serialize to RON: {}", e))
    })
}

/// Deserialize project state from RON format
pub fn deserialize_from_ron(ron_data: &str) -> Result<Project, ProjectError> {
    ron::from_str(ron_data).map_err(|e| {
        ProjectError::SerializationError(format!("Failed to deserialize from RON: {}", e))
    })
}

/// Serialize project metadata to JSON format
pub fn serialize_metadata_to_json(metadata: &ProjectMetadata) -> Result<String, ProjectError> {
    serde_json::to_string_pretty(metadata).map_err(|e| {
        ProjectError::SerializationError(format!("Failed to serialize metadata to JSON: {}", e))
    })
}

/// Deserialize project metadata from JSON format
pub fn deserialize_metadata_from_json(json_data: &str) -> Result<ProjectMetadata, ProjectError> {
    serde_json::from_str(json_data).map_err(|e| {
        ProjectError::SerializationError(format!(
            "Failed to deserialize metadata from JSON: {}",
            e
        ))
    })
}

/// Whole project as JSON, for tools that do not speak RON
pub fn project_to_json(project: &Project) -> Result<String, ProjectError> {
    Ok(serde_json::to_string_pretty(project)?)
}

pub fn project_from_json(json_data: &str) -> Result<Project, ProjectError> {
    Ok(serde_json::from_str(json_data)?)
}

/// Parse an addition set proposed by an external agent.
/// Note fields outside MIDI range are clamped while parsing.
pub fn additions_from_json(json_data: &str) -> Result<ProjectAdditions, ProjectError> {
    serde_json::from_str(json_data).map_err(|e| {
        ProjectError::SerializationError(format!("Invalid project additions: {}", e))
    })
}
