//! Decoding tool arguments into typed parameter structs.

use crate::destination::{Destination, Platform, resolve_destination};
use crate::{Result, XcodeError};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::path::Path;

pub fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    // Clients sometimes send `null` for tools without arguments
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(|e| XcodeError::Validation(e.to_string()))
}

pub fn default_configuration() -> String {
    "Debug".to_string()
}

pub fn default_true() -> bool {
    true
}

/// Exactly one of a workspace or a project.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectArgs {
    pub workspace_path: Option<String>,
    pub project_path: Option<String>,
}

impl ProjectArgs {
    pub fn to_args(&self) -> Result<Vec<String>> {
        match (non_empty(&self.workspace_path), non_empty(&self.project_path)) {
            (Some(workspace), None) => Ok(vec!["-workspace".to_string(), workspace.to_string()]),
            (None, Some(project)) => Ok(vec!["-project".to_string(), project.to_string()]),
            (Some(_), Some(_)) => Err(XcodeError::Validation(
                "workspace_path and project_path are mutually exclusive".to_string(),
            )),
            (None, None) => Err(XcodeError::Validation(
                "either workspace_path or project_path is required".to_string(),
            )),
        }
    }

    pub fn is_workspace(&self) -> bool {
        non_empty(&self.workspace_path).is_some()
    }

    pub fn schema_properties() -> Value {
        json!({
            "workspace_path": {
                "type": "string",
                "description": "Path to the .xcworkspace file (mutually exclusive with project_path)"
            },
            "project_path": {
                "type": "string",
                "description": "Path to the .xcodeproj file (mutually exclusive with workspace_path)"
            }
        })
    }
}

/// Where a build should run, as the caller describes it.
#[derive(Debug, Clone, Deserialize)]
pub struct DestinationArgs {
    pub platform: Platform,
    pub simulator_name: Option<String>,
    pub simulator_id: Option<String>,
    #[serde(default = "default_true")]
    pub use_latest_os: bool,
    /// `arm64`, `x86_64`, or `universal` for both Mac architectures
    pub arch: Option<String>,
}

impl DestinationArgs {
    pub fn resolve(&self) -> Result<Destination> {
        if self.platform == Platform::MacOs
            && self.arch.as_deref().map(str::trim) == Some("universal")
        {
            return Ok(Destination::macos_universal());
        }
        Ok(resolve_destination(
            self.platform,
            self.simulator_name.as_deref(),
            self.simulator_id.as_deref(),
            self.use_latest_os,
            self.arch.as_deref(),
        )?)
    }

    pub fn schema_properties() -> Value {
        let platforms: Vec<&str> = Platform::ALL.iter().map(|p| p.as_str()).collect();
        json!({
            "platform": {
                "type": "string",
                "enum": platforms,
                "description": "Target platform"
            },
            "simulator_name": {
                "type": "string",
                "description": "Simulator name, e.g. 'iPhone 16' (simulator platforms only)"
            },
            "simulator_id": {
                "type": "string",
                "description": "Simulator UDID; takes precedence over simulator_name"
            },
            "use_latest_os": {
                "type": "boolean",
                "default": true,
                "description": "Append OS=latest when selecting a simulator by name"
            },
            "arch": {
                "type": "string",
                "enum": ["arm64", "x86_64", "universal"],
                "description": "Mac architecture (macOS only)"
            }
        })
    }
}

/// Merges several `properties` objects into one tool input schema.
pub fn object_schema(property_sets: &[Value], required: &[&str]) -> Value {
    let mut properties = serde_json::Map::new();
    for set in property_sets {
        if let Some(map) = set.as_object() {
            properties.extend(map.clone());
        }
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

pub fn require_existing_path(path: &str, what: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(XcodeError::Validation(format!("{} is required", what)));
    }
    if !Path::new(path).exists() {
        return Err(XcodeError::Validation(format!("{} does not exist: {}", what, path)));
    }
    Ok(())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
