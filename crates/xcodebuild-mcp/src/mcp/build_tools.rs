//! xcodebuild-backed tools: build, clean, settings, schemes and app paths.

use super::params::{
    DestinationArgs, ProjectArgs, default_configuration, object_schema, parse_params,
};
use super::response::{ToolOutput, truncate};
use super::server::{Tool, ToolContext, ToolSchema};
use crate::destination::Platform;
use crate::execution::ExecutionRequest;
use crate::{Result, XcodeError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

static BUILD_SETTING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*) = (.*)$").expect("valid build setting regex")
});

/// Parses `KEY = value` lines from `-showBuildSettings` output.
/// When several targets are listed the first value of each key wins.
pub fn parse_build_settings(output: &str) -> BTreeMap<String, String> {
    let mut settings = BTreeMap::new();
    for line in output.lines() {
        if let Some(caps) = BUILD_SETTING.captures(line) {
            settings
                .entry(caps[1].to_string())
                .or_insert_with(|| caps[2].trim().to_string());
        }
    }
    settings
}

/// Scheme names from `xcodebuild -list` output.
pub fn parse_schemes(output: &str) -> Vec<String> {
    let mut schemes = Vec::new();
    for line in output.lines().skip_while(|line| line.trim() != "Schemes:").skip(1) {
        let name = line.trim();
        if name.is_empty() || name.ends_with(':') {
            break;
        }
        schemes.push(name.to_string());
    }
    schemes
}

#[derive(Debug, Deserialize)]
struct BuildParams {
    #[serde(flatten)]
    project: ProjectArgs,
    #[serde(flatten)]
    destination: DestinationArgs,
    scheme: String,
    #[serde(default = "default_configuration")]
    configuration: String,
    derived_data_path: Option<String>,
    #[serde(default)]
    extra_args: Vec<String>,
}

fn build_command(params: &BuildParams) -> Result<Vec<String>> {
    if params.scheme.trim().is_empty() {
        return Err(XcodeError::Validation("scheme is required".to_string()));
    }
    let destination = params.destination.resolve()?;

    let mut command = vec!["xcodebuild".to_string()];
    command.extend(params.project.to_args()?);
    command.extend([
        "-scheme".to_string(),
        params.scheme.clone(),
        "-configuration".to_string(),
        params.configuration.clone(),
        "-skipMacroValidation".to_string(),
        "-destination".to_string(),
        destination.into_string(),
    ]);
    if let Some(path) = params.derived_data_path.as_deref().filter(|p| !p.trim().is_empty()) {
        command.extend(["-derivedDataPath".to_string(), path.to_string()]);
    }
    command.extend(params.extra_args.iter().cloned());
    command.push("build".to_string());
    Ok(command)
}

pub struct BuildTool {
    schema: ToolSchema,
}

impl BuildTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema {
                name: "build".to_string(),
                description: "Build an Xcode scheme for macOS, a device platform, or a simulator. \
                    Simulator platforms need simulator_id or simulator_name."
                    .to_string(),
                parameters: object_schema(
                    &[
                        ProjectArgs::schema_properties(),
                        DestinationArgs::schema_properties(),
                        json!({
                            "scheme": {"type": "string", "description": "Scheme to build"},
                            "configuration": {
                                "type": "string",
                                "default": "Debug",
                                "description": "Build configuration"
                            },
                            "derived_data_path": {
                                "type": "string",
                                "description": "Custom DerivedData location"
                            },
                            "extra_args": {
                                "type": "array",
                                "items": {"type": "string"},
                                "description": "Additional xcodebuild arguments"
                            }
                        }),
                    ],
                    &["scheme", "platform"],
                ),
            },
        }
    }
}

impl Default for BuildTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for BuildTool {
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let params: BuildParams = parse_params(params)?;
        let command = build_command(&params)?;

        let label = format!("Build {} ({})", params.scheme, params.destination.platform);
        let request = ExecutionRequest::literal(label, command).with_pretty_output();
        let result = ctx.run(&request).await;

        let output = ToolOutput::from_execution(
            &format!(
                "Build succeeded for scheme {} on {}",
                params.scheme, params.destination.platform
            ),
            &format!("Build failed for scheme {}", params.scheme),
            &result,
            ctx.max_output_chars(),
        );
        if result.success {
            Ok(output.with_text("Next: call get_app_path with the same arguments to locate the built product."))
        } else {
            Ok(output)
        }
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
}

#[derive(Debug, Deserialize)]
struct CleanParams {
    #[serde(flatten)]
    project: ProjectArgs,
    scheme: Option<String>,
    #[serde(default = "default_configuration")]
    configuration: String,
}

fn clean_command(params: &CleanParams) -> Result<Vec<String>> {
    let scheme = params.scheme.as_deref().map(str::trim).filter(|s| !s.is_empty());
    if params.project.is_workspace() && scheme.is_none() {
        return Err(XcodeError::Validation(
            "scheme is required when cleaning a workspace".to_string(),
        ));
    }

    let mut command = vec!["xcodebuild".to_string()];
    command.extend(params.project.to_args()?);
    if let Some(scheme) = scheme {
        command.extend(["-scheme".to_string(), scheme.to_string()]);
    }
    command.extend([
        "-configuration".to_string(),
        params.configuration.clone(),
        "clean".to_string(),
    ]);
    Ok(command)
}

pub struct CleanTool {
    schema: ToolSchema,
}

impl CleanTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema {
                name: "clean".to_string(),
                description: "Clean build products for a project or workspace".to_string(),
                parameters: object_schema(
                    &[
                        ProjectArgs::schema_properties(),
                        json!({
                            "scheme": {
                                "type": "string",
                                "description": "Scheme to clean (required for workspaces)"
                            },
                            "configuration": {"type": "string", "default": "Debug"}
                        }),
                    ],
                    &[],
                ),
            },
        }
    }
}

impl Default for CleanTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CleanTool {
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let params: CleanParams = parse_params(params)?;
        let command = clean_command(&params)?;

        let request = ExecutionRequest::literal("Clean", command).with_pretty_output();
        let result = ctx.run(&request).await;

        Ok(ToolOutput::from_execution(
            "Clean succeeded",
            "Clean failed",
            &result,
            ctx.max_output_chars(),
        ))
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
}

#[derive(Debug, Deserialize)]
struct ShowBuildSettingsParams {
    #[serde(flatten)]
    project: ProjectArgs,
    scheme: String,
    configuration: Option<String>,
}

pub struct ShowBuildSettingsTool {
    schema: ToolSchema,
}

impl ShowBuildSettingsTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema {
                name: "show_build_settings".to_string(),
                description: "Show the resolved build settings of a scheme".to_string(),
                parameters: object_schema(
                    &[
                        ProjectArgs::schema_properties(),
                        json!({
                            "scheme": {"type": "string", "description": "Scheme to inspect"},
                            "configuration": {"type": "string", "description": "Optional build configuration"}
                        }),
                    ],
                    &["scheme"],
                ),
            },
        }
    }
}

impl Default for ShowBuildSettingsTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ShowBuildSettingsTool {
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let params: ShowBuildSettingsParams = parse_params(params)?;

        let mut command = vec!["xcodebuild".to_string()];
        command.extend(params.project.to_args()?);
        command.extend(["-scheme".to_string(), params.scheme.clone()]);
        if let Some(configuration) = &params.configuration {
            command.extend(["-configuration".to_string(), configuration.clone()]);
        }
        command.push("-showBuildSettings".to_string());

        let result = ctx.run(&ExecutionRequest::literal("Show build settings", command)).await;
        if !result.success {
            return Ok(ToolOutput::from_execution(
                "",
                &format!("Failed to read build settings for scheme {}", params.scheme),
                &result,
                ctx.max_output_chars(),
            ));
        }

        let settings = parse_build_settings(&result.output);
        Ok(ToolOutput::text(format!(
            "Build settings for scheme {} ({} settings)",
            params.scheme,
            settings.len()
        ))
        .with_text(truncate(&result.output, ctx.max_output_chars()))
        .with_text(truncate(
            &serde_json::to_string_pretty(&settings)?,
            ctx.max_output_chars(),
        )))
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
}

#[derive(Debug, Deserialize)]
struct ListSchemesParams {
    #[serde(flatten)]
    project: ProjectArgs,
}

pub struct ListSchemesTool {
    schema: ToolSchema,
}

impl ListSchemesTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema {
                name: "list_schemes".to_string(),
                description: "List the schemes of a project or workspace".to_string(),
                parameters: object_schema(&[ProjectArgs::schema_properties()], &[]),
            },
        }
    }
}

impl Default for ListSchemesTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ListSchemesTool {
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let params: ListSchemesParams = parse_params(params)?;

        let mut command = vec!["xcodebuild".to_string(), "-list".to_string()];
        command.extend(params.project.to_args()?);

        let result = ctx.run(&ExecutionRequest::literal("List schemes", command)).await;
        if !result.success {
            return Ok(ToolOutput::from_execution(
                "",
                "Failed to list schemes",
                &result,
                ctx.max_output_chars(),
            ));
        }

        let schemes = parse_schemes(&result.output);
        if schemes.is_empty() {
            return Ok(ToolOutput::text("No schemes found").with_text(truncate(
                &result.output,
                ctx.max_output_chars(),
            )));
        }

        let listing = schemes
            .iter()
            .map(|s| format!("- {}", s))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ToolOutput::text(format!("Available schemes:\n{}", listing)))
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
}

#[derive(Debug, Deserialize)]
struct GetAppPathParams {
    #[serde(flatten)]
    project: ProjectArgs,
    #[serde(flatten)]
    destination: DestinationArgs,
    scheme: String,
    #[serde(default = "default_configuration")]
    configuration: String,
}

pub struct GetAppPathTool {
    schema: ToolSchema,
}

impl GetAppPathTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema {
                name: "get_app_path".to_string(),
                description: "Locate the built app bundle for a scheme and destination".to_string(),
                parameters: object_schema(
                    &[
                        ProjectArgs::schema_properties(),
                        DestinationArgs::schema_properties(),
                        json!({
                            "scheme": {"type": "string"},
                            "configuration": {"type": "string", "default": "Debug"}
                        }),
                    ],
                    &["scheme", "platform"],
                ),
            },
        }
    }
}

impl Default for GetAppPathTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for GetAppPathTool {
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let params: GetAppPathParams = parse_params(params)?;
        let destination = params.destination.resolve()?;

        let mut command = vec!["xcodebuild".to_string()];
        command.extend(params.project.to_args()?);
        command.extend([
            "-scheme".to_string(),
            params.scheme.clone(),
            "-configuration".to_string(),
            params.configuration.clone(),
            "-showBuildSettings".to_string(),
            "-destination".to_string(),
            destination.into_string(),
        ]);

        let result = ctx.run(&ExecutionRequest::literal("Get app path", command)).await;
        if !result.success {
            return Ok(ToolOutput::from_execution(
                "",
                "Failed to read build settings",
                &result,
                ctx.max_output_chars(),
            ));
        }

        let settings = parse_build_settings(&result.output);
        let (Some(dir), Some(product)) = (
            settings.get("BUILT_PRODUCTS_DIR"),
            settings.get("FULL_PRODUCT_NAME"),
        ) else {
            return Ok(ToolOutput::error(
                "Could not determine the app path: BUILT_PRODUCTS_DIR or FULL_PRODUCT_NAME missing from build settings",
            ));
        };

        let app_path = format!("{}/{}", dir, product);
        let next_steps = match params.destination.platform {
            Platform::MacOs => "Next: get_bundle_id, then launch_mac_app with this path.",
            p if p.is_simulator() => {
                "Next: get_bundle_id, boot_simulator, install_app_simulator, then launch_app_simulator."
            }
            _ => "Next: get_bundle_id to read the bundle identifier.",
        };
        Ok(ToolOutput::text(format!("App path: {}", app_path)).with_text(next_steps))
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS: &str = "Build settings for action build and target App:
    ACTION = build
    BUILT_PRODUCTS_DIR = /Users/dev/DerivedData/App/Build/Products/Debug-iphonesimulator
    FULL_PRODUCT_NAME = App.app
    PRODUCT_BUNDLE_IDENTIFIER = com.example.App

Build settings for action build and target AppTests:
    FULL_PRODUCT_NAME = AppTests.xctest
";

    const LIST: &str = r#"Information about project "App":
    Targets:
        App
        AppTests

    Build Configurations:
        Debug
        Release

    If no build configuration is specified and -scheme is not passed then "Release" is used.

    Schemes:
        App
        App Widgets
"#;

    #[test]
    fn test_parse_build_settings_first_target_wins() {
        let settings = parse_build_settings(SETTINGS);
        assert_eq!(settings["FULL_PRODUCT_NAME"], "App.app");
        assert_eq!(settings["PRODUCT_BUNDLE_IDENTIFIER"], "com.example.App");
        assert_eq!(settings.len(), 4);
    }

    #[test]
    fn test_parse_schemes() {
        assert_eq!(parse_schemes(LIST), vec!["App", "App Widgets"]);
        assert!(parse_schemes("Information about workspace \"W\":\n").is_empty());
    }

    #[test]
    fn test_build_command_for_named_simulator() {
        let params: BuildParams = parse_params(json!({
            "workspace_path": "/src/App.xcworkspace",
            "scheme": "App",
            "platform": "iOS Simulator",
            "simulator_name": "iPhone 16",
            "derived_data_path": "/tmp/dd",
            "extra_args": ["-quiet"]
        }))
        .unwrap();

        assert_eq!(
            build_command(&params).unwrap(),
            vec![
                "xcodebuild",
                "-workspace",
                "/src/App.xcworkspace",
                "-scheme",
                "App",
                "-configuration",
                "Debug",
                "-skipMacroValidation",
                "-destination",
                "platform=iOS Simulator,name=iPhone 16,OS=latest",
                "-derivedDataPath",
                "/tmp/dd",
                "-quiet",
                "build",
            ]
        );
    }

    #[test]
    fn test_build_command_requires_simulator_identity() {
        let params: BuildParams = parse_params(json!({
            "project_path": "/src/App.xcodeproj",
            "scheme": "App",
            "platform": "iOS Simulator"
        }))
        .unwrap();
        assert!(matches!(build_command(&params), Err(XcodeError::InvalidTarget(_))));
    }

    #[test]
    fn test_clean_workspace_requires_scheme() {
        let params: CleanParams =
            parse_params(json!({"workspace_path": "/src/App.xcworkspace"})).unwrap();
        assert!(matches!(clean_command(&params), Err(XcodeError::Validation(_))));

        let params: CleanParams =
            parse_params(json!({"project_path": "/src/App.xcodeproj", "configuration": "Release"}))
                .unwrap();
        assert_eq!(
            clean_command(&params).unwrap(),
            vec!["xcodebuild", "-project", "/src/App.xcodeproj", "-configuration", "Release", "clean"]
        );
    }
}
