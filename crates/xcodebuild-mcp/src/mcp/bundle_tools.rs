use super::params::{object_schema, parse_params, require_existing_path};
use super::response::ToolOutput;
use super::server::{Tool, ToolContext, ToolSchema};
use crate::Result;
use crate::execution::ExecutionRequest;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;
use tracing::debug;

/// Info.plist location without the extension, as `defaults read` wants it.
/// macOS bundles keep it under `Contents/`.
pub fn info_plist_base(app_path: &str) -> String {
    let app = app_path.trim_end_matches('/');
    if Path::new(app).join("Contents").join("Info.plist").exists() {
        format!("{}/Contents/Info", app)
    } else {
        format!("{}/Info", app)
    }
}

#[derive(Debug, Deserialize)]
struct AppPathParams {
    app_path: String,
}

pub struct GetBundleIdTool {
    schema: ToolSchema,
}

impl GetBundleIdTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema {
                name: "get_bundle_id".to_string(),
                description: "Read CFBundleIdentifier from an iOS or macOS .app bundle".to_string(),
                parameters: object_schema(
                    &[json!({
                        "app_path": {"type": "string", "description": "Path to the .app bundle"}
                    })],
                    &["app_path"],
                ),
            },
        }
    }
}

impl Default for GetBundleIdTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for GetBundleIdTool {
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let params: AppPathParams = parse_params(params)?;
        require_existing_path(&params.app_path, "app_path")?;
        let plist = info_plist_base(&params.app_path);

        let defaults = ExecutionRequest::literal(
            "Read bundle id",
            ["defaults", "read", plist.as_str(), "CFBundleIdentifier"],
        );
        let mut result = ctx.run(&defaults).await;

        if !result.success {
            debug!("defaults read failed for {}, trying plutil", plist);
            let plist_file = format!("{}.plist", plist);
            let plutil = ExecutionRequest::literal(
                "Read bundle id",
                ["plutil", "-extract", "CFBundleIdentifier", "raw", plist_file.as_str()],
            );
            result = ctx.run(&plutil).await;
        }

        if !result.success {
            return Ok(ToolOutput::from_execution(
                "",
                &format!("Could not read the bundle id of {}", params.app_path),
                &result,
                ctx.max_output_chars(),
            ));
        }

        let bundle_id = result.output.trim();
        Ok(ToolOutput::text(format!("Bundle ID: {}", bundle_id)))
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
}

#[derive(Debug, Deserialize)]
struct LaunchMacAppParams {
    app_path: String,
    #[serde(default)]
    args: Vec<String>,
}

fn launch_mac_command(params: &LaunchMacAppParams) -> Vec<String> {
    let mut command = vec!["open".to_string(), params.app_path.clone()];
    if !params.args.is_empty() {
        command.push("--args".to_string());
        command.extend(params.args.iter().cloned());
    }
    command
}

pub struct LaunchMacAppTool {
    schema: ToolSchema,
}

impl LaunchMacAppTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema {
                name: "launch_mac_app".to_string(),
                description: "Launch a built macOS app".to_string(),
                parameters: object_schema(
                    &[json!({
                        "app_path": {"type": "string", "description": "Path to the .app bundle"},
                        "args": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Arguments passed to the app"
                        }
                    })],
                    &["app_path"],
                ),
            },
        }
    }
}

impl Default for LaunchMacAppTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for LaunchMacAppTool {
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let params: LaunchMacAppParams = parse_params(params)?;
        require_existing_path(&params.app_path, "app_path")?;

        let request = ExecutionRequest::literal("Launch macOS app", launch_mac_command(&params));
        let result = ctx.run(&request).await;
        Ok(ToolOutput::from_execution(
            &format!("Launched {}", params.app_path),
            &format!("Failed to launch {}", params.app_path),
            &result,
            ctx.max_output_chars(),
        ))
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
}
