use super::params::object_schema;
use super::response::ToolOutput;
use super::server::{Tool, ToolContext, ToolSchema};
use super::xcode_version::XcodeVersion;
use crate::Result;
use crate::execution::ExecutionRequest;
use async_trait::async_trait;
use serde_json::{Value, json};

pub struct XcodeInfoTool {
    schema: ToolSchema,
}

impl XcodeInfoTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema {
                name: "xcode_info".to_string(),
                description: "Report the installed Xcode version and build".to_string(),
                parameters: object_schema(&[], &[]),
            },
        }
    }
}

#[async_trait]
impl Tool for XcodeInfoTool {
    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let request = ExecutionRequest::new("Xcode version", ["xcodebuild", "-version"]);
        let result = ctx.run(&request).await;
        if !result.success {
            return Ok(ToolOutput::from_execution(
                "",
                "Failed to detect Xcode; ensure Xcode is installed and xcode-select points at it",
                &result,
                ctx.max_output_chars(),
            ));
        }

        let Some(version) = XcodeVersion::parse(&result.output) else {
            return Ok(ToolOutput::error(format!(
                "Could not parse the Xcode version from: {}",
                result.output
            )));
        };

        let mut info = json!({
            "xcode_version": {
                "major": version.major,
                "minor": version.minor,
                "patch": version.patch,
                "display": version.to_string()
            },
            "features": {
                "skip_macro_validation": version.supports_skip_macro_validation(),
                "visionos": version.supports_visionos()
            }
        });
        if let Some(build) = XcodeVersion::parse_build(&result.output) {
            info["build"] = json!(build);
        }
        if !version.supports_skip_macro_validation() {
            info["warnings"] =
                json!(["Xcode 15 or later is required for the build tool's -skipMacroValidation flag."]);
        }

        ToolOutput::json(&info)
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
}

impl Default for XcodeInfoTool {
    fn default() -> Self {
        Self::new()
    }
}
