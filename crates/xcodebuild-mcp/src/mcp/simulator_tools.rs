use super::params::{object_schema, parse_params, require_existing_path};
use super::response::ToolOutput;
use super::server::{Tool, ToolContext, ToolSchema};
use crate::execution::{ExecutionRequest, ExecutionResult};
use crate::{Result, XcodeError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

const RUNTIME_PREFIX: &str = "com.apple.CoreSimulator.SimRuntime.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorDevice {
    pub udid: String,
    pub name: String,
    pub state: String,
    pub runtime: String,
    pub is_available: bool,
}

impl SimulatorDevice {
    pub fn is_booted(&self) -> bool {
        self.state == "Booted"
    }
}

/// "com.apple.CoreSimulator.SimRuntime.iOS-18-0" -> "iOS 18.0"
pub fn runtime_display_name(identifier: &str) -> String {
    let short = identifier.strip_prefix(RUNTIME_PREFIX).unwrap_or(identifier);
    match short.split_once('-') {
        Some((os, version)) => format!("{} {}", os, version.replace('-', ".")),
        None => short.to_string(),
    }
}

/// Parses `xcrun simctl list devices --json`, keeping available devices only.
pub fn parse_simctl_devices(json_str: &str) -> Result<Vec<SimulatorDevice>> {
    let data: Value = serde_json::from_str(json_str)
        .map_err(|e| XcodeError::Execution(format!("Failed to parse device list: {}", e)))?;

    let mut devices = Vec::new();
    if let Some(devices_by_runtime) = data.get("devices").and_then(|d| d.as_object()) {
        for (runtime, entries) in devices_by_runtime {
            for device in entries.as_array().into_iter().flatten() {
                let Some(udid) = device.get("udid").and_then(|u| u.as_str()) else {
                    continue;
                };
                let is_available = device
                    .get("isAvailable")
                    .and_then(|a| a.as_bool())
                    .unwrap_or(false);
                if !is_available {
                    continue;
                }
                devices.push(SimulatorDevice {
                    udid: udid.to_string(),
                    name: device
                        .get("name")
                        .and_then(|n| n.as_str())
                        .unwrap_or("Unknown")
                        .to_string(),
                    state: device
                        .get("state")
                        .and_then(|s| s.as_str())
                        .unwrap_or("Unknown")
                        .to_string(),
                    runtime: runtime_display_name(runtime),
                    is_available,
                });
            }
        }
    }

    Ok(devices)
}

fn format_device_list(devices: &[SimulatorDevice]) -> String {
    let mut by_runtime: BTreeMap<&str, Vec<&SimulatorDevice>> = BTreeMap::new();
    for device in devices {
        by_runtime.entry(device.runtime.as_str()).or_default().push(device);
    }

    let mut text = String::from("Available simulators:\n");
    for (runtime, devices) in by_runtime {
        text.push_str(&format!("\n{}:\n", runtime));
        for device in devices {
            let booted = if device.is_booted() { " [Booted]" } else { "" };
            text.push_str(&format!("- {} ({}){}\n", device.name, device.udid, booted));
        }
    }
    text
}

pub struct ListSimulatorsTool {
    schema: ToolSchema,
}

impl ListSimulatorsTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema {
                name: "list_simulators".to_string(),
                description: "List available simulators grouped by runtime".to_string(),
                parameters: object_schema(&[], &[]),
            },
        }
    }
}

impl Default for ListSimulatorsTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ListSimulatorsTool {
    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let request = ExecutionRequest::literal(
            "List simulators",
            ["xcrun", "simctl", "list", "devices", "available", "--json"],
        );
        let result = ctx.run(&request).await;
        if !result.success {
            return Ok(ToolOutput::from_execution(
                "",
                "Failed to list simulators",
                &result,
                ctx.max_output_chars(),
            ));
        }

        let devices = parse_simctl_devices(&result.output)?;
        if devices.is_empty() {
            return Ok(ToolOutput::text("No available simulators found"));
        }
        Ok(ToolOutput::text(format_device_list(&devices))
            .with_text("Next: boot_simulator with a UDID from this list."))
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
}

#[derive(Debug, Deserialize)]
struct SimulatorParams {
    simulator_uuid: String,
}

fn simulator_uuid_schema() -> Value {
    json!({
        "simulator_uuid": {
            "type": "string",
            "description": "Simulator UDID from list_simulators"
        }
    })
}

fn require_uuid(uuid: &str) -> Result<&str> {
    let uuid = uuid.trim();
    if uuid.is_empty() {
        return Err(XcodeError::Validation("simulator_uuid is required".to_string()));
    }
    Ok(uuid)
}

/// simctl reports booting an already booted device as an error.
fn already_booted(result: &ExecutionResult) -> bool {
    !result.success
        && result
            .error
            .as_deref()
            .is_some_and(|e| e.contains("current state: Booted"))
}

pub struct BootSimulatorTool {
    schema: ToolSchema,
}

impl BootSimulatorTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema {
                name: "boot_simulator".to_string(),
                description: "Boot a simulator by UDID".to_string(),
                parameters: object_schema(&[simulator_uuid_schema()], &["simulator_uuid"]),
            },
        }
    }
}

impl Default for BootSimulatorTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for BootSimulatorTool {
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let params: SimulatorParams = parse_params(params)?;
        let uuid = require_uuid(&params.simulator_uuid)?;

        let request = ExecutionRequest::literal("Boot simulator", ["xcrun", "simctl", "boot", uuid]);
        let result = ctx.run(&request).await;
        if already_booted(&result) {
            return Ok(ToolOutput::text(format!("Simulator {} is already booted", uuid)));
        }

        Ok(ToolOutput::from_execution(
            &format!("Simulator {} booted", uuid),
            &format!("Failed to boot simulator {}", uuid),
            &result,
            ctx.max_output_chars(),
        )
        .with_text(if result.success {
            "Next: open_simulator to show it, then install_app_simulator."
        } else {
            ""
        }))
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
}

pub struct OpenSimulatorTool {
    schema: ToolSchema,
}

impl OpenSimulatorTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema {
                name: "open_simulator".to_string(),
                description: "Bring the Simulator app to the foreground".to_string(),
                parameters: object_schema(&[], &[]),
            },
        }
    }
}

impl Default for OpenSimulatorTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for OpenSimulatorTool {
    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let request = ExecutionRequest::new("Open Simulator", ["open", "-a", "Simulator"]);
        let result = ctx.run(&request).await;
        Ok(ToolOutput::from_execution(
            "Simulator app opened",
            "Failed to open the Simulator app",
            &result,
            ctx.max_output_chars(),
        ))
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
}

#[derive(Debug, Deserialize)]
struct InstallParams {
    simulator_uuid: String,
    app_path: String,
}

pub struct InstallAppSimulatorTool {
    schema: ToolSchema,
}

impl InstallAppSimulatorTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema {
                name: "install_app_simulator".to_string(),
                description: "Install a built .app bundle on a booted simulator".to_string(),
                parameters: object_schema(
                    &[
                        simulator_uuid_schema(),
                        json!({
                            "app_path": {
                                "type": "string",
                                "description": "Path to the .app bundle (see get_app_path)"
                            }
                        }),
                    ],
                    &["simulator_uuid", "app_path"],
                ),
            },
        }
    }
}

impl Default for InstallAppSimulatorTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for InstallAppSimulatorTool {
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let params: InstallParams = parse_params(params)?;
        let uuid = require_uuid(&params.simulator_uuid)?;
        require_existing_path(&params.app_path, "app_path")?;

        let request = ExecutionRequest::literal(
            "Install app",
            ["xcrun", "simctl", "install", uuid, params.app_path.as_str()],
        );
        let result = ctx.run(&request).await;
        Ok(ToolOutput::from_execution(
            &format!("Installed {} on simulator {}", params.app_path, uuid),
            &format!("Failed to install {}", params.app_path),
            &result,
            ctx.max_output_chars(),
        ))
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
}

#[derive(Debug, Deserialize)]
struct LaunchParams {
    simulator_uuid: String,
    bundle_id: String,
    #[serde(default)]
    args: Vec<String>,
}

pub struct LaunchAppSimulatorTool {
    schema: ToolSchema,
}

impl LaunchAppSimulatorTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema {
                name: "launch_app_simulator".to_string(),
                description: "Launch an installed app on a simulator".to_string(),
                parameters: object_schema(
                    &[
                        simulator_uuid_schema(),
                        json!({
                            "bundle_id": {
                                "type": "string",
                                "description": "Bundle identifier (see get_bundle_id)"
                            },
                            "args": {
                                "type": "array",
                                "items": {"type": "string"},
                                "description": "Launch arguments passed to the app"
                            }
                        }),
                    ],
                    &["simulator_uuid", "bundle_id"],
                ),
            },
        }
    }
}

impl Default for LaunchAppSimulatorTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for LaunchAppSimulatorTool {
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let params: LaunchParams = parse_params(params)?;
        let uuid = require_uuid(&params.simulator_uuid)?;
        if params.bundle_id.trim().is_empty() {
            return Err(XcodeError::Validation("bundle_id is required".to_string()));
        }

        let mut command: Vec<String> = ["xcrun", "simctl", "launch", uuid, params.bundle_id.trim()]
            .into_iter()
            .map(String::from)
            .collect();
        command.extend(params.args.iter().cloned());

        let result = ctx.run(&ExecutionRequest::literal("Launch app", command)).await;
        Ok(ToolOutput::from_execution(
            &format!("Launched {} on simulator {}", params.bundle_id, uuid),
            &format!("Failed to launch {}", params.bundle_id),
            &result,
            ctx.max_output_chars(),
        ))
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
}
