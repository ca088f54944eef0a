use super::build_tools::{BuildTool, CleanTool, GetAppPathTool, ListSchemesTool, ShowBuildSettingsTool};
use super::bundle_tools::{GetBundleIdTool, LaunchMacAppTool};
use super::response::ToolOutput;
use super::simulator_tools::{
    BootSimulatorTool, InstallAppSimulatorTool, LaunchAppSimulatorTool, ListSimulatorsTool,
    OpenSimulatorTool,
};
use super::xcode_info_tool::XcodeInfoTool;
use crate::config::ServerConfig;
use crate::execution::{CommandExecutor, ExecutionRequest, ExecutionResult, ProgressSink};
use crate::{Result, XcodeError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::time::timeout;
use tracing::{debug, info};

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolRequest {
    pub tool_name: String,
    pub params: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolResponse {
    pub tool_name: String,
    pub result: ToolOutput,
    pub success: bool,
}

#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// What a tool gets to work with for a single call.
#[derive(Clone)]
pub struct ToolContext {
    executor: Arc<CommandExecutor>,
    progress: Option<Arc<dyn ProgressSink>>,
    max_output_chars: usize,
}

impl ToolContext {
    pub fn new(executor: Arc<CommandExecutor>, max_output_chars: usize) -> Self {
        Self {
            executor,
            progress: None,
            max_output_chars,
        }
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn max_output_chars(&self) -> usize {
        self.max_output_chars
    }

    pub async fn run(&self, request: &ExecutionRequest) -> ExecutionResult {
        self.executor.execute(request, self.progress.as_deref()).await
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput>;
    fn schema(&self) -> &ToolSchema;
}

pub struct McpServer {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
    executor: Arc<CommandExecutor>,
    config: ServerConfig,
    metrics: Arc<Metrics>,
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("tools", &"<tools>")
            .field("executor", &self.executor)
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .finish()
    }
}

impl McpServer {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let executor = Arc::new(CommandExecutor::from_config(&config));
        Self::with_executor(config, executor)
    }

    pub fn with_executor(config: ServerConfig, executor: Arc<CommandExecutor>) -> Result<Self> {
        let server = Self {
            tools: Arc::new(RwLock::new(HashMap::new())),
            executor,
            config,
            metrics: Arc::new(Metrics::new()),
        };

        let defaults: Vec<Arc<dyn Tool>> = vec![
            Arc::new(BuildTool::new()),
            Arc::new(CleanTool::new()),
            Arc::new(ShowBuildSettingsTool::new()),
            Arc::new(ListSchemesTool::new()),
            Arc::new(GetAppPathTool::new()),
            Arc::new(ListSimulatorsTool::new()),
            Arc::new(BootSimulatorTool::new()),
            Arc::new(OpenSimulatorTool::new()),
            Arc::new(InstallAppSimulatorTool::new()),
            Arc::new(LaunchAppSimulatorTool::new()),
            Arc::new(GetBundleIdTool::new()),
            Arc::new(LaunchMacAppTool::new()),
            Arc::new(XcodeInfoTool::new()),
        ];
        for tool in defaults {
            server.register_tool(tool)?;
        }

        Ok(server)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn register_tool(&self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.schema().name.clone();
        let mut tools = self
            .tools
            .write()
            .map_err(|e| XcodeError::Mcp(format!("Failed to acquire tool lock: {}", e)))?;
        debug!("Registering tool {}", name);
        tools.insert(name, tool);
        Ok(())
    }

    /// Schemas of every registered tool, sorted by name.
    pub fn get_tool_schemas(&self) -> Result<Vec<ToolSchema>> {
        let tools = self
            .tools
            .read()
            .map_err(|e| XcodeError::Mcp(format!("Failed to acquire tool lock: {}", e)))?;
        let mut schemas: Vec<ToolSchema> = tools.values().map(|t| t.schema().clone()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(schemas)
    }

    pub async fn call_tool(
        &self,
        request: ToolRequest,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Result<ToolResponse> {
        let tool = {
            let tools = self
                .tools
                .read()
                .map_err(|e| XcodeError::Mcp(format!("Failed to acquire tool lock: {}", e)))?;
            tools
                .get(&request.tool_name)
                .ok_or_else(|| XcodeError::ToolNotFound(request.tool_name.clone()))?
                .clone()
        };

        self.metrics.record_tool_call(&request.tool_name);
        info!("Calling tool {}", request.tool_name);

        let mut ctx = ToolContext::new(self.executor.clone(), self.config.max_output_chars);
        if let Some(sink) = progress {
            ctx = ctx.with_progress(sink);
        }

        let call = tool.execute(request.params, &ctx);
        let result = match self.config.tool_timeout {
            Some(limit) => timeout(limit, call)
                .await
                .map_err(|_| XcodeError::Timeout(limit))??,
            None => call.await?,
        };

        Ok(ToolResponse {
            success: !result.is_error,
            result,
            tool_name: request.tool_name,
        })
    }
}

#[derive(Debug)]
pub struct Metrics {
    tool_calls: Arc<RwLock<HashMap<String, u64>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            tool_calls: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn record_tool_call(&self, tool_name: &str) {
        if let Ok(mut calls) = self.tool_calls.write() {
            *calls.entry(tool_name.to_string()).or_insert(0) += 1;
        }
    }

    pub fn tool_calls(&self, tool_name: &str) -> u64 {
        self.tool_calls
            .read()
            .ok()
            .and_then(|calls| calls.get(tool_name).copied())
            .unwrap_or(0)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
