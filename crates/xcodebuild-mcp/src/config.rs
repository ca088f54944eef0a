use std::time::Duration;
use tracing::warn;

pub const ENV_USE_XCPRETTY: &str = "XCODEBUILD_MCP_USE_XCPRETTY";
pub const ENV_PRETTY_HELPER: &str = "XCODEBUILD_MCP_PRETTY_HELPER";
pub const ENV_SHELL: &str = "XCODEBUILD_MCP_SHELL";
pub const ENV_PROGRESS_INTERVAL_MS: &str = "XCODEBUILD_MCP_PROGRESS_INTERVAL_MS";
pub const ENV_MAX_OUTPUT_CHARS: &str = "XCODEBUILD_MCP_MAX_OUTPUT_CHARS";
pub const ENV_TOOL_TIMEOUT_SECS: &str = "XCODEBUILD_MCP_TOOL_TIMEOUT_SECS";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Pipe xcodebuild output through the pretty helper when it is installed
    pub use_pretty_output: bool,
    pub pretty_helper: String,
    pub shell: String,
    /// Minimum gap between throttled progress notifications
    pub progress_interval: Duration,
    /// Tool output longer than this is truncated before it goes on the wire
    pub max_output_chars: usize,
    /// Deadline for a single tool call; `None` lets builds run as long as they need
    pub tool_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            use_pretty_output: false,
            pretty_helper: "xcpretty".to_string(),
            shell: "sh".to_string(),
            progress_interval: Duration::from_secs(1),
            max_output_chars: 20_000,
            tool_timeout: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Unparseable values are
    /// logged and the default is kept.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_USE_XCPRETTY) {
            match parse_bool(&value) {
                Some(flag) => config.use_pretty_output = flag,
                None => warn!("Ignoring {}={:?}: expected a boolean", ENV_USE_XCPRETTY, value),
            }
        }

        if let Some(helper) = lookup(ENV_PRETTY_HELPER).filter(|v| !v.trim().is_empty()) {
            config.pretty_helper = helper.trim().to_string();
        }

        if let Some(shell) = lookup(ENV_SHELL).filter(|v| !v.trim().is_empty()) {
            config.shell = shell.trim().to_string();
        }

        if let Some(value) = lookup(ENV_PROGRESS_INTERVAL_MS) {
            match value.trim().parse::<u64>() {
                Ok(ms) => config.progress_interval = Duration::from_millis(ms),
                Err(e) => warn!("Ignoring {}={:?}: {}", ENV_PROGRESS_INTERVAL_MS, value, e),
            }
        }

        if let Some(value) = lookup(ENV_MAX_OUTPUT_CHARS) {
            match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.max_output_chars = n,
                _ => warn!("Ignoring {}={:?}: expected a positive integer", ENV_MAX_OUTPUT_CHARS, value),
            }
        }

        if let Some(value) = lookup(ENV_TOOL_TIMEOUT_SECS) {
            match value.trim().parse::<u64>() {
                Ok(0) => config.tool_timeout = None,
                Ok(secs) => config.tool_timeout = Some(Duration::from_secs(secs)),
                Err(e) => warn!("Ignoring {}={:?}: {}", ENV_TOOL_TIMEOUT_SECS, value, e),
            }
        }

        config
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
