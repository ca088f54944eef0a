pub mod config;
pub mod destination;
pub mod execution;
pub mod mcp;

pub use config::ServerConfig;
pub use destination::{Destination, DestinationError, Platform, resolve_destination};
pub use execution::{CommandExecutor, ExecutionRequest, ExecutionResult};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum XcodeError {
    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    InvalidTarget(#[from] DestinationError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Tool execution timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, XcodeError>;
