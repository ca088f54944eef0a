pub mod build_tools;
pub mod bundle_tools;
pub mod error_codes;
pub mod params;
pub mod response;
pub mod server;
pub mod simulator_tools;
pub mod xcode_info_tool;
pub mod xcode_version;

pub use error_codes::{ErrorCode, ErrorResponse};
pub use response::{Content, ToolOutput};
pub use server::{McpServer, Tool, ToolContext, ToolRequest, ToolResponse, ToolSchema};
