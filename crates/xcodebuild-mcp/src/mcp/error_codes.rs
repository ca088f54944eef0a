use crate::XcodeError;
use serde::{Deserialize, Serialize};

/// JSON-RPC error codes returned by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    // Standard JSON-RPC error codes
    pub const PARSE_ERROR: Self = Self(-32700);
    pub const INVALID_REQUEST: Self = Self(-32600);
    pub const METHOD_NOT_FOUND: Self = Self(-32601);
    pub const INVALID_PARAMS: Self = Self(-32602);
    pub const INTERNAL_ERROR: Self = Self(-32603);

    // Server-defined codes (range -32000 to -32099)
    pub const TOOL_NOT_FOUND: Self = Self(-32000);
    pub const TOOL_EXECUTION_FAILED: Self = Self(-32001);
    pub const INVALID_TOOL_PARAMS: Self = Self(-32002);
    pub const INVALID_TARGET: Self = Self(-32003);
    pub const TIMEOUT_ERROR: Self = Self(-32004);
}

impl ErrorCode {
    pub fn description(&self) -> &'static str {
        match self.0 {
            -32700 => "Parse error: Invalid JSON was received",
            -32600 => "Invalid Request: The JSON sent is not a valid Request object",
            -32601 => "Method not found: The method does not exist or is not available",
            -32602 => "Invalid params: Invalid method parameter(s)",
            -32603 => "Internal error: Internal JSON-RPC error",
            -32000 => "Tool not found: The requested tool does not exist",
            -32001 => "Tool execution failed: The tool encountered an error during execution",
            -32002 => "Invalid tool params: The tool parameters are invalid or missing",
            -32003 => "Invalid target: The build destination could not be determined",
            -32004 => "Timeout error: Operation timed out",
            _ => "Unknown error",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: ErrorCode, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.description().to_string(),
            data: None,
        }
    }
}

impl From<XcodeError> for ErrorResponse {
    fn from(error: XcodeError) -> Self {
        let code = match &error {
            XcodeError::ToolNotFound(_) => ErrorCode::TOOL_NOT_FOUND,
            XcodeError::Validation(_) => ErrorCode::INVALID_TOOL_PARAMS,
            XcodeError::InvalidTarget(_) => ErrorCode::INVALID_TARGET,
            XcodeError::Execution(_) => ErrorCode::TOOL_EXECUTION_FAILED,
            XcodeError::Timeout(_) => ErrorCode::TIMEOUT_ERROR,
            XcodeError::Json(_) => ErrorCode::INVALID_PARAMS,
            XcodeError::Mcp(_) | XcodeError::Io(_) => ErrorCode::INTERNAL_ERROR,
        };
        ErrorResponse::new(code, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::{DestinationError, Platform};

    #[test]
    fn test_error_code_descriptions() {
        assert_eq!(ErrorCode::PARSE_ERROR.description(), "Parse error: Invalid JSON was received");
        assert_eq!(
            ErrorCode::TOOL_NOT_FOUND.description(),
            "Tool not found: The requested tool does not exist"
        );
        assert_eq!(ErrorCode(1).description(), "Unknown error");
    }

    #[test]
    fn test_error_response_with_data() {
        let data = serde_json::json!({"field": "scheme"});
        let err = ErrorResponse::with_data(ErrorCode::INVALID_TOOL_PARAMS, "missing scheme", data.clone());
        assert_eq!(err.code, ErrorCode::INVALID_TOOL_PARAMS);
        assert_eq!(err.data, Some(data));
    }

    #[test]
    fn test_error_conversion() {
        let resp: ErrorResponse = XcodeError::Validation("Bad input".to_string()).into();
        assert_eq!(resp.code, ErrorCode::INVALID_TOOL_PARAMS);
        assert!(resp.message.contains("Bad input"));

        let resp: ErrorResponse = XcodeError::from(DestinationError::InvalidTarget {
            platform: Platform::IosSimulator,
        })
        .into();
        assert_eq!(resp.code, ErrorCode::INVALID_TARGET);
        assert!(resp.message.contains("iOS Simulator"));

        let resp: ErrorResponse = XcodeError::ToolNotFound("nope".to_string()).into();
        assert_eq!(resp.code, ErrorCode::TOOL_NOT_FOUND);
    }
}
