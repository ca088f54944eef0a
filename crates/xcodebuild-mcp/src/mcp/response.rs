use crate::execution::ExecutionResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
}

/// Caller-visible result of a tool call, in MCP `CallToolResult` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: Vec<Content>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: true,
        }
    }

    pub fn json(value: &serde_json::Value) -> crate::Result<Self> {
        Ok(Self::text(serde_json::to_string_pretty(value)?))
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.is_empty() {
            self.content.push(Content::Text { text });
        }
        self
    }

    /// Short summary line followed by the tool's own output or diagnostics.
    pub fn from_execution(
        success_message: &str,
        failure_message: &str,
        result: &ExecutionResult,
        max_chars: usize,
    ) -> Self {
        if result.success {
            Self::text(success_message).with_text(truncate(&result.output, max_chars))
        } else {
            let error = result.error.as_deref().unwrap_or("unknown error");
            Self::error(format!("{}: {}", failure_message, truncate(error, max_chars)))
                .with_text(truncate(&result.output, max_chars))
        }
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.content.iter().map(|c| match c {
            Content::Text { text } => text.as_str(),
        })
    }
}

/// Keeps the tail of long output, where xcodebuild prints its errors.
pub fn truncate(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let skipped = count - max_chars;
    let tail: String = text.chars().skip(skipped).collect();
    format!("[... {} characters truncated ...]\n{}", skipped, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_tail() {
        assert_eq!(truncate("short", 10), "short");
        let out = truncate("0123456789", 4);
        assert!(out.ends_with("6789"));
        assert!(out.contains("6 characters truncated"));
    }

    #[test]
    fn test_from_failed_execution() {
        let result = ExecutionResult::failed("partial", "error: no such scheme");
        let output = ToolOutput::from_execution("Build succeeded", "Build failed", &result, 1000);
        assert!(output.is_error);
        let texts: Vec<&str> = output.texts().collect();
        assert_eq!(texts, vec!["Build failed: error: no such scheme", "partial"]);
    }

    #[test]
    fn test_wire_shape() {
        let output = ToolOutput::text("hello");
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"content": [{"type": "text", "text": "hello"}], "isError": false})
        );
    }
}
