//! Outcome of a tool invocation as seen by the command layer

use serde::Serialize;
use serde_json::Value;

use crate::client::CallToolResult;
use crate::error::WorkspaceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationStatus {
    Success,
    Failure,
}

/// Error detail carried by a failed invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationError {
    pub kind: &'static str,
    pub message: String,
}

/// Result of one tool call, consumed immediately by the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationResult {
    pub status: InvocationStatus,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<InvocationError>,
}

impl InvocationResult {
    pub fn success(payload: Value) -> Self {
        Self {
            status: InvocationStatus::Success,
            payload,
            attachments: Vec::new(),
            error: None,
        }
    }

    /// Structured form of an error, for JSON output
    pub fn failure(error: &WorkspaceError) -> Self {
        Self {
            status: InvocationStatus::Failure,
            payload: Value::Null,
            attachments: Vec::new(),
            error: Some(InvocationError {
                kind: error.kind().tag(),
                message: error.to_string(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == InvocationStatus::Success
    }

    /// Payload is `structuredContent` when present, else the text content
    /// (decoded as JSON when it parses). Non-text items become attachments.
    pub fn from_call(result: CallToolResult) -> Self {
        let text = result.text();
        let payload = match result.structured_content {
            Some(structured) => structured,
            None if text.is_empty() => Value::Null,
            None => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        };

        let attachments = result
            .content
            .into_iter()
            .filter(|item| !item.is_text())
            .filter_map(|item| serde_json::to_value(item).ok())
            .collect();

        Self {
            attachments,
            ..Self::success(payload)
        }
    }
}
