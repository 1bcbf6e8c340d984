use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A backend action invoked by the assistant, reported back for disclosure.
/// `params` and `result` are opaque to this layer.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolCall {
    pub tool: String,
    pub params: serde_json::Value,
    pub result: serde_json::Value,
}

/// One chat entry, either typed by the user or returned by the assistant.
/// `timestamp` is the display form, not the wire instant.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: String,
    #[serde(default, rename = "toolCalls", skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub completed: bool,
}
