use serde::Serialize;

use crate::types::message::ModelMessage;

/// One decoded fragment of a streamed chat response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Thinking(String),
    Content(String),
    ToolName(String),
    ToolCalls(Vec<serde_json::Value>),
    Images(Vec<String>),
    /// A populated field this client does not know about.
    Unknown(String),
}

/// Channel tag of a `StreamChunk`, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Thinking,
    Content,
    ToolName,
    ToolCalls,
    Images,
    Unknown,
}

impl StreamChunk {
    pub fn channel(&self) -> Channel {
        match self {
            StreamChunk::Thinking(_) => Channel::Thinking,
            StreamChunk::Content(_) => Channel::Content,
            StreamChunk::ToolName(_) => Channel::ToolName,
            StreamChunk::ToolCalls(_) => Channel::ToolCalls,
            StreamChunk::Images(_) => Channel::Images,
            StreamChunk::Unknown(_) => Channel::Unknown,
        }
    }
}

/// Body of a streaming chat request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ModelMessage>,
}
