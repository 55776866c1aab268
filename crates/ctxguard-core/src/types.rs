//! Conversation types shared by the compaction pipeline

use serde::{Deserialize, Serialize};

/// Role of a turn in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Human input
    User,
    /// Model response
    Assistant,
    /// Tool execution result
    Tool,
}

impl Role {
    /// Lowercase role label used in transcripts
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Smallest content unit inside a turn
///
/// A `ToolResult` answers the closest preceding `ToolCall` with the same
/// name, in the same or an earlier turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    /// Plain text
    Text { value: String },
    /// A tool invocation issued by the model
    ToolCall {
        name: String,
        #[serde(default)]
        args: serde_json::Value,
    },
    /// The output of a tool invocation
    ToolResult {
        name: String,
        #[serde(default)]
        result: serde_json::Value,
    },
}

impl Part {
    /// Create a text part
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
        }
    }

    /// Create a tool call part
    pub fn tool_call(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self::ToolCall {
            name: name.into(),
            args,
        }
    }

    /// Create a tool result part
    pub fn tool_result(name: impl Into<String>, result: serde_json::Value) -> Self {
        Self::ToolResult {
            name: name.into(),
            result,
        }
    }

    /// Text content, if this is a non-empty text part
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { value } if !value.is_empty() => Some(value),
            _ => None,
        }
    }
}

/// One message-equivalent unit in a conversation
///
/// Turns are never edited once created; compaction only replaces the
/// sequence that holds them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced this turn
    pub role: Role,
    /// Ordered content parts
    pub parts: Vec<Part>,
}

impl Turn {
    /// Create a turn from parts
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    /// Create a user turn with a single text part
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    /// Create an assistant turn with a single text part
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![Part::text(text)])
    }

    /// Create an assistant turn that invokes a tool
    pub fn tool_call(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self::new(Role::Assistant, vec![Part::tool_call(name, args)])
    }

    /// Create a tool turn carrying a tool's result
    pub fn tool_result(name: impl Into<String>, result: serde_json::Value) -> Self {
        Self::new(Role::Tool, vec![Part::tool_result(name, result)])
    }

    /// First non-empty text part, if any
    pub fn first_text(&self) -> Option<&str> {
        self.parts.iter().find_map(Part::as_text)
    }

    /// Whether any part is a tool result
    pub fn has_tool_result(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, Part::ToolResult { .. }))
    }

    /// Whether this turn calls the named tool
    pub fn calls_tool(&self, tool: &str) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, Part::ToolCall { name, .. } if name == tool))
    }

    /// Result names whose call is not earlier in this same turn
    ///
    /// Only these need a call from a previous turn to stay paired.
    pub fn unanswered_result_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().enumerate().filter_map(|(pos, part)| match part {
            Part::ToolResult { name, .. }
                if !self.parts[..pos]
                    .iter()
                    .any(|p| matches!(p, Part::ToolCall { name: call, .. } if call == name)) =>
            {
                Some(name.as_str())
            }
            _ => None,
        })
    }
}

/// The request handed to the guard immediately before a model call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    /// Model identifier used to look up the context window
    pub model: String,
    /// System instruction sent alongside the turns
    #[serde(default)]
    pub system_instruction: Option<String>,
    /// Conversation history; rewritten in place by compaction
    pub turns: Vec<Turn>,
}

impl ModelRequest {
    /// Create a request without a system instruction
    pub fn new(model: impl Into<String>, turns: Vec<Turn>) -> Self {
        Self {
            model: model.into(),
            system_instruction: None,
            turns,
        }
    }

    /// Attach a system instruction
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }
}
