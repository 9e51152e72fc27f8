use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Speaker of a conversational turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Role::User => "👤",
            Role::Assistant => "🤖",
            Role::System => "⚙️",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-disk form of a message, one JSON file per message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageRecord {
    pub role: Role,
    pub content: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<PathBuf>,
}

fn default_enabled() -> bool {
    true
}

/// Wire form sent to the model server.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelMessage {
    pub role: Role,
    pub content: String,
    pub attachments: Vec<PathBuf>,
}

/// One conversational turn.
///
/// `backing_file` stays `None` until a `Context` has written the message to
/// disk. Message itself never touches the filesystem.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub attachments: Vec<PathBuf>,
    pub enabled: bool,
    pub(crate) backing_file: Option<PathBuf>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            attachments: Vec::new(),
            enabled: true,
            backing_file: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Empty assistant message that collects reasoning output.
    /// Reasoning is never replayed to the model, so it starts disabled.
    pub fn thinking_accumulator() -> Self {
        Self {
            enabled: false,
            ..Self::assistant(String::new())
        }
    }

    pub fn content_accumulator() -> Self {
        Self::assistant(String::new())
    }

    pub fn backing_file(&self) -> Option<&Path> {
        self.backing_file.as_deref()
    }

    pub fn attach(&mut self, path: impl Into<PathBuf>) {
        self.attachments.push(path.into());
    }

    pub fn detach(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        if let Some(pos) = self.attachments.iter().position(|a| a == path) {
            self.attachments.remove(pos);
        }
    }

    pub fn serialize(&self) -> MessageRecord {
        MessageRecord {
            role: self.role,
            content: self.content.clone(),
            enabled: self.enabled,
            file: self.backing_file.clone(),
            attachments: self.attachments.clone(),
        }
    }

    pub fn to_model_request_form(&self) -> ModelMessage {
        ModelMessage {
            role: self.role,
            content: self.content.clone(),
            attachments: self.attachments.clone(),
        }
    }

    /// Rebuild a message from its persisted record. When `loaded_from` is
    /// given it replaces whatever path the record carries.
    pub fn from_record(record: MessageRecord, loaded_from: Option<PathBuf>) -> Self {
        Self {
            role: record.role,
            content: record.content,
            attachments: record.attachments,
            enabled: record.enabled,
            backing_file: loaded_from.or(record.file),
        }
    }

    /// First `max_chars` characters on one line, with an ellipsis when cut.
    pub fn preview(&self, max_chars: usize) -> String {
        let flat: String = self
            .content
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        if flat.chars().count() > max_chars {
            let cut: String = flat.chars().take(max_chars).collect();
            format!("{cut}...")
        } else {
            flat
        }
    }
}
