use serde::{Deserialize, Serialize};
use std::fmt;

/// Who authored a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Leading directive for the assistant
    System,

    /// Human turn
    User,

    /// Model turn
    Assistant,
}

impl MessageKind {
    /// Role name used on the wire by every provider
    pub fn role(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::System => "System",
            Self::User => "User",
            Self::Assistant => "Assistant",
        };
        f.write_str(label)
    }
}

/// A single message. Immutable once built; the owning `Chat` replaces
/// messages rather than editing them in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    pub text: String,
}

impl Message {
    pub fn new(kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    /// Create system message
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageKind::System, text)
    }

    /// Create user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageKind::User, text)
    }

    /// Create assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Assistant, text)
    }

    pub fn role(&self) -> &'static str {
        self.kind.role()
    }
}

/// Borrowed `{role, content}` pair as every provider expects it in `messages`
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WireMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

impl<'a> From<&'a Message> for WireMessage<'a> {
    fn from(message: &'a Message) -> Self {
        Self {
            role: message.role(),
            content: &message.text,
        }
    }
}
