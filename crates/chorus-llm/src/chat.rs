use crate::error::{ChorusError, Result};
use crate::types::{Message, MessageKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Conversation shared by every provider in a dispatch.
///
/// Holds at most one system message, kept apart from the ordered
/// user/assistant history and always reported first. Serializes as the flat
/// message list, and deserializing goes through [`Chat::from_messages`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Message>", into = "Vec<Message>")]
pub struct Chat {
    system: Option<Message>,
    messages: Vec<Message>,
}

impl Chat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a chat from a flat list.
    ///
    /// Only the first entry may be a system message.
    pub fn from_messages(messages: impl IntoIterator<Item = Message>) -> Result<Self> {
        let mut chat = Self::new();

        for (position, message) in messages.into_iter().enumerate() {
            match message.kind {
                MessageKind::System if position == 0 => chat.system = Some(message),
                MessageKind::System => {
                    return Err(ChorusError::MalformedHistory(format!(
                        "system message at position {} (only the first message may be a system message)",
                        position
                    )));
                }
                MessageKind::User | MessageKind::Assistant => chat.messages.push(message),
            }
        }

        Ok(chat)
    }

    /// Set the system message. An empty string clears it.
    pub fn set_system_message(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            self.system = None;
        } else {
            self.system = Some(Message::system(text));
        }
    }

    pub fn clear_system_message(&mut self) {
        self.system = None;
    }

    pub fn system_message(&self) -> Option<&str> {
        self.system.as_ref().map(|m| m.text.as_str())
    }

    pub fn add_user_message(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    pub fn add_assistant_message(&mut self, text: impl Into<String>) {
        self.messages.push(Message::assistant(text));
    }

    /// Replace the text of the last message if it is an assistant message.
    /// Does nothing otherwise.
    pub fn replace_last_assistant_message(&mut self, text: impl Into<String>) {
        if let Some(last) = self.messages.last_mut() {
            if last.kind == MessageKind::Assistant {
                *last = Message::assistant(text);
            }
        }
    }

    /// Drop every non-system message
    pub fn clear_messages(&mut self) {
        self.messages.clear();
    }

    /// All messages, system message first
    pub fn all_messages(&self) -> Vec<&Message> {
        self.system.iter().chain(self.messages.iter()).collect()
    }

    pub fn non_system_messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len() + usize::from(self.system.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.system.is_none() && self.messages.is_empty()
    }
}

impl TryFrom<Vec<Message>> for Chat {
    type Error = ChorusError;

    fn try_from(messages: Vec<Message>) -> Result<Self> {
        Self::from_messages(messages)
    }
}

impl From<Chat> for Vec<Message> {
    fn from(chat: Chat) -> Self {
        chat.system.into_iter().chain(chat.messages).collect()
    }
}

impl fmt::Display for Chat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rendered = String::new();
        for (i, message) in self.all_messages().into_iter().enumerate() {
            rendered.push_str(&format!(
                "# Message: {}\n# Type: {}\n{}\n\n",
                i + 1,
                message.kind,
                message.text
            ));
        }
        f.write_str(rendered.trim())
    }
}
