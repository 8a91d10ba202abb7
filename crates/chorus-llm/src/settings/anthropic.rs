// Anthropic Messages API settings
//
// Differs from the chat completions dialect in two ways: `max_tokens` is
// mandatory, and the system prompt travels in a top-level `system` field
// instead of the message list.

use super::{required, unsupported, OptionKey, OptionValue};
use crate::chat::Chat;
use crate::config::ApiType;
use crate::error::Result;
use crate::types::WireMessage;
use serde::Serialize;

/// Sent when the caller never set `max_tokens`
pub const ANTHROPIC_DEFAULT_MAX_TOKENS: i64 = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnthropicMetadata {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnthropicSettings {
    model: String,
    max_tokens: Option<i64>,
    metadata: Option<AnthropicMetadata>,
    stop_sequences: Option<Vec<String>>,
    temperature: Option<f64>,
    top_k: Option<i64>,
    top_p: Option<f64>,
}

#[derive(Serialize)]
pub(crate) struct AnthropicBody<'a> {
    model: &'a str,
    max_tokens: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a AnthropicMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<&'a [String]>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

impl AnthropicSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: None,
            metadata: None,
            stop_sequences: None,
            temperature: None,
            top_k: None,
            top_p: None,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// `max_tokens` as it will be sent
    pub fn max_tokens(&self) -> i64 {
        self.max_tokens.unwrap_or(ANTHROPIC_DEFAULT_MAX_TOKENS)
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    pub fn metadata(&self) -> Option<&AnthropicMetadata> {
        self.metadata.as_ref()
    }

    pub(crate) fn apply(&mut self, key: OptionKey, value: Option<OptionValue>) -> Result<()> {
        match key {
            OptionKey::Model => self.model = required(key, value)?.text(key)?,
            OptionKey::MaxTokens => {
                self.max_tokens = Some(required(key, value)?.int_in(key, 1, i64::MAX)?)
            }
            OptionKey::Metadata => {
                self.metadata = value
                    .map(|v| v.text(key).map(|user_id| AnthropicMetadata { user_id }))
                    .transpose()?
            }
            OptionKey::StopSequences => {
                self.stop_sequences = value.map(|v| v.list(key)).transpose()?
            }
            OptionKey::Temperature => {
                self.temperature = value.map(|v| v.float_in(key, 0.0, 1.0)).transpose()?
            }
            OptionKey::TopK => self.top_k = value.map(|v| v.int(key)).transpose()?,
            OptionKey::TopP => self.top_p = value.map(|v| v.float_in(key, 0.0, 1.0)).transpose()?,
            other => return Err(unsupported(ApiType::Anthropic, other)),
        }
        Ok(())
    }

    pub(crate) fn body<'a>(&'a self, chat: &'a Chat) -> AnthropicBody<'a> {
        AnthropicBody {
            model: &self.model,
            max_tokens: self.max_tokens(),
            metadata: self.metadata.as_ref(),
            stop_sequences: self.stop_sequences.as_deref(),
            stream: true,
            temperature: self.temperature,
            top_k: self.top_k,
            top_p: self.top_p,
            messages: chat.non_system_messages().iter().map(Into::into).collect(),
            system: chat.system_message(),
        }
    }
}
