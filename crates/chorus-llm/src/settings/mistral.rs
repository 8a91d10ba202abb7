use super::{required, unsupported, ChatCompletionBody, OptionKey, OptionValue, ResponseFormat};
use crate::chat::Chat;
use crate::config::ApiType;
use crate::error::Result;
use serde::Serialize;

/// Mistral chat completions settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MistralSettings {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    safe_prompt: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    random_seed: Option<i64>,
}

impl MistralSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            response_format: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            safe_prompt: None,
            random_seed: None,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    pub fn safe_prompt(&self) -> Option<bool> {
        self.safe_prompt
    }

    pub(crate) fn apply(&mut self, key: OptionKey, value: Option<OptionValue>) -> Result<()> {
        match key {
            OptionKey::Model => self.model = required(key, value)?.text(key)?,
            OptionKey::ResponseFormat => {
                self.response_format = value.map(|v| v.response_format(key)).transpose()?
            }
            OptionKey::Temperature => {
                self.temperature = value.map(|v| v.float_in(key, 0.0, 1.0)).transpose()?
            }
            OptionKey::TopP => self.top_p = value.map(|v| v.float_in(key, 0.0, 1.0)).transpose()?,
            OptionKey::MaxTokens => {
                self.max_tokens = value.map(|v| v.int_in(key, 1, i64::MAX)).transpose()?
            }
            OptionKey::SafePrompt => self.safe_prompt = value.map(|v| v.boolean(key)).transpose()?,
            OptionKey::RandomSeed => self.random_seed = value.map(|v| v.int(key)).transpose()?,
            other => return Err(unsupported(ApiType::Mistral, other)),
        }
        Ok(())
    }

    pub(crate) fn body<'a>(&'a self, chat: &'a Chat) -> ChatCompletionBody<'a, Self> {
        ChatCompletionBody::new(self, chat)
    }
}
