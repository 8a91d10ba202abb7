// OpenAI chat completions settings (also used for OpenAI-compatible servers)

use super::{required, unsupported, ChatCompletionBody, OptionKey, OptionValue, ResponseFormat};
use crate::chat::Chat;
use crate::config::ApiType;
use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenAISettings {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logit_bias: Option<BTreeMap<String, i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logprobs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_logprobs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
}

impl OpenAISettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            frequency_penalty: None,
            logit_bias: None,
            logprobs: None,
            top_logprobs: None,
            max_tokens: None,
            presence_penalty: None,
            response_format: None,
            seed: None,
            stop: None,
            temperature: None,
            top_p: None,
            user: None,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    pub fn top_p(&self) -> Option<f64> {
        self.top_p
    }

    pub fn max_tokens(&self) -> Option<i64> {
        self.max_tokens
    }

    pub fn stop(&self) -> Option<&[String]> {
        self.stop.as_deref()
    }

    pub fn logit_bias(&self) -> Option<&BTreeMap<String, i64>> {
        self.logit_bias.as_ref()
    }

    pub(crate) fn apply(&mut self, key: OptionKey, value: Option<OptionValue>) -> Result<()> {
        match key {
            OptionKey::Model => self.model = required(key, value)?.text(key)?,
            OptionKey::FrequencyPenalty => {
                self.frequency_penalty = value.map(|v| v.float_in(key, -2.0, 2.0)).transpose()?
            }
            OptionKey::LogitBias => {
                self.logit_bias = value.map(|v| v.bias_map(key)).transpose()?
            }
            OptionKey::Logprobs => self.logprobs = value.map(|v| v.boolean(key)).transpose()?,
            OptionKey::TopLogprobs => {
                self.top_logprobs = value.map(|v| v.int_in(key, 0, 20)).transpose()?
            }
            OptionKey::MaxTokens => {
                self.max_tokens = value.map(|v| v.int_in(key, 1, i64::MAX)).transpose()?
            }
            OptionKey::PresencePenalty => {
                self.presence_penalty = value.map(|v| v.float_in(key, -2.0, 2.0)).transpose()?
            }
            OptionKey::ResponseFormat => {
                self.response_format = value.map(|v| v.response_format(key)).transpose()?
            }
            OptionKey::Seed => self.seed = value.map(|v| v.int(key)).transpose()?,
            OptionKey::Stop => self.stop = value.map(|v| v.list(key)).transpose()?,
            OptionKey::Temperature => {
                self.temperature = value.map(|v| v.float_in(key, 0.0, 2.0)).transpose()?
            }
            OptionKey::TopP => self.top_p = value.map(|v| v.float_in(key, 0.0, 1.0)).transpose()?,
            OptionKey::User => self.user = value.map(|v| v.text(key)).transpose()?,
            other => return Err(unsupported(ApiType::OpenAI, other)),
        }
        Ok(())
    }

    pub(crate) fn body<'a>(&'a self, chat: &'a Chat) -> ChatCompletionBody<'a, Self> {
        ChatCompletionBody::new(self, chat)
    }
}
