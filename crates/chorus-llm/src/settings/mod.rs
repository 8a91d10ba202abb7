//! Per-provider request settings.
//!
//! Each provider gets one concrete settings struct. [`ModelSettings`] is the
//! closed sum over them and is what a [`crate::ModelDefinition`] stores.
//! Options are changed through a single validated setter taking an
//! [`OptionValue`]; an option that was never set (or was unset) is left out
//! of the request body entirely.

mod anthropic;
mod mistral;
mod openai;

pub use anthropic::{AnthropicMetadata, AnthropicSettings, ANTHROPIC_DEFAULT_MAX_TOKENS};
pub use mistral::MistralSettings;
pub use openai::OpenAISettings;

use crate::chat::Chat;
use crate::config::ApiType;
use crate::error::{ChorusError, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Settings for one provider
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSettings {
    OpenAI(OpenAISettings),
    Mistral(MistralSettings),
    Anthropic(AnthropicSettings),
}

impl ModelSettings {
    /// Settings for `api_type` with only the model name set
    pub fn new(api_type: ApiType, model: impl Into<String>) -> Self {
        match api_type {
            ApiType::OpenAI => Self::OpenAI(OpenAISettings::new(model)),
            ApiType::Mistral => Self::Mistral(MistralSettings::new(model)),
            ApiType::Anthropic => Self::Anthropic(AnthropicSettings::new(model)),
        }
    }

    pub fn api_type(&self) -> ApiType {
        match self {
            Self::OpenAI(_) => ApiType::OpenAI,
            Self::Mistral(_) => ApiType::Mistral,
            Self::Anthropic(_) => ApiType::Anthropic,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::OpenAI(s) => s.model(),
            Self::Mistral(s) => s.model(),
            Self::Anthropic(s) => s.model(),
        }
    }

    /// Set an option.
    ///
    /// ```
    /// use chorus_llm::{ApiType, ModelSettings};
    ///
    /// let mut settings = ModelSettings::new(ApiType::OpenAI, "gpt-4o");
    /// settings.set("temperature", 0.8).unwrap();
    /// settings.set("stop", vec!["\n\n"]).unwrap();
    /// assert!(settings.set("safe_prompt", true).is_err());
    /// ```
    pub fn set(&mut self, key: &str, value: impl Into<OptionValue>) -> Result<()> {
        self.apply(key, Some(value.into()))
    }

    /// Return an optional option to its unset state.
    /// Fails with [`ChorusError::RequiredFieldNil`] for required options.
    pub fn unset(&mut self, key: &str) -> Result<()> {
        self.apply(key, None)
    }

    /// Set (`Some`) or unset (`None`) an option.
    ///
    /// On error the settings are left exactly as they were.
    pub fn apply(&mut self, key: &str, value: Option<OptionValue>) -> Result<()> {
        let api = self.api_type().as_str();
        let option = key
            .parse::<OptionKey>()
            .map_err(|_| ChorusError::UnknownOption {
                api,
                key: key.to_string(),
            })?;

        match self {
            Self::OpenAI(s) => s.apply(option, value),
            Self::Mistral(s) => s.apply(option, value),
            Self::Anthropic(s) => s.apply(option, value),
        }
    }

    /// Request body for `chat` in this provider's format. Always requests a
    /// streamed response.
    pub fn serialize(&self, chat: &Chat) -> Result<Vec<u8>> {
        let body = match self {
            Self::OpenAI(s) => serde_json::to_vec(&s.body(chat))?,
            Self::Mistral(s) => serde_json::to_vec(&s.body(chat))?,
            Self::Anthropic(s) => serde_json::to_vec(&s.body(chat))?,
        };
        Ok(body)
    }
}

impl From<OpenAISettings> for ModelSettings {
    fn from(settings: OpenAISettings) -> Self {
        Self::OpenAI(settings)
    }
}

impl From<MistralSettings> for ModelSettings {
    fn from(settings: MistralSettings) -> Self {
        Self::Mistral(settings)
    }
}

impl From<AnthropicSettings> for ModelSettings {
    fn from(settings: AnthropicSettings) -> Self {
        Self::Anthropic(settings)
    }
}

// ============================================================================
// OPTION KEYS
// ============================================================================

/// Every option name recognized by at least one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKey {
    Model,
    FrequencyPenalty,
    LogitBias,
    Logprobs,
    TopLogprobs,
    MaxTokens,
    PresencePenalty,
    ResponseFormat,
    Seed,
    Stop,
    Temperature,
    TopP,
    User,
    SafePrompt,
    RandomSeed,
    /// Anthropic `metadata.user_id`; also accepted as `user_id`
    Metadata,
    StopSequences,
    TopK,
}

impl OptionKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::FrequencyPenalty => "frequency_penalty",
            Self::LogitBias => "logit_bias",
            Self::Logprobs => "logprobs",
            Self::TopLogprobs => "top_logprobs",
            Self::MaxTokens => "max_tokens",
            Self::PresencePenalty => "presence_penalty",
            Self::ResponseFormat => "response_format",
            Self::Seed => "seed",
            Self::Stop => "stop",
            Self::Temperature => "temperature",
            Self::TopP => "top_p",
            Self::User => "user",
            Self::SafePrompt => "safe_prompt",
            Self::RandomSeed => "random_seed",
            Self::Metadata => "metadata",
            Self::StopSequences => "stop_sequences",
            Self::TopK => "top_k",
        }
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a name no provider recognizes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecognizedKey;

impl FromStr for OptionKey {
    type Err = UnrecognizedKey;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let key = match s {
            "model" => Self::Model,
            "frequency_penalty" => Self::FrequencyPenalty,
            "logit_bias" => Self::LogitBias,
            "logprobs" => Self::Logprobs,
            "top_logprobs" => Self::TopLogprobs,
            "max_tokens" => Self::MaxTokens,
            "presence_penalty" => Self::PresencePenalty,
            "response_format" => Self::ResponseFormat,
            "seed" => Self::Seed,
            "stop" => Self::Stop,
            "temperature" => Self::Temperature,
            "top_p" => Self::TopP,
            "user" => Self::User,
            "safe_prompt" => Self::SafePrompt,
            "random_seed" => Self::RandomSeed,
            "metadata" | "user_id" => Self::Metadata,
            "stop_sequences" => Self::StopSequences,
            "top_k" => Self::TopK,
            _ => return Err(UnrecognizedKey),
        };
        Ok(key)
    }
}

pub(crate) fn unsupported(api: ApiType, key: OptionKey) -> ChorusError {
    ChorusError::UnknownOption {
        api: api.as_str(),
        key: key.as_str().to_string(),
    }
}

pub(crate) fn required(key: OptionKey, value: Option<OptionValue>) -> Result<OptionValue> {
    value.ok_or_else(|| ChorusError::RequiredFieldNil(key.as_str().to_string()))
}

// ============================================================================
// OPTION VALUES
// ============================================================================

/// Value passed to [`ModelSettings::set`]
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(String),
    List(Vec<String>),
    /// Token id -> bias
    Map(BTreeMap<String, i64>),
}

/// `response_format` values accepted by the OpenAI and Mistral settings
pub const RESPONSE_FORMATS: [&str; 2] = ["json", "plain_text"];

impl OptionValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Float(_) => "float",
            Self::Int(_) => "integer",
            Self::Bool(_) => "boolean",
            Self::Text(_) => "string",
            Self::List(_) => "list of strings",
            Self::Map(_) => "map of integers",
        }
    }

    /// Convert a JSON config value. `null` means "unset".
    pub fn from_json(key: &str, value: serde_json::Value) -> Result<Option<Self>> {
        use serde_json::Value;

        let invalid = |reason: String| ChorusError::InvalidValue {
            key: key.to_string(),
            reason,
        };

        let converted = match value {
            Value::Null => return Ok(None),
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(
                    n.as_f64()
                        .ok_or_else(|| invalid(format!("number {} out of range", n)))?,
                ),
            },
            Value::String(s) => Self::Text(s),
            Value::Array(items) => Self::List(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(s),
                        other => Err(invalid(format!("expected string list item, got {}", other))),
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Object(entries) => Self::Map(
                entries
                    .into_iter()
                    .map(|(token, bias)| match bias.as_i64() {
                        Some(b) => Ok((token, b)),
                        None => Err(invalid(format!("expected integer for '{}', got {}", token, bias))),
                    })
                    .collect::<Result<BTreeMap<_, _>>>()?,
            ),
        };

        Ok(Some(converted))
    }

    fn mismatch(&self, key: OptionKey, expected: &str) -> ChorusError {
        ChorusError::InvalidValue {
            key: key.as_str().to_string(),
            reason: format!("expected {}, got {}", expected, self.type_name()),
        }
    }

    pub(crate) fn float_in(self, key: OptionKey, min: f64, max: f64) -> Result<f64> {
        let value = match self {
            Self::Float(f) => f,
            Self::Int(i) => i as f64,
            other => return Err(other.mismatch(key, "float")),
        };
        if !(min..=max).contains(&value) {
            return Err(out_of_range(key, value, min, max));
        }
        Ok(value)
    }

    pub(crate) fn int(self, key: OptionKey) -> Result<i64> {
        match self {
            Self::Int(i) => Ok(i),
            other => Err(other.mismatch(key, "integer")),
        }
    }

    pub(crate) fn int_in(self, key: OptionKey, min: i64, max: i64) -> Result<i64> {
        let value = self.int(key)?;
        if !(min..=max).contains(&value) {
            return Err(out_of_range(key, value, min, max));
        }
        Ok(value)
    }

    pub(crate) fn boolean(self, key: OptionKey) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(b),
            other => Err(other.mismatch(key, "boolean")),
        }
    }

    pub(crate) fn text(self, key: OptionKey) -> Result<String> {
        match self {
            Self::Text(s) => Ok(s),
            other => Err(other.mismatch(key, "string")),
        }
    }

    pub(crate) fn list(self, key: OptionKey) -> Result<Vec<String>> {
        match self {
            Self::List(items) => Ok(items),
            Self::Text(s) => Ok(vec![s]),
            other => Err(other.mismatch(key, "list of strings")),
        }
    }

    pub(crate) fn bias_map(self, key: OptionKey) -> Result<BTreeMap<String, i64>> {
        let map = match self {
            Self::Map(map) => map,
            other => return Err(other.mismatch(key, "map of token ids to integers")),
        };
        if let Some((token, bias)) = map.iter().find(|(_, b)| !(-100..=100).contains(*b)) {
            return Err(ChorusError::InvalidValue {
                key: key.as_str().to_string(),
                reason: format!("bias {} for token {} is outside [-100, 100]", bias, token),
            });
        }
        Ok(map)
    }

    pub(crate) fn response_format(self, key: OptionKey) -> Result<ResponseFormat> {
        let format = self.text(key)?;
        if !RESPONSE_FORMATS.contains(&format.as_str()) {
            return Err(ChorusError::InvalidValue {
                key: key.as_str().to_string(),
                reason: format!("expected one of {:?}, got \"{}\"", RESPONSE_FORMATS, format),
            });
        }
        Ok(ResponseFormat { kind: format })
    }
}

fn out_of_range<T: fmt::Display>(key: OptionKey, value: T, min: T, max: T) -> ChorusError {
    ChorusError::InvalidValue {
        key: key.as_str().to_string(),
        reason: format!("{} is outside [{}, {}]", value, min, max),
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for OptionValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<Vec<&str>> for OptionValue {
    fn from(value: Vec<&str>) -> Self {
        Self::List(value.into_iter().map(str::to_string).collect())
    }
}

impl From<BTreeMap<String, i64>> for OptionValue {
    fn from(value: BTreeMap<String, i64>) -> Self {
        Self::Map(value)
    }
}

impl From<HashMap<String, i64>> for OptionValue {
    fn from(value: HashMap<String, i64>) -> Self {
        Self::Map(value.into_iter().collect())
    }
}

/// `{"type": "..."}` wrapper sent for `response_format`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Request body shared by the OpenAI and Mistral dialects: the provider's
/// set options followed by the forced stream flag and the full history.
#[derive(Serialize)]
pub(crate) struct ChatCompletionBody<'a, S: Serialize> {
    #[serde(flatten)]
    pub settings: &'a S,
    pub stream: bool,
    pub messages: Vec<crate::types::WireMessage<'a>>,
}

impl<'a, S: Serialize> ChatCompletionBody<'a, S> {
    pub fn new(settings: &'a S, chat: &'a Chat) -> Self {
        Self {
            settings,
            stream: true,
            messages: chat.all_messages().into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn body(settings: &ModelSettings, chat: &Chat) -> Value {
        serde_json::from_slice(&settings.serialize(chat).unwrap()).unwrap()
    }

    #[test]
    fn test_option_key_parsing() {
        assert_eq!("top_p".parse::<OptionKey>(), Ok(OptionKey::TopP));
        assert_eq!("user_id".parse::<OptionKey>(), Ok(OptionKey::Metadata));
        assert_eq!("bogus_key".parse::<OptionKey>(), Err(UnrecognizedKey));
    }

    #[test]
    fn test_option_value_from_json() {
        assert_eq!(OptionValue::from_json("k", Value::Null).unwrap(), None);
        assert_eq!(
            OptionValue::from_json("k", json!(3)).unwrap(),
            Some(OptionValue::Int(3))
        );
        assert_eq!(
            OptionValue::from_json("k", json!(0.5)).unwrap(),
            Some(OptionValue::Float(0.5))
        );
        assert!(OptionValue::from_json("k", json!([1, 2])).is_err());
        assert_eq!(
            OptionValue::from_json("k", json!({"50256": -100})).unwrap(),
            Some(OptionValue::Map(BTreeMap::from([("50256".to_string(), -100)])))
        );
    }

    #[test]
    fn test_int_accepted_for_float_option() {
        let mut settings = ModelSettings::new(ApiType::OpenAI, "gpt-4o");
        settings.set("temperature", 1).unwrap();
        assert_eq!(body(&settings, &Chat::new())["temperature"], json!(1.0));
    }

    #[test]
    fn test_unknown_key_error_names_api() {
        let mut settings = ModelSettings::new(ApiType::Mistral, "mistral-small");
        let err = settings.set("logprobs", true).unwrap_err();
        assert!(matches!(
            err,
            ChorusError::UnknownOption { api: "mistral", ref key } if key == "logprobs"
        ));
    }

    #[test]
    fn test_every_variant_forces_stream() {
        for api in [ApiType::OpenAI, ApiType::Mistral, ApiType::Anthropic] {
            let settings = ModelSettings::new(api, "m");
            assert_eq!(body(&settings, &Chat::new())["stream"], json!(true));
            assert_eq!(settings.api_type(), api);
        }
    }

    #[test]
    fn test_empty_chat_serializes_empty_message_list() {
        let settings = ModelSettings::new(ApiType::OpenAI, "gpt-4o");
        assert_eq!(body(&settings, &Chat::new())["messages"], json!([]));
    }
}
