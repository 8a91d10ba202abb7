// Provider identity, credentials and serde-friendly definition configuration

use crate::definition::ModelDefinition;
use crate::error::{ChorusError, Result};
use crate::settings::OptionValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const MISTRAL_ENDPOINT: &str = "https://api.mistral.ai/v1/chat/completions";
const ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";

/// Wire family of a provider. Drives the default endpoint, the request body
/// shape and the authentication headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    /// OpenAI or any server speaking the OpenAI chat completions dialect
    OpenAI,
    Mistral,
    Anthropic,
}

impl ApiType {
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::OpenAI => OPENAI_ENDPOINT,
            Self::Mistral => MISTRAL_ENDPOINT,
            Self::Anthropic => ANTHROPIC_ENDPOINT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Mistral => "mistral",
            Self::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiType {
    type Err = ChorusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "mistral" => Ok(Self::Mistral),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(ChorusError::UnsupportedApiType(other.to_string())),
        }
    }
}

/// Credentials and endpoint for one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default)]
    pub api_key: String,
    /// Empty means "use the provider default"
    #[serde(default)]
    pub endpoint: String,
    #[serde(rename = "type")]
    pub api_type: ApiType,
}

impl ApiSettings {
    pub fn new(api_type: ApiType, api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: String::new(),
            api_type,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Endpoint override if one is set, else the provider default
    pub fn resolved_endpoint(&self) -> &str {
        if self.endpoint.is_empty() {
            self.api_type.default_endpoint()
        } else {
            &self.endpoint
        }
    }
}

/// Declarative form of a [`ModelDefinition`], e.g. one entry of a TOML file.
///
/// ```toml
/// name = "Claude"
/// type = "anthropic"
/// api_key = "sk-..."
/// model = "claude-3-opus-20240229"
///
/// [options]
/// temperature = 0.8
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub api_type: ApiType,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub model: String,
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl DefinitionConfig {
    pub fn new(
        name: impl Into<String>,
        api_type: ApiType,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            api_type,
            api_key: api_key.into(),
            endpoint: None,
            model: model.into(),
            options: BTreeMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Build the definition, routing every option through the validated setter
    pub fn into_definition(self) -> Result<ModelDefinition> {
        let mut definition =
            ModelDefinition::new(self.name, self.api_type, self.api_key, self.model);
        if let Some(endpoint) = self.endpoint {
            definition.api_settings.endpoint = endpoint;
        }

        for (key, value) in self.options {
            let value = OptionValue::from_json(&key, value)?;
            definition.settings.apply(&key, value)?;
        }

        Ok(definition)
    }
}
