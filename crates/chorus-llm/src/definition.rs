// Model definitions and the request factory

use crate::chat::Chat;
use crate::config::{ApiSettings, ApiType};
use crate::error::{ChorusError, Result};
use crate::settings::ModelSettings;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_VERSION_HEADER: &str = "anthropic-version";
const ANTHROPIC_KEY_HEADER: &str = "x-api-key";

/// One backend to query: a friendly name, credentials and validated settings
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDefinition {
    pub name: String,
    pub api_settings: ApiSettings,
    pub settings: ModelSettings,
}

impl ModelDefinition {
    /// Definition using the provider's default endpoint and only the model
    /// name set
    pub fn new(
        name: impl Into<String>,
        api_type: ApiType,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            api_settings: ApiSettings::new(api_type, api_key),
            settings: ModelSettings::new(api_type, model),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_settings.endpoint = endpoint.into();
        self
    }

    pub fn api_type(&self) -> ApiType {
        self.api_settings.api_type
    }

    /// Build the streaming POST request for `chat`
    pub fn build_request(&self, chat: &Chat) -> Result<PreparedRequest> {
        if self.settings.api_type() != self.api_settings.api_type {
            return Err(ChorusError::UnsupportedApiType(format!(
                "{} settings cannot be sent to a {} endpoint",
                self.settings.api_type(),
                self.api_settings.api_type
            )));
        }

        let endpoint = self.api_settings.resolved_endpoint();
        let url = Url::parse(endpoint).map_err(|e| ChorusError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let api_key = &self.api_settings.api_key;
        match self.api_settings.api_type {
            ApiType::Anthropic => {
                headers.insert(
                    HeaderName::from_static(ANTHROPIC_VERSION_HEADER),
                    HeaderValue::from_static(ANTHROPIC_VERSION),
                );
                if !api_key.is_empty() {
                    headers.insert(HeaderName::from_static(ANTHROPIC_KEY_HEADER), secret(api_key)?);
                }
            }
            ApiType::OpenAI | ApiType::Mistral => {
                if !api_key.is_empty() {
                    headers.insert(AUTHORIZATION, secret(&format!("Bearer {}", api_key))?);
                }
            }
        }

        Ok(PreparedRequest {
            method: Method::POST,
            url,
            headers,
            body: self.settings.serialize(chat)?,
        })
    }
}

fn secret(value: &str) -> Result<HeaderValue> {
    let mut header = HeaderValue::from_str(value)
        .map_err(|_| ChorusError::InvalidHeader("API key contains invalid characters".to_string()))?;
    header.set_sensitive(true);
    Ok(header)
}

/// Transport-ready request produced by [`ModelDefinition::build_request`]
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl PreparedRequest {
    pub fn into_builder(self, client: &reqwest::Client) -> reqwest::RequestBuilder {
        client
            .request(self.method, self.url)
            .headers(self.headers)
            .body(self.body)
    }

    pub fn body_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}
