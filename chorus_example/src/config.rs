use chorus_llm::{ApiType, DefinitionConfig, DispatchOptions};
use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub report_errors: bool,
}

fn default_feed_capacity() -> usize {
    DispatchOptions::default().feed_capacity
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            feed_capacity: default_feed_capacity(),
            max_concurrency: None,
            report_errors: false,
        }
    }
}

impl From<DispatchConfig> for DispatchOptions {
    fn from(config: DispatchConfig) -> Self {
        Self {
            feed_capacity: config.feed_capacity,
            max_concurrency: config.max_concurrency,
            report_errors: config.report_errors,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub system_message: Option<String>,
    #[serde(default)]
    pub prompts: Vec<String>,
}

/// One backend entry
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub api_type: String,
    /// Inline key. Takes precedence over `api_key_env`.
    #[serde(default)]
    pub api_key: String,
    /// Name of the environment variable holding the key
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    pub model: String,
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl ModelConfig {
    /// Resolve the API type and key into a library definition config
    pub fn resolve(self) -> Result<DefinitionConfig, ConfigError> {
        let api_type: ApiType = self
            .api_type
            .parse()
            .map_err(|e| ConfigError::Message(format!("model '{}': {}", self.name, e)))?;

        let api_key = match (&self.api_key, &self.api_key_env) {
            (key, _) if !key.is_empty() => key.clone(),
            (_, Some(var)) => std::env::var(var).map_err(|_| {
                ConfigError::Message(format!(
                    "model '{}': {} environment variable is required",
                    self.name, var
                ))
            })?,
            // Keyless local servers
            (_, None) => String::new(),
        };

        Ok(DefinitionConfig {
            name: self.name,
            api_type,
            api_key,
            endpoint: self.endpoint,
            model: self.model,
            options: self.options,
        })
    }
}

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (if ENV is set)
    /// 3. Environment variables prefixed with CHORUS_, nested keys split by
    ///    `__` (e.g. CHORUS_LOGGING__LEVEL=debug)
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("CHORUS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Load config from a specific path (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let builder = ConfigLoader::builder().add_source(File::from(path.as_ref()));

        builder.build()?.try_deserialize()
    }
}
