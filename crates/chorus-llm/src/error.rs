use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChorusError {
    #[error("Malformed history: {0}")]
    MalformedHistory(String),

    #[error("No model definitions added to client")]
    NoDefinitions,

    #[error("Unsupported API type: {0}")]
    UnsupportedApiType(String),

    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Unknown option '{key}' for {api} settings")]
    UnknownOption { api: &'static str, key: String },

    #[error("Option '{0}' is required and may not be unset")]
    RequiredFieldNil(String),

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("Stream line exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ChorusError>;
