pub mod types;
pub mod error;
pub mod chat;
pub mod config;
pub mod settings;
pub mod definition;
pub mod streaming;
pub mod buffer_utils;
pub mod client;

pub use error::{ChorusError, Result};
pub use chat::Chat;
pub use config::{ApiSettings, ApiType, DefinitionConfig};
pub use settings::{
    AnthropicMetadata, AnthropicSettings, MistralSettings, ModelSettings, OpenAISettings,
    OptionKey, OptionValue, ANTHROPIC_DEFAULT_MAX_TOKENS,
};
pub use definition::{ModelDefinition, PreparedRequest};
pub use streaming::{extract_delta, DeltaChunk, DeltaParser};
pub use buffer_utils::{CircularLineBuffer, SseLineParser};
pub use client::{Dispatch, DispatchOptions, MultiClient};
pub use types::{Message, MessageKind};

// Re-exported so callers can cancel from their own tasks without a direct dependency
pub use tokio_util::sync::CancellationToken;
