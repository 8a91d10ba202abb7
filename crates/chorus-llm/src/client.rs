// Multi-provider client and the concurrent dispatch engine

use crate::chat::Chat;
use crate::definition::{ModelDefinition, PreparedRequest};
use crate::error::{ChorusError, Result};
use crate::streaming::{parse_delta_response, DeltaChunk};
use futures::{Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const DEFAULT_FEED_CAPACITY: usize = 64;

/// Tuning for a dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Chunks buffered between providers and the consumer before producers wait
    pub feed_capacity: usize,

    /// Cap on simultaneously open provider streams. `None` opens all at once.
    pub max_concurrency: Option<usize>,

    /// Emit one terminal error chunk for a provider whose stream fails.
    /// Failures are only logged when this is off.
    pub report_errors: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            feed_capacity: DEFAULT_FEED_CAPACITY,
            max_concurrency: None,
            report_errors: false,
        }
    }
}

/// Holds one conversation and the backends it is sent to.
///
/// ```no_run
/// use chorus_llm::{ApiType, ModelDefinition, MultiClient};
///
/// # async fn run() -> chorus_llm::Result<()> {
/// let mut client = MultiClient::new();
/// client.add_model_definition(ModelDefinition::new("GPT", ApiType::OpenAI, "sk-...", "gpt-4o"));
/// client.add_model_definition(ModelDefinition::new("Claude", ApiType::Anthropic, "ak-...", "claude-3-5-sonnet-latest"));
///
/// let mut dispatch = client.dispatch_with_prompt("Why is the sky blue?", "")?;
/// while let Some(chunk) = dispatch.next().await {
///     print!("[{}] {}", chunk.index, chunk.delta);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MultiClient {
    definitions: Vec<ModelDefinition>,
    chat: Chat,
    http: reqwest::Client,
    options: DispatchOptions,
}

impl MultiClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured HTTP client (proxies, timeouts, TLS roots)
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Append a backend. Chunks from it carry its position in this list.
    pub fn add_model_definition(&mut self, definition: ModelDefinition) {
        self.definitions.push(definition);
    }

    pub fn definitions(&self) -> &[ModelDefinition] {
        &self.definitions
    }

    pub fn chat(&self) -> &Chat {
        &self.chat
    }

    pub fn chat_mut(&mut self) -> &mut Chat {
        &mut self.chat
    }

    /// Start over with an empty conversation, dropping the system message too
    pub fn reset_chat(&mut self) {
        self.chat = Chat::new();
    }

    /// Send the conversation to every definition concurrently.
    ///
    /// Every request is built before anything is sent, so a construction
    /// error aborts the whole dispatch. Returns as soon as the provider tasks
    /// are spawned; the returned feed closes once all of them have finished.
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self) -> Result<Dispatch> {
        if self.definitions.is_empty() {
            return Err(ChorusError::NoDefinitions);
        }

        let requests = self
            .definitions
            .iter()
            .map(|definition| definition.build_request(&self.chat))
            .collect::<Result<Vec<_>>>()?;

        let count = requests.len();
        tracing::debug!(count, "starting dispatch");

        let (tx, rx) = mpsc::channel(self.options.feed_capacity.max(1));
        let cancel = CancellationToken::new();
        let limiter = concurrency_limiter(self.options.max_concurrency, count);

        let tasks: Vec<ProviderTask> = requests
            .into_iter()
            .zip(&self.definitions)
            .enumerate()
            .map(|(index, (request, definition))| ProviderTask {
                index,
                name: definition.name.clone(),
                request,
                http: self.http.clone(),
                tx: tx.clone(),
                cancel: cancel.clone(),
                report_errors: self.options.report_errors,
            })
            .collect();
        drop(tx);

        tokio::spawn(async move {
            let mut workers = JoinSet::new();
            for task in tasks {
                workers.spawn(task.run(limiter.clone()));
            }

            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    tracing::warn!(error = %e, "provider task aborted");
                }
            }
            tracing::debug!(count, "dispatch complete");
        });

        Ok(Dispatch { count, rx, cancel })
    }

    /// Append `user` (and then `assistant`, to continue a partial completion)
    /// to the conversation and dispatch it. Empty strings are not appended.
    pub fn dispatch_with_prompt(
        &mut self,
        user: impl Into<String>,
        assistant: impl Into<String>,
    ) -> Result<Dispatch> {
        let user = user.into();
        let assistant = assistant.into();

        if !user.is_empty() {
            self.chat.add_user_message(user);
        }
        if !assistant.is_empty() {
            self.chat.add_assistant_message(assistant);
        }

        self.dispatch()
    }
}

impl fmt::Display for MultiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.chat, f)
    }
}

/// Live feed of one dispatch.
///
/// Chunks from different providers interleave in arrival order; chunks from
/// one provider keep their stream order. Dropping the handle cancels every
/// outstanding stream.
#[derive(Debug)]
pub struct Dispatch {
    count: usize,
    rx: mpsc::Receiver<DeltaChunk>,
    cancel: CancellationToken,
}

impl Dispatch {
    /// Number of providers queried
    pub fn count(&self) -> usize {
        self.count
    }

    /// Next chunk, or `None` once every provider has finished
    pub async fn next(&mut self) -> Option<DeltaChunk> {
        self.rx.recv().await
    }

    /// Stop every provider stream. Chunks already queued are still delivered.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this dispatch, for use from another task
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Stream for Dispatch {
    type Item = DeltaChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<DeltaChunk>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Dispatch {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Semaphore for `max_concurrency`, or `None` when the cap cannot bind
fn concurrency_limiter(max_concurrency: Option<usize>, count: usize) -> Option<Arc<Semaphore>> {
    match max_concurrency {
        Some(limit) if limit < count => Some(Arc::new(Semaphore::new(
            limit.clamp(1, Semaphore::MAX_PERMITS),
        ))),
        _ => None,
    }
}

struct ProviderTask {
    index: usize,
    name: String,
    request: PreparedRequest,
    http: reqwest::Client,
    tx: mpsc::Sender<DeltaChunk>,
    cancel: CancellationToken,
    report_errors: bool,
}

impl ProviderTask {
    async fn run(self, limiter: Option<Arc<Semaphore>>) {
        let _permit = match limiter {
            Some(limiter) => tokio::select! {
                _ = self.cancel.cancelled() => return,
                permit = limiter.acquire_owned() => match permit {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
            },
            None => None,
        };

        let result = tokio::select! {
            _ = self.cancel.cancelled() => {
                tracing::debug!(index = self.index, provider = %self.name, "stream cancelled");
                return;
            }
            result = self.forward_deltas() => result,
        };

        match result {
            Ok(deltas) => {
                tracing::debug!(index = self.index, provider = %self.name, deltas, "stream closed");
            }
            Err(e) => {
                tracing::warn!(index = self.index, provider = %self.name, error = %e, "provider stream failed");
                if self.report_errors {
                    let _ = self.tx.send(DeltaChunk::failed(self.index, e.to_string())).await;
                }
            }
        }
    }

    /// Open the stream and forward its deltas until it ends.
    /// Returns how many deltas were forwarded.
    async fn forward_deltas(&self) -> Result<usize> {
        let response = self
            .request
            .clone()
            .into_builder(&self.http)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(index = self.index, provider = %self.name, %status, "provider returned error status");
        }
        let response = response.error_for_status()?;
        tracing::debug!(index = self.index, provider = %self.name, "stream opened");

        let mut deltas = parse_delta_response(response);
        let mut forwarded = 0;

        while let Some(delta) = deltas.next().await {
            let chunk = DeltaChunk::new(self.index, delta?);
            if self.tx.send(chunk).await.is_err() {
                // consumer went away
                break;
            }
            forwarded += 1;
        }

        Ok(forwarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiType;

    #[test]
    fn test_default_options() {
        let options = DispatchOptions::default();
        assert_eq!(options.feed_capacity, 64);
        assert_eq!(options.max_concurrency, None);
        assert!(!options.report_errors);
    }

    #[test]
    fn test_concurrency_limiter_bounds() {
        assert!(concurrency_limiter(None, 3).is_none());
        assert!(concurrency_limiter(Some(3), 3).is_none());
        assert!(concurrency_limiter(Some(usize::MAX), 3).is_none());
        assert_eq!(concurrency_limiter(Some(2), 3).unwrap().available_permits(), 2);
        assert_eq!(concurrency_limiter(Some(0), 3).unwrap().available_permits(), 1);
    }

    #[tokio::test]
    async fn test_huge_concurrency_cap_dispatches() {
        let mut client = MultiClient::new().with_options(DispatchOptions {
            max_concurrency: Some(usize::MAX),
            ..DispatchOptions::default()
        });
        client.add_model_definition(
            ModelDefinition::new("local", ApiType::OpenAI, "", "m")
                .with_endpoint("http://127.0.0.1:9/v1/chat/completions"),
        );

        let dispatch = client.dispatch().unwrap();
        assert_eq!((&dispatch).count(), 1);
        dispatch.cancel();
    }

    #[tokio::test]
    async fn test_dispatch_without_definitions() {
        let client = MultiClient::new();
        assert!(matches!(client.dispatch(), Err(ChorusError::NoDefinitions)));
    }

    #[tokio::test]
    async fn test_build_failure_aborts_dispatch() {
        let mut client = MultiClient::new();
        client.add_model_definition(ModelDefinition::new("ok", ApiType::OpenAI, "k", "m"));
        client.add_model_definition(
            ModelDefinition::new("bad", ApiType::Mistral, "k", "m").with_endpoint("::nope::"),
        );

        assert!(matches!(
            client.dispatch(),
            Err(ChorusError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_prompt_appends_only_non_empty() {
        let mut client = MultiClient::new();
        // no definitions: the prompt is still recorded before dispatch fails
        assert!(client.dispatch_with_prompt("hello", "").is_err());
        assert!(client.dispatch_with_prompt("", "Once upon").is_err());

        let roles: Vec<_> = client.chat().all_messages().iter().map(|m| m.role()).collect();
        assert_eq!(roles, vec!["user", "assistant"]);
    }

    #[test]
    fn test_display_renders_chat() {
        let mut client = MultiClient::new();
        client.chat_mut().add_user_message("hi");
        assert_eq!(client.to_string(), client.chat().to_string());

        client.reset_chat();
        assert!(client.chat().is_empty());
    }
}
