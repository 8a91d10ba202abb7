use anyhow::{Context, Result};
use chorus_llm::{Dispatch, ModelDefinition, MultiClient};
use std::collections::BTreeMap;
use std::io::Write;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chorus_example::config::{Config, LoggingConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load().context("Failed to load configuration")?;
    init_logging(&config.logging);

    if config.models.is_empty() {
        anyhow::bail!("No models configured; add at least one [[models]] entry");
    }

    let mut client = MultiClient::new().with_options(config.dispatch.clone().into());
    for model in config.models {
        let name = model.name.clone();
        let definition = model
            .resolve()
            .with_context(|| format!("Invalid model entry '{}'", name))?
            .into_definition()
            .with_context(|| format!("Invalid options for model '{}'", name))?;

        tracing::info!(
            name = %definition.name,
            api = %definition.api_type(),
            model = definition.settings.model(),
            "registered model"
        );
        client.add_model_definition(definition);
    }

    if let Some(system) = &config.chat.system_message {
        client.chat_mut().set_system_message(system.as_str());
    }

    for prompt in &config.chat.prompts {
        println!("> {}", prompt);

        let mut dispatch = client
            .dispatch_with_prompt(prompt.as_str(), "")
            .context("Failed to dispatch prompt")?;

        let token = dispatch.cancellation_token();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        });

        let responses = collect_responses(&mut dispatch, client.definitions()).await?;
        ctrl_c.abort();

        // First provider, in definition order, with something to say
        match responses.into_values().find(|text| !text.trim().is_empty()) {
            Some(text) => client.chat_mut().add_assistant_message(text),
            None => tracing::warn!(prompt = %prompt, "no provider produced a response"),
        }

        if dispatch.is_cancelled() {
            tracing::info!("cancelled, skipping remaining prompts");
            break;
        }
    }

    println!("\n{}", client);
    Ok(())
}

/// Drain a dispatch, printing per-provider progress, and return the full
/// text received from each provider keyed by definition index
async fn collect_responses(
    dispatch: &mut Dispatch,
    definitions: &[ModelDefinition],
) -> Result<BTreeMap<usize, String>> {
    let mut responses: BTreeMap<usize, String> = BTreeMap::new();
    let mut stderr = std::io::stderr();

    while let Some(chunk) = dispatch.next().await {
        let name = definitions
            .get(chunk.index)
            .map(|d| d.name.as_str())
            .unwrap_or("?");

        if let Some(error) = &chunk.error {
            tracing::error!(provider = name, error = %error, "provider failed");
            continue;
        }

        let text = responses.entry(chunk.index).or_default();
        text.push_str(&chunk.delta);

        let progress: Vec<String> = definitions
            .iter()
            .enumerate()
            .map(|(i, d)| format!("{}: {}", d.name, responses.get(&i).map_or(0, |t| t.chars().count())))
            .collect();
        write!(stderr, "\r{} chars", progress.join(" | "))?;
        stderr.flush()?;
    }
    writeln!(stderr)?;

    for (index, text) in &responses {
        if let Some(definition) = definitions.get(*index) {
            println!("\n== {} ==\n{}", definition.name, text.trim());
        }
    }

    Ok(responses)
}

fn init_logging(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }
}
