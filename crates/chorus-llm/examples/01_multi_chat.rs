use anyhow::Result;
use chorus_llm::{ApiType, ModelDefinition, MultiClient};
use std::collections::BTreeMap;

#[tokio::main]
async fn main() -> Result<()> {
    let mut gpt = ModelDefinition::new(
        "GPT-4o",
        ApiType::OpenAI,
        std::env::var("OPENAI_API_KEY")?,
        "gpt-4o",
    );
    gpt.settings.set("temperature", 0.7)?;

    let mut claude = ModelDefinition::new(
        "Claude",
        ApiType::Anthropic,
        std::env::var("ANTHROPIC_API_KEY")?,
        "claude-3-5-sonnet-latest",
    );
    claude.settings.set("max_tokens", 512)?;

    let mut client = MultiClient::new();
    client.add_model_definition(gpt);
    client.add_model_definition(claude);
    client.chat_mut().set_system_message("Answer in one short paragraph.");

    let mut dispatch = client.dispatch_with_prompt("What is the capital of France?", "")?;
    let mut answers: BTreeMap<usize, String> = BTreeMap::new();

    while let Some(chunk) = dispatch.next().await {
        answers.entry(chunk.index).or_default().push_str(&chunk.delta);
    }

    for (index, definition) in client.definitions().iter().enumerate() {
        println!("== {} ==", definition.name);
        println!("{}\n", answers.get(&index).map(String::as_str).unwrap_or("<no response>"));
    }

    Ok(())
}
