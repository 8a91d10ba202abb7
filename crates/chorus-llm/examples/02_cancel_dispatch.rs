use anyhow::Result;
use chorus_llm::{ApiType, DispatchOptions, ModelDefinition, MultiClient};
use std::io::Write;
use std::time::Duration;

// Streams from two providers and gives up after a few seconds
#[tokio::main]
async fn main() -> Result<()> {
    let mut client = MultiClient::new().with_options(DispatchOptions {
        report_errors: true,
        ..DispatchOptions::default()
    });
    client.add_model_definition(ModelDefinition::new(
        "Mistral",
        ApiType::Mistral,
        std::env::var("MISTRAL_API_KEY")?,
        "mistral-large-latest",
    ));
    client.add_model_definition(ModelDefinition::new(
        "GPT-4o",
        ApiType::OpenAI,
        std::env::var("OPENAI_API_KEY")?,
        "gpt-4o",
    ));

    let mut dispatch = client.dispatch_with_prompt("Write a long poem about the sea.", "")?;

    let token = dispatch.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        token.cancel();
    });

    while let Some(chunk) = dispatch.next().await {
        match chunk.error {
            Some(error) => eprintln!("\n[{}] failed: {}", chunk.index, error),
            None => {
                print!("[{}]{}", chunk.index, chunk.delta);
                std::io::stdout().flush()?;
            }
        }
    }

    println!("\n\nCancelled: {}", dispatch.is_cancelled());
    Ok(())
}
