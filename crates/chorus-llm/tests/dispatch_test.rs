use chorus_llm::{
    ApiType, ChorusError, DeltaChunk, DispatchOptions, ModelDefinition, MultiClient,
};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const SSE_HEADERS: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n";

/// Read one request off the socket and return its body
async fn read_request(socket: &mut TcpStream) -> String {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = socket.read(&mut buf).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);

        let text = String::from_utf8_lossy(&raw);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if raw.len() >= head_end + 4 + content_length {
                return String::from_utf8_lossy(&raw[head_end + 4..]).into_owned();
            }
        }
    }

    String::from_utf8_lossy(&raw).into_owned()
}

async fn bind() -> Option<TcpListener> {
    match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => Some(listener),
        Err(err) if err.kind() == ErrorKind::PermissionDenied => None,
        Err(err) => panic!("failed to bind local test listener: {err}"),
    }
}

/// Serve one SSE response, then close the connection.
/// Resolves the returned receiver with the request body.
async fn start_sse_server(
    events: Vec<&'static str>,
) -> Option<(String, JoinHandle<()>, oneshot::Receiver<String>)> {
    let listener = bind().await?;
    let addr = listener.local_addr().unwrap();
    let (body_tx, body_rx) = oneshot::channel();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let _ = body_tx.send(read_request(&mut socket).await);

        let _ = socket.write_all(SSE_HEADERS).await;
        for ev in events {
            let _ = socket.write_all(ev.as_bytes()).await;
            let _ = socket.flush().await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let _ = socket.shutdown().await;
    });

    Some((format!("http://{addr}/v1/chat/completions"), handle, body_rx))
}

/// Serve one SSE event and then hold the connection open
async fn start_stalled_server(first: &'static str) -> Option<(String, JoinHandle<()>)> {
    let listener = bind().await?;
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;

        let _ = socket.write_all(SSE_HEADERS).await;
        let _ = socket.write_all(first.as_bytes()).await;
        let _ = socket.flush().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    Some((format!("http://{addr}/v1/chat/completions"), handle))
}

async fn start_status_server(status: &'static str) -> Option<(String, JoinHandle<()>)> {
    let listener = bind().await?;
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;

        let body = r#"{"error":{"message":"invalid api key"}}"#;
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    });

    Some((format!("http://{addr}/v1/chat/completions"), handle))
}

/// Endpoint nothing listens on
async fn closed_endpoint() -> Option<String> {
    let listener = bind().await?;
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Some(format!("http://{addr}/v1/chat/completions"))
}

async fn collect(client: &MultiClient) -> Vec<DeltaChunk> {
    let dispatch = client.dispatch().unwrap();
    tokio::time::timeout(Duration::from_secs(10), dispatch.collect::<Vec<_>>())
        .await
        .expect("feed did not close")
}

fn texts_by_index(chunks: &[DeltaChunk]) -> BTreeMap<usize, String> {
    let mut texts = BTreeMap::new();
    for chunk in chunks {
        texts
            .entry(chunk.index)
            .or_insert_with(String::new)
            .push_str(&chunk.delta);
    }
    texts
}

#[tokio::test]
async fn test_merges_two_providers() {
    let Some((openai_url, openai_server, openai_body)) = start_sse_server(vec![
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hello\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\" world\"}}]}\n\n",
        "data: [DONE]\n\n",
    ])
    .await
    else {
        return;
    };
    let Some((anthropic_url, anthropic_server, anthropic_body)) = start_sse_server(vec![
        "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{}}\n\n",
        "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Bon\"}}\n\n",
        "event: ping\ndata: {\"type\":\"ping\"}\n\n",
        "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"jour\"}}\n\n",
        "data: not json at all\n\n",
        "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"!\"}}\n\n",
    ])
    .await
    else {
        return;
    };

    let mut client = MultiClient::new();
    client.add_model_definition(
        ModelDefinition::new("GPT", ApiType::OpenAI, "sk-test", "gpt-4o").with_endpoint(openai_url),
    );
    client.add_model_definition(
        ModelDefinition::new("Claude", ApiType::Anthropic, "ak-test", "claude")
            .with_endpoint(anthropic_url),
    );
    client.chat_mut().set_system_message("be brief");
    client.chat_mut().add_user_message("greet me");

    let chunks = collect(&client).await;

    assert_eq!(chunks.iter().filter(|c| c.index == 0).count(), 2);
    assert_eq!(chunks.iter().filter(|c| c.index == 1).count(), 3);
    assert!(chunks.iter().all(|c| !c.is_error()));

    let texts = texts_by_index(&chunks);
    assert_eq!(texts[&0], "Hello world");
    assert_eq!(texts[&1], "Bonjour!");

    let openai_request: serde_json::Value =
        serde_json::from_str(&openai_body.await.unwrap()).unwrap();
    assert_eq!(openai_request["stream"], true);
    assert_eq!(openai_request["messages"][0]["role"], "system");

    let anthropic_request: serde_json::Value =
        serde_json::from_str(&anthropic_body.await.unwrap()).unwrap();
    assert_eq!(anthropic_request["system"], "be brief");
    assert_eq!(anthropic_request["max_tokens"], 4096);

    openai_server.await.unwrap();
    anthropic_server.await.unwrap();
}

#[tokio::test]
async fn test_dispatch_with_prompt_and_count() {
    let Some((url, server, body)) = start_sse_server(vec![
        "data: {\"choices\":[{\"delta\":{\"content\":\"4\"}}]}\n\n",
        "data: [DONE]\n\n",
    ])
    .await
    else {
        return;
    };

    let mut client = MultiClient::new();
    client.add_model_definition(
        ModelDefinition::new("Mistral", ApiType::Mistral, "", "mistral-small").with_endpoint(url),
    );

    let mut dispatch = client.dispatch_with_prompt("2+2?", "The answer is").unwrap();
    assert_eq!((&dispatch).count(), 1);

    let chunk = dispatch.next().await.unwrap();
    assert_eq!(chunk, DeltaChunk::new(0, "4"));
    assert!(dispatch.next().await.is_none());

    let request: serde_json::Value = serde_json::from_str(&body.await.unwrap()).unwrap();
    assert_eq!(
        request["messages"],
        serde_json::json!([
            {"role": "user", "content": "2+2?"},
            {"role": "assistant", "content": "The answer is"}
        ])
    );
    server.await.unwrap();
}

#[tokio::test]
async fn test_no_definitions() {
    let client = MultiClient::new();
    assert!(matches!(client.dispatch(), Err(ChorusError::NoDefinitions)));
}

#[tokio::test]
async fn test_transport_failure_is_silent() {
    let Some(dead) = closed_endpoint().await else {
        return;
    };
    let Some((url, server, _)) = start_sse_server(vec![
        "data: {\"choices\":[{\"delta\":{\"content\":\"still here\"}}]}\n\n",
    ])
    .await
    else {
        return;
    };

    let mut client = MultiClient::new();
    client.add_model_definition(
        ModelDefinition::new("Down", ApiType::OpenAI, "k", "m").with_endpoint(dead),
    );
    client.add_model_definition(
        ModelDefinition::new("Up", ApiType::OpenAI, "k", "m").with_endpoint(url),
    );

    let chunks = collect(&client).await;
    assert_eq!(chunks, vec![DeltaChunk::new(1, "still here")]);
    server.await.unwrap();
}

#[tokio::test]
async fn test_report_errors_emits_terminal_chunk() {
    let Some(dead) = closed_endpoint().await else {
        return;
    };
    let Some((unauthorized, server)) = start_status_server("401 Unauthorized").await else {
        return;
    };

    let mut client = MultiClient::new().with_options(DispatchOptions {
        report_errors: true,
        ..DispatchOptions::default()
    });
    client.add_model_definition(
        ModelDefinition::new("Down", ApiType::OpenAI, "k", "m").with_endpoint(dead),
    );
    client.add_model_definition(
        ModelDefinition::new("Denied", ApiType::Anthropic, "bad", "claude")
            .with_endpoint(unauthorized),
    );

    let mut chunks = collect(&client).await;
    chunks.sort_by_key(|c| c.index);

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].index, 0);
    assert_eq!(chunks[1].index, 1);
    assert!(chunks.iter().all(|c| c.is_error() && c.delta.is_empty()));
    assert!(chunks[1].error.as_deref().unwrap_or_default().contains("401"));
    server.await.unwrap();
}

#[tokio::test]
async fn test_max_concurrency_still_drains_all() {
    let mut servers = Vec::new();
    let mut client = MultiClient::new().with_options(DispatchOptions {
        max_concurrency: Some(1),
        feed_capacity: 1,
        ..DispatchOptions::default()
    });

    for _ in 0..3 {
        let Some((url, server, _)) = start_sse_server(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n",
            "data: [DONE]\n\n",
        ])
        .await
        else {
            return;
        };
        servers.push(server);
        client.add_model_definition(
            ModelDefinition::new("GPT", ApiType::OpenAI, "k", "m").with_endpoint(url),
        );
    }

    let chunks = collect(&client).await;
    let texts = texts_by_index(&chunks);
    assert_eq!(texts.len(), 3);
    assert!(texts.values().all(|t| t == "ab"));

    for server in servers {
        server.await.unwrap();
    }
}

#[tokio::test]
async fn test_cancel_closes_feed() {
    let Some((url, server)) =
        start_stalled_server("data: {\"choices\":[{\"delta\":{\"content\":\"first\"}}]}\n\n").await
    else {
        return;
    };

    let mut client = MultiClient::new();
    client.add_model_definition(
        ModelDefinition::new("Slow", ApiType::OpenAI, "k", "m").with_endpoint(url),
    );

    let mut dispatch = client.dispatch().unwrap();
    let first = tokio::time::timeout(Duration::from_secs(10), dispatch.next())
        .await
        .expect("first chunk never arrived");
    assert_eq!(first, Some(DeltaChunk::new(0, "first")));

    dispatch.cancel();
    assert!(dispatch.is_cancelled());

    let rest = tokio::time::timeout(Duration::from_secs(10), dispatch.next())
        .await
        .expect("feed stayed open after cancel");
    assert_eq!(rest, None);

    server.abort();
}
