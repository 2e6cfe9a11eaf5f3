//! One shared provider serving overlapping calls.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use switchboard::transport::mock::ScriptedTransport;
use switchboard::{
    get_provider_with_transport, CallOptions, ChatMessage, CompletionRequest, HttpResponse,
    LlmConfig, LlmProvider, ProviderError, ProviderKind,
};

/// Echoes the user's message back after a delay taken from the message itself.
fn echo_transport() -> Arc<ScriptedTransport> {
    ScriptedTransport::new(|request| {
        let prompt = request.body["messages"][0]["content"].as_str().unwrap_or_default().to_string();
        let body = json!({
            "message": { "role": "assistant", "content": format!("echo: {prompt}") },
            "done": true,
            "done_reason": "stop"
        });
        Ok(HttpResponse { status: 200, body: body.to_string() })
    })
    .with_delay(|request| {
        let prompt = request.body["messages"][0]["content"].as_str().unwrap_or_default();
        let millis = prompt.trim_start_matches("request ").parse::<u64>().unwrap_or(0);
        Duration::from_millis((10 - millis % 10) * 5)
    })
    .shared()
}

fn request(i: u64) -> CompletionRequest {
    CompletionRequest::new("llama3.1", vec![ChatMessage::user(format!("request {i}"))])
}

#[tokio::test]
async fn concurrent_calls_get_their_own_responses() -> anyhow::Result<()> {
    let transport = echo_transport();
    let config = LlmConfig::new(ProviderKind::Ollama, "llama3.1");
    let provider = get_provider_with_transport(&config, transport.clone())?;

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let provider = Arc::clone(&provider);
            tokio::spawn(async move { (i, provider.completion(request(i)).await) })
        })
        .collect();

    for handle in handles {
        let (i, response) = handle.await?;
        assert_eq!(response?.message(), Some(format!("echo: request {i}").as_str()));
    }
    assert_eq!(transport.call_count(), 20);
    Ok(())
}

#[tokio::test]
async fn timeout_of_one_call_leaves_others_alone() -> anyhow::Result<()> {
    let transport = echo_transport();
    let config = LlmConfig::new(ProviderKind::Ollama, "llama3.1");
    let provider = get_provider_with_transport(&config, transport)?;

    // "request 0" is the slowest (50ms); give it 5ms.
    let slow = provider.completion_with(
        request(0),
        CallOptions::new().with_timeout(Duration::from_millis(5)),
    );
    let fast = provider.completion(request(9));
    let (slow, fast) = tokio::join!(slow, fast);

    assert_eq!(slow.unwrap_err(), ProviderError::Timeout(Duration::from_millis(5)));
    assert_eq!(fast?.message(), Some("echo: request 9"));
    Ok(())
}
