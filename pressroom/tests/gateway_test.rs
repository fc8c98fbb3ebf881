use std::sync::Arc;
use std::time::Duration;

use mockito::Matcher;
use pressroom::llm::remote::RemoteLlmProvider;
use pressroom::llm::{LlmProvider, ModelGateway, RetryPolicy, Role};

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
    }
}

fn gateway_for(url: String, attempts: u32) -> ModelGateway {
    let provider: Arc<dyn LlmProvider> = Arc::new(RemoteLlmProvider::new(url, "fake-api-key", "gpt-4o-mini"));
    ModelGateway::new(Some(provider)).with_retry(fast_retry(attempts))
}

#[tokio::test]
async fn gateway_prepends_role_prompt_and_returns_reply() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::Regex("specialized fact-checking agent".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"model": "gpt-4o-mini", "choices": [{"message": {"role": "assistant", "content": "No significant issues."}}]}"#)
        .create_async()
        .await;

    let gateway = gateway_for(server.url(), 3);
    assert!(gateway.is_available());

    let generation = gateway.generate(Role::FactChecker, "check this").await;
    assert!(!generation.fallback);
    assert_eq!(generation.text, "No significant issues.");

    mock.assert_async().await;
}

#[tokio::test]
async fn gateway_retries_then_falls_back() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .with_status(503)
        .with_body("busy")
        .expect(3)
        .create_async()
        .await;

    let gateway = gateway_for(server.url(), 3);
    let generation = gateway.generate(Role::Writer, "write about NewCo").await;

    assert!(generation.fallback);
    assert!(generation.text.starts_with("# Breaking News"));

    mock.assert_async().await;
}

#[tokio::test]
async fn gateway_without_credential_never_calls_out() {
    let gateway = ModelGateway::offline();
    let generation = gateway.generate(Role::Researcher, "NewCo launches LLM API").await;

    assert!(generation.fallback);
    assert!(generation.text.contains("Key Facts and Findings"));
    assert!(generation.text.contains("NewCo launches LLM API"));
}
