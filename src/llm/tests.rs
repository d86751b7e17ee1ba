use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use super::lmstudio::LmStudioProvider;
use super::ollama::OllamaProvider;
use super::provider::{LlmProvider, ProviderError};
use super::service::LlmService;
use super::testing::FakeProvider;
use super::types::{ChatMessage, ChatRequest};
use crate::core::config::RagConfig;
use crate::core::errors::RagError;

/// Answers exactly one HTTP request with `body` and hands back the raw request.
async fn serve_once(status: u16, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let lower = line.to_ascii_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }

        let response = format!(
            "HTTP/1.1 {} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&buf).to_string()
    });

    (format!("http://{}", addr), handle)
}

fn fast_retry_config(attempts: u32) -> RagConfig {
    let mut config = RagConfig::default();
    config.retry.max_attempts = attempts;
    config.retry.initial_backoff_ms = 1;
    config
}

#[tokio::test]
async fn ollama_embed_posts_inputs_and_parses_vectors() {
    let (url, request) = serve_once(200, r#"{"embeddings":[[0.5,1.0],[2.0,-1.5]]}"#).await;
    let provider = OllamaProvider::new(format!("{}/", url));

    let vectors = provider
        .embed(&["a".to_string(), "b".to_string()], "mxbai-embed-large")
        .await
        .unwrap();

    assert_eq!(vectors, vec![vec![0.5, 1.0], vec![2.0, -1.5]]);
    let raw = request.await.unwrap();
    assert!(raw.starts_with("POST /api/embed"));
    assert!(raw.contains("\"model\":\"mxbai-embed-large\""));
    assert!(raw.contains("\"input\":[\"a\",\"b\"]"));
}

#[tokio::test]
async fn ollama_chat_returns_message_content() {
    let (url, request) =
        serve_once(200, r#"{"message":{"role":"assistant","content":"Paris."}}"#).await;
    let provider = OllamaProvider::new(url);

    let request_body = ChatRequest::new(vec![ChatMessage::user("Capital of France?")]);
    let answer = provider.chat(request_body, "llama3").await.unwrap();

    assert_eq!(answer, "Paris.");
    let raw = request.await.unwrap();
    assert!(raw.starts_with("POST /api/chat"));
    assert!(raw.contains("\"stream\":false"));
}

#[tokio::test]
async fn ollama_error_status_is_reported() {
    let (url, _request) = serve_once(500, r#"{"error":"model not found"}"#).await;
    let provider = OllamaProvider::new(url);

    let err = provider
        .embed(&["a".to_string()], "missing-model")
        .await
        .unwrap_err();
    match err {
        ProviderError::Status { status, body, .. } => {
            assert_eq!(status, 500);
            assert!(body.contains("model not found"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn lmstudio_embeddings_are_ordered_by_index() {
    let (url, request) = serve_once(
        200,
        r#"{"data":[{"index":1,"embedding":[2.0]},{"index":0,"embedding":[1.0]}]}"#,
    )
    .await;
    let provider = LmStudioProvider::new(url, Some("sk-test".to_string()));

    let vectors = provider
        .embed(&["first".to_string(), "second".to_string()], "nomic")
        .await
        .unwrap();

    assert_eq!(vectors, vec![vec![1.0], vec![2.0]]);
    let raw = request.await.unwrap();
    assert!(raw.starts_with("POST /v1/embeddings"));
    assert!(raw.to_ascii_lowercase().contains("authorization: bearer sk-test"));
}

#[tokio::test]
async fn lmstudio_chat_without_content_is_a_decode_error() {
    let (url, _request) = serve_once(200, r#"{"choices":[]}"#).await;
    let provider = LmStudioProvider::new(url, None);

    let err = provider
        .chat(ChatRequest::new(vec![ChatMessage::user("hi")]), "local")
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Decode(_)));
}

#[tokio::test]
async fn service_applies_instruction_prefixes() {
    let fake = Arc::new(FakeProvider::new("ok"));
    let service = LlmService::new(fake.clone(), &RagConfig::default());

    service
        .embed_documents(&["Paris is the capital of France.".to_string()])
        .await
        .unwrap();
    service.embed_query("capital?").await.unwrap();

    let inputs = fake.embedded_inputs();
    assert_eq!(inputs[0], "passage: Paris is the capital of France.");
    assert_eq!(inputs[1], "query: capital?");
}

#[tokio::test]
async fn service_batches_document_embeddings() {
    let fake = Arc::new(FakeProvider::new("ok"));
    let mut config = RagConfig::default();
    config.embedding.batch_size = 2;
    let service = LlmService::new(fake.clone(), &config);

    let texts: Vec<String> = (0..5).map(|i| format!("text {}", i)).collect();
    let vectors = service.embed_documents(&texts).await.unwrap();

    assert_eq!(vectors.len(), 5);
    assert_eq!(fake.embed_calls(), 3);
}

#[tokio::test]
async fn single_attempt_surfaces_embedding_error() {
    let fake = Arc::new(FakeProvider::new("ok"));
    fake.fail_next_embeds(1);
    let service = LlmService::new(fake.clone(), &RagConfig::default());

    let err = service.embed_query("anything").await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingService(_)));
    assert_eq!(fake.embed_calls(), 1);
}

#[tokio::test]
async fn retry_recovers_from_transient_failure() {
    let fake = Arc::new(FakeProvider::new("answer"));
    fake.fail_next_chats(1);
    let service = LlmService::new(fake.clone(), &fast_retry_config(3));

    let answer = service
        .chat(ChatRequest::new(vec![ChatMessage::user("hi")]))
        .await
        .unwrap();
    assert_eq!(answer, "answer");
    assert_eq!(fake.chat_requests().len(), 1);
}

#[tokio::test]
async fn chat_failure_is_a_generation_error() {
    let fake = Arc::new(FakeProvider::new("answer"));
    fake.fail_next_chats(5);
    let service = LlmService::new(fake, &fast_retry_config(2));

    let err = service
        .chat(ChatRequest::new(vec![ChatMessage::user("hi")]))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::GenerationService(_)));
}

#[tokio::test(start_paused = true)]
async fn slow_embedding_call_times_out() {
    let fake = Arc::new(FakeProvider::new("ok").with_embed_delay(Duration::from_secs(120)));
    let mut config = RagConfig::default();
    config.embedding.timeout_secs = 1;
    let service = LlmService::new(fake, &config);

    let err = service.embed_query("slow").await.unwrap_err();
    match err {
        RagError::EmbeddingService(message) => assert!(message.contains("timed out")),
        other => panic!("unexpected error: {:?}", other),
    }
}

struct RejectingProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl LlmProvider for RejectingProvider {
    fn name(&self) -> &str {
        "rejecting"
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }

    async fn chat(&self, _request: ChatRequest, _model_id: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Status {
            provider: "rejecting",
            status: 404,
            body: "model not found".to_string(),
        })
    }

    async fn embed(
        &self,
        _inputs: &[String],
        _model_id: &str,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Decode("missing field `embeddings`".to_string()))
    }
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let provider = Arc::new(RejectingProvider {
        calls: AtomicUsize::new(0),
    });
    let service = LlmService::new(provider.clone(), &fast_retry_config(4));

    let err = service
        .chat(ChatRequest::new(vec![ChatMessage::user("hi")]))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("404"));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

    let err = service.embed_query("hi").await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingService(_)));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn provider_error_retry_classification() {
    let status = |status| ProviderError::Status {
        provider: "test",
        status,
        body: String::new(),
    };
    assert!(status(503).is_retryable());
    assert!(status(429).is_retryable());
    assert!(!status(400).is_retryable());
    assert!(!ProviderError::Decode("bad json".to_string()).is_retryable());
}

struct ShortProvider;

#[async_trait]
impl LlmProvider for ShortProvider {
    fn name(&self) -> &str {
        "short"
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(false)
    }

    async fn chat(&self, _request: ChatRequest, _model_id: &str) -> Result<String, ProviderError> {
        Ok(String::new())
    }

    async fn embed(
        &self,
        _inputs: &[String],
        _model_id: &str,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(vec![vec![f32::NAN]])
    }
}

#[tokio::test]
async fn malformed_embedding_responses_are_rejected() {
    let service = LlmService::new(Arc::new(ShortProvider), &RagConfig::default());

    let wrong_count = service
        .embed_documents(&["a".to_string(), "b".to_string()])
        .await
        .unwrap_err();
    assert!(wrong_count.to_string().contains("expected 2 embeddings"));

    let non_finite = service.embed_query("a").await.unwrap_err();
    assert!(non_finite.to_string().contains("NaN"));
    assert!(!service.health_check().await);
}
