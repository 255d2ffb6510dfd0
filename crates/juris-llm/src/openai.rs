use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{GenerationParams, LlmProvider, Message};

/// Client for any OpenAI-compatible chat/embeddings API (OpenAI, Groq, vLLM).
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: Option<String>,
    params: GenerationParams,
    label: &'static str,
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("params", &self.params)
            .field("label", &self.label)
            .finish()
    }
}

impl Clone for OpenAiProvider {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            embedding_model: self.embedding_model.clone(),
            params: self.params,
            label: self.label,
        }
    }
}

impl OpenAiProvider {
    #[must_use]
    pub fn new(
        api_key: String,
        mut base_url: String,
        model: String,
        embedding_model: Option<String>,
    ) -> Self {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: crate::http::default_client(),
            api_key,
            base_url,
            model,
            embedding_model,
            params: GenerationParams::default(),
            label: "openai",
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Override the provider label used in logs and errors (e.g. `groq`).
    #[must_use]
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<String, LlmError> {
        let response = self
            .client
            .post(format!("{}/{path}", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let retry_after = retry_after(response.headers());
        let text = response.text().await.map_err(LlmError::Http)?;

        if !status.is_success() {
            tracing::error!(provider = self.label, %status, "API error: {text}");
            return Err(classify_failure(self.label, status, &text, retry_after));
        }

        Ok(text)
    }
}

/// `Retry-After` as whole seconds. HTTP-date values are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Map a non-success HTTP response onto the provider error taxonomy.
///
/// Credential and model errors are deployment faults, not caller faults, so
/// they get their own variants instead of [`LlmError::InvalidRequest`].
fn classify_failure(
    provider: &'static str,
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
) -> LlmError {
    let detail = format!("status {status}");
    match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
            provider,
            retry_after,
        },
        s if s.is_server_error() => LlmError::Unavailable { provider, detail },
        _ if body.contains("content_filter") => LlmError::ContentFiltered { provider },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            LlmError::Unauthorized { provider, detail }
        }
        StatusCode::NOT_FOUND => LlmError::ModelNotFound { provider, detail },
        _ => LlmError::InvalidRequest { provider, detail },
    }
}

impl LlmProvider for OpenAiProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        let api_messages = convert_messages(messages);
        let body = ChatRequest {
            model: &self.model,
            messages: &api_messages,
            max_tokens: self.params.max_tokens,
            temperature: self.params.temperature,
            top_p: self.params.top_p,
        };

        let text = self.post_json("chat/completions", &body).await?;
        let resp: OpenAiChatResponse = serde_json::from_str(&text)?;

        if let Some(ref usage) = resp.usage {
            tracing::debug!(
                provider = self.label,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "chat usage"
            );
        }

        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse {
                provider: self.label,
            })?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(LlmError::ContentFiltered {
                provider: self.label,
            });
        }

        choice
            .message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyResponse {
                provider: self.label,
            })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let model = self
            .embedding_model
            .as_deref()
            .ok_or(LlmError::EmbedUnsupported {
                provider: self.label,
            })?;

        let body = EmbeddingRequest { input: text, model };
        let raw = self.post_json("embeddings", &body).await?;
        let resp: EmbeddingResponse = serde_json::from_str(&raw)?;

        resp.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(LlmError::EmptyResponse {
                provider: self.label,
            })
    }

    fn supports_embeddings(&self) -> bool {
        self.embedding_model.is_some()
    }

    fn name(&self) -> &'static str {
        self.label
    }
}

fn convert_messages(messages: &[Message]) -> Vec<ApiMessage<'_>> {
    messages
        .iter()
        .map(|msg| ApiMessage {
            role: msg.role.as_str(),
            content: &msg.content,
        })
        .collect()
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage<'a>],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_provider(base_url: &str) -> OpenAiProvider {
        OpenAiProvider::new(
            "sk-test-key".into(),
            base_url.into(),
            "gpt-4o-mini".into(),
            Some("text-embedding-3-small".into()),
        )
    }

    /// Spawn a minimal HTTP server that returns a fixed response for each connection.
    async fn spawn_mock_server(responses: Vec<String>) -> (u16, tokio::task::JoinHandle<()>) {
        use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            for resp in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let (reader, mut writer) = stream.split();
                    let mut buf_reader = BufReader::new(reader);
                    let mut content_length = 0usize;
                    let mut line = String::new();
                    loop {
                        line.clear();
                        buf_reader.read_line(&mut line).await.unwrap_or(0);
                        if line == "\r\n" || line == "\n" || line.is_empty() {
                            break;
                        }
                        let lower = line.to_ascii_lowercase();
                        if let Some(v) = lower.strip_prefix("content-length:") {
                            content_length = v.trim().parse().unwrap_or(0);
                        }
                    }
                    let mut body = vec![0u8; content_length];
                    buf_reader.read_exact(&mut body).await.ok();
                    writer.write_all(resp.as_bytes()).await.ok();
                });
            }
        });

        (port, handle)
    }

    fn http_response(status: &str, body: &str) -> String {
        http_response_with_headers(status, "", body)
    }

    /// `extra` is a list of complete header lines, each ending in `\r\n`.
    fn http_response_with_headers(status: &str, extra: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n{extra}Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    #[test]
    fn new_trims_trailing_slashes() {
        let p = test_provider("https://api.groq.com/openai/v1///");
        assert_eq!(p.base_url, "https://api.groq.com/openai/v1");
    }

    #[test]
    fn debug_redacts_api_key() {
        let dbg = format!("{:?}", test_provider("https://api.openai.com/v1"));
        assert!(dbg.contains("<redacted>"));
        assert!(!dbg.contains("sk-test-key"));
    }

    #[test]
    fn label_override() {
        let p = test_provider("https://api.groq.com/openai/v1").with_label("groq");
        assert_eq!(p.name(), "groq");
    }

    #[test]
    fn supports_embeddings_depends_on_model() {
        assert!(test_provider("http://x").supports_embeddings());
        let p = OpenAiProvider::new("k".into(), "http://x".into(), "m".into(), None);
        assert!(!p.supports_embeddings());
    }

    #[test]
    fn classify_failure_maps_statuses() {
        assert!(matches!(
            classify_failure("openai", StatusCode::TOO_MANY_REQUESTS, "", None),
            LlmError::RateLimited { retry_after: None, .. }
        ));
        assert!(matches!(
            classify_failure("openai", StatusCode::BAD_GATEWAY, "", None),
            LlmError::Unavailable { .. }
        ));
        assert!(matches!(
            classify_failure(
                "openai",
                StatusCode::BAD_REQUEST,
                r#"{"error":{"code":"content_filter"}}"#,
                None
            ),
            LlmError::ContentFiltered { .. }
        ));
        for status in [StatusCode::BAD_REQUEST, StatusCode::UNPROCESSABLE_ENTITY] {
            assert!(matches!(
                classify_failure("openai", status, "bad", None),
                LlmError::InvalidRequest { .. }
            ));
        }
    }

    #[test]
    fn bad_key_and_unknown_model_are_not_request_errors() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            assert!(matches!(
                classify_failure("groq", status, "invalid api key", None),
                LlmError::Unauthorized { provider: "groq", .. }
            ));
        }
        assert!(matches!(
            classify_failure("openai", StatusCode::NOT_FOUND, "model_not_found", None),
            LlmError::ModelNotFound { .. }
        ));
    }

    #[test]
    fn retry_after_parses_seconds_only() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, "2".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(2)));
        headers.insert(RETRY_AFTER, "0".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(Duration::ZERO));
        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2026 07:28:00 GMT".parse().unwrap());
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn chat_request_serializes_sampling_params() {
        let msgs = [Message::system("sys"), Message::user("hi")];
        let api = convert_messages(&msgs);
        let body = ChatRequest {
            model: "m",
            messages: &api,
            max_tokens: 2048,
            temperature: 0.3,
            top_p: 0.9,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 2048);
        assert!(json.get("top_p").is_some());
    }

    #[tokio::test]
    async fn chat_returns_first_choice() {
        let body = r#"{"choices":[{"message":{"content":"Under Sec. 46b-36g [1]"},"finish_reason":"stop"}],"usage":{"prompt_tokens":10,"completion_tokens":5}}"#;
        let (port, _h) = spawn_mock_server(vec![http_response("200 OK", body)]).await;
        let p = test_provider(&format!("http://127.0.0.1:{port}"));
        let out = p.chat(&[Message::user("q")]).await.unwrap();
        assert_eq!(out, "Under Sec. 46b-36g [1]");
    }

    #[tokio::test]
    async fn chat_content_filter_finish_reason() {
        let body = r#"{"choices":[{"message":{"content":""},"finish_reason":"content_filter"}]}"#;
        let (port, _h) = spawn_mock_server(vec![http_response("200 OK", body)]).await;
        let p = test_provider(&format!("http://127.0.0.1:{port}"));
        let err = p.chat(&[Message::user("q")]).await.unwrap_err();
        assert!(matches!(err, LlmError::ContentFiltered { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn chat_rate_limited() {
        let (port, _h) =
            spawn_mock_server(vec![http_response("429 Too Many Requests", "{}")]).await;
        let p = test_provider(&format!("http://127.0.0.1:{port}"));
        let err = p.chat(&[Message::user("q")]).await.unwrap_err();
        assert!(matches!(err, LlmError::RateLimited { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn chat_rate_limited_carries_retry_after() {
        let (port, _h) = spawn_mock_server(vec![http_response_with_headers(
            "429 Too Many Requests",
            "Retry-After: 2\r\n",
            "{}",
        )])
        .await;
        let p = test_provider(&format!("http://127.0.0.1:{port}"));
        let err = p.chat(&[Message::user("q")]).await.unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn chat_with_revoked_key_is_unauthorized() {
        let body = r#"{"error":{"message":"Invalid API Key","code":"invalid_api_key"}}"#;
        let (port, _h) =
            spawn_mock_server(vec![http_response("401 Unauthorized", body)]).await;
        let p = test_provider(&format!("http://127.0.0.1:{port}")).with_label("groq");
        let err = p.chat(&[Message::user("q")]).await.unwrap_err();
        assert!(matches!(err, LlmError::Unauthorized { provider: "groq", .. }), "{err:?}");
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn chat_empty_choices() {
        let (port, _h) =
            spawn_mock_server(vec![http_response("200 OK", r#"{"choices":[]}"#)]).await;
        let p = test_provider(&format!("http://127.0.0.1:{port}"));
        let err = p.chat(&[Message::user("q")]).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { .. }));
    }

    #[tokio::test]
    async fn embed_parses_vector() {
        let body = r#"{"data":[{"embedding":[0.1,0.2,0.3]}]}"#;
        let (port, _h) = spawn_mock_server(vec![http_response("200 OK", body)]).await;
        let p = test_provider(&format!("http://127.0.0.1:{port}"));
        let v = p.embed("premarital agreement").await.unwrap();
        assert_eq!(v.len(), 3);
    }

    #[tokio::test]
    async fn embed_without_model_is_unsupported() {
        let p = OpenAiProvider::new("k".into(), "http://127.0.0.1:1".into(), "m".into(), None)
            .with_label("groq");
        let err = p.embed("text").await.unwrap_err();
        assert!(matches!(
            err,
            LlmError::EmbedUnsupported { provider: "groq" }
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transient() {
        let p = test_provider("http://127.0.0.1:1");
        let err = p.chat(&[Message::user("q")]).await.unwrap_err();
        assert!(err.is_transient(), "{err:?}");
    }
}
