use ollama_rs::Ollama;
use ollama_rs::generation::chat::ChatMessage;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::models::ModelOptions;

use crate::error::LlmError;
use crate::provider::{GenerationParams, LlmProvider, Message, Role};

/// Local Ollama backend, usable for both chat and embeddings.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Ollama,
    model: String,
    embedding_model: String,
    params: GenerationParams,
}

impl OllamaProvider {
    #[must_use]
    pub fn new(base_url: &str, model: String, embedding_model: String) -> Self {
        let (host, port) = parse_host_port(base_url);
        Self {
            client: Ollama::new(host, port),
            model,
            embedding_model,
            params: GenerationParams::default(),
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn params(&self) -> GenerationParams {
        self.params
    }

    /// Chat request with the configured length ceiling and sampling attached.
    fn chat_request(&self, messages: &[Message]) -> ChatMessageRequest {
        let options = ModelOptions::default()
            .num_predict(i32::try_from(self.params.max_tokens).unwrap_or(i32::MAX))
            .temperature(self.params.temperature)
            .top_p(self.params.top_p);
        ChatMessageRequest::new(
            self.model.clone(),
            messages.iter().map(convert_message).collect(),
        )
        .options(options)
    }

    /// Check if Ollama is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection to Ollama fails.
    pub async fn health_check(&self) -> Result<(), LlmError> {
        self.client
            .list_local_models()
            .await
            .map_err(|e| LlmError::Unavailable {
                provider: "ollama",
                detail: format!("is it running? {e}"),
            })?;
        Ok(())
    }
}

impl LlmProvider for OllamaProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        let request = self.chat_request(messages);

        let response = self
            .client
            .send_chat_messages(request)
            .await
            .map_err(|e| LlmError::Unavailable {
                provider: "ollama",
                detail: format!("chat request failed: {e}"),
            })?;

        if response.message.content.trim().is_empty() {
            return Err(LlmError::EmptyResponse { provider: "ollama" });
        }
        Ok(response.message.content)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let request = GenerateEmbeddingsRequest::new(
            self.embedding_model.clone(),
            EmbeddingsInput::from(text),
        );

        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| LlmError::Unavailable {
                provider: "ollama",
                detail: format!("embedding request failed: {e}"),
            })?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse { provider: "ollama" })
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

fn convert_message(msg: &Message) -> ChatMessage {
    let text = msg.content.clone();
    match msg.role {
        Role::System => ChatMessage::system(text),
        Role::Assistant => ChatMessage::assistant(text),
        Role::User => ChatMessage::user(text),
    }
}

fn parse_host_port(url: &str) -> (String, u16) {
    let url = url.trim_end_matches('/');
    if let Some(colon_pos) = url.rfind(':') {
        let port_str = &url[colon_pos + 1..];
        if let Ok(port) = port_str.parse::<u16>() {
            let host = url[..colon_pos].to_string();
            return (host, port);
        }
    }
    (url.to_string(), 11434)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_host_port_with_port() {
        let (host, port) = parse_host_port("http://localhost:11434");
        assert_eq!(host, "http://localhost");
        assert_eq!(port, 11434);
    }

    #[test]
    fn parse_host_port_default() {
        let (host, port) = parse_host_port("http://ollama.internal/");
        assert_eq!(host, "http://ollama.internal");
        assert_eq!(port, 11434);
    }

    #[test]
    fn name_and_embeddings() {
        let p = OllamaProvider::new("http://localhost:11434", "llama3".into(), "nomic".into());
        assert_eq!(p.name(), "ollama");
        assert!(p.supports_embeddings());
    }

    #[test]
    fn chat_request_carries_generation_params() {
        let p = OllamaProvider::new("http://localhost:11434", "llama3".into(), "nomic".into())
            .with_params(GenerationParams {
                max_tokens: 512,
                temperature: 0.2,
                top_p: 0.8,
            });
        let request = p.chat_request(&[Message::system("s"), Message::user("q")]);
        assert_eq!(request.model_name, "llama3");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(
            request.options,
            Some(
                ModelOptions::default()
                    .num_predict(512)
                    .temperature(0.2)
                    .top_p(0.8)
            )
        );
    }

    #[test]
    fn default_request_still_bounds_length() {
        let p = OllamaProvider::new("http://localhost:11434", "llama3".into(), "nomic".into());
        let json = serde_json::to_value(p.chat_request(&[Message::user("q")])).unwrap();
        assert_eq!(json["options"]["num_predict"], 2048);
    }

    #[tokio::test]
    async fn embed_with_unreachable_endpoint_is_unavailable() {
        let p = OllamaProvider::new("http://127.0.0.1:1", "m".into(), "e".into());
        let err = p.embed("text").await.unwrap_err();
        assert!(matches!(err, LlmError::Unavailable { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn chat_with_unreachable_endpoint_is_unavailable() {
        let p = OllamaProvider::new("http://127.0.0.1:1", "m".into(), "e".into());
        let err = p.chat(&[Message::user("hi")]).await.unwrap_err();
        assert!(err.is_transient());
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn parse_host_port_round_trips_explicit_port(host in "[a-z]{1,12}", port in 1u16..) {
            let (h, p) = parse_host_port(&format!("http://{host}:{port}"));
            prop_assert_eq!(h, format!("http://{host}"));
            prop_assert_eq!(p, port);
        }
    }
}
