//! Ollama-backed [`Embedder`] and server discovery.

use async_trait::async_trait;
use hunter_memory::{EmbedError, Embedder};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A single model entry returned by Ollama's `/api/tags` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaModel {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// Ping the Ollama server and return the list of locally available models.
pub async fn fetch_models(client: &reqwest::Client, base_url: &str) -> Result<Vec<OllamaModel>, String> {
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| format!("Ollama unreachable at {}: {}", url, e))?;
    if !response.status().is_success() {
        return Err(format!("Ollama returned HTTP {}", response.status()));
    }
    let tags: TagsResponse = response
        .json()
        .await
        .map_err(|e| format!("Failed to parse Ollama response: {}", e))?;
    Ok(tags.models)
}

/// `true` when `models` contains `wanted`, with or without a `:tag` suffix.
pub fn has_model(models: &[OllamaModel], wanted: &str) -> bool {
    models
        .iter()
        .any(|m| m.name == wanted || m.name.split(':').next() == Some(wanted))
}

/// Embeds text with a model served by Ollama's `/api/embeddings` endpoint.
///
/// Construct once and share; the underlying HTTP client pools connections.
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), model: model.into(), client }
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let url = format!("{}/api/embeddings", self.base_url.trim_end_matches('/'));
        let body = EmbeddingRequest { model: &self.model, prompt: text };
        let response: EmbeddingResponse = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| EmbedError::Request(e.to_string()))?
            .json()
            .await
            .map_err(|e| EmbedError::BadResponse(e.to_string()))?;
        parse_embedding(response)
    }
}

fn parse_embedding(response: EmbeddingResponse) -> Result<Vec<f32>, EmbedError> {
    if response.embedding.is_empty() {
        return Err(EmbedError::BadResponse("empty embedding".into()));
    }
    Ok(response.embedding)
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>, EmbedError> {
        let vector = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EmbedError::Cancelled),
            result = self.request(text) => result?,
        };
        debug!(model = %self.model, dimension = vector.len(), "embedded text");
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let body = EmbeddingRequest { model: "nomic-embed-text", prompt: "segfault in parser" };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"model": "nomic-embed-text", "prompt": "segfault in parser"}));
    }

    #[test]
    fn empty_embedding_is_a_bad_response() {
        let response: EmbeddingResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(parse_embedding(response), Err(EmbedError::BadResponse(_))));

        let response: EmbeddingResponse = serde_json::from_str(r#"{"embedding": [0.5, -1.25]}"#).unwrap();
        assert_eq!(parse_embedding(response).unwrap(), vec![0.5, -1.25]);
    }

    #[test]
    fn model_match_ignores_tag() {
        let models = vec![
            OllamaModel { name: "llama3:latest".into() },
            OllamaModel { name: "nomic-embed-text:latest".into() },
        ];
        assert!(has_model(&models, "nomic-embed-text"));
        assert!(has_model(&models, "llama3:latest"));
        assert!(!has_model(&models, "mxbai-embed-large"));
    }

    #[tokio::test]
    async fn cancelled_token_wins() {
        let embedder = OllamaEmbedder::with_client(reqwest::Client::new(), "http://127.0.0.1:9", "nomic-embed-text");
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(embedder.embed("x", &cancel).await, Err(EmbedError::Cancelled));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_request_error() {
        let embedder = OllamaEmbedder::with_client(reqwest::Client::new(), "http://127.0.0.1:9", "nomic-embed-text");
        let err = embedder.embed("x", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, EmbedError::Request(_)));
    }
}
