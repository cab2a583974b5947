//! ============================================================================
//! Embedding Service - Vector embeddings for semantic memory search
//! ============================================================================
//! Generates 768-dimensional text embeddings with Gemini's embedContent API.
//! Every response is normalized into a single `Vec<f32>`; anything else is
//! an explicit `MemoryError::Embedding`. No retries.
//! ============================================================================

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MemoryConfig;
use crate::types::{EmbeddingIntent, MemoryError, Result, EMBEDDING_DIM};

/// Text + intent -> fixed-length vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str, intent: EmbeddingIntent) -> Result<Vec<f32>>;
}

/// Embedding service backed by the Gemini API
pub struct GeminiEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'static str,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: Option<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct ErrorDetail {
    message: String,
    status: Option<String>,
}

impl GeminiEmbedder {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            model,
        }
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::new(
            config.api_key.clone(),
            config.embedding_base_url.clone(),
            config.embedding_model.clone(),
        )
    }

    /// Get the current model name
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:embedContent", self.base_url, self.model)
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str, intent: EmbeddingIntent) -> Result<Vec<f32>> {
        debug!(
            "Embedding {} chars as {}",
            text.chars().count(),
            intent.task_type()
        );

        let request = EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: Content {
                parts: [Part { text }],
            },
            task_type: intent.task_type(),
            output_dimensionality: EMBEDDING_DIM,
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                MemoryError::Embedding(format!("Failed to send embedding request: {}", e))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            MemoryError::Embedding(format!("Failed to read response body: {}", e))
        })?;

        parse_response(status, &body)
    }
}

/// Normalize one embedContent response body into a vector
fn parse_response(status: StatusCode, body: &str) -> Result<Vec<f32>> {
    if !status.is_success() {
        if let Ok(error) = serde_json::from_str::<ErrorResponse>(body) {
            return Err(MemoryError::Embedding(format!(
                "Embedding API error ({}): {}",
                status, error.error.message
            )));
        }
        return Err(MemoryError::Embedding(format!(
            "Embedding API error ({}): {}",
            status, body
        )));
    }

    let parsed: EmbedContentResponse = serde_json::from_str(body).map_err(|e| {
        MemoryError::Embedding(format!("Failed to parse embedding response: {}", e))
    })?;

    let values = parsed
        .embedding
        .map(|e| e.values)
        .ok_or_else(|| MemoryError::Embedding("No embedding returned".to_string()))?;

    if values.len() != EMBEDDING_DIM {
        return Err(MemoryError::Embedding(format!(
            "Expected {} dimensions, got {}",
            EMBEDDING_DIM,
            values.len()
        )));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_with(len: usize) -> String {
        let values: Vec<f32> = (0..len).map(|i| i as f32 / len as f32).collect();
        serde_json::json!({ "embedding": { "values": values } }).to_string()
    }

    #[test]
    fn test_endpoint() {
        let embedder = GeminiEmbedder::new(
            "test-key".to_string(),
            "https://example.test/v1beta".to_string(),
            "embed-model".to_string(),
        );
        assert_eq!(
            embedder.endpoint(),
            "https://example.test/v1beta/models/embed-model:embedContent"
        );
        assert_eq!(embedder.model(), "embed-model");
    }

    #[test]
    fn test_request_shape() {
        let request = EmbedContentRequest {
            model: "models/m".to_string(),
            content: Content {
                parts: [Part { text: "hello" }],
            },
            task_type: EmbeddingIntent::Query.task_type(),
            output_dimensionality: EMBEDDING_DIM,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(json["outputDimensionality"], 768);
        assert_eq!(json["content"]["parts"][0]["text"], "hello");
    }

    #[test]
    fn test_parse_ok() {
        let vector = parse_response(StatusCode::OK, &body_with(EMBEDDING_DIM)).unwrap();
        assert_eq!(vector.len(), EMBEDDING_DIM);
    }

    #[test]
    fn test_parse_wrong_dimension() {
        let err = parse_response(StatusCode::OK, &body_with(3)).unwrap_err();
        assert!(matches!(err, MemoryError::Embedding(_)));
    }

    #[test]
    fn test_parse_missing_embedding() {
        let err = parse_response(StatusCode::OK, "{}").unwrap_err();
        assert!(err.to_string().contains("No embedding returned"));
    }

    #[test]
    fn test_parse_api_error() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        let err = parse_response(StatusCode::BAD_REQUEST, body).unwrap_err();
        assert!(err.to_string().contains("API key not valid"));
    }
}
