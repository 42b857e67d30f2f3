//! OpenAI-compatible Embedding API client

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::config::EmbeddingConfig;
use super::embedder::{check_output, ensure_non_blank, truncate_chars, Embedder, EmbedderInfo};
use super::error::{SearchError, SearchResult};

/// OpenAI-compatible embedding API client
pub struct EmbeddingClient {
    config: EmbeddingConfig,
    client: Client,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    /// Only sent for models that support it (e.g. text-embedding-3-*)
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl EmbeddingClient {
    /// Create a new embedding client
    pub fn new(config: EmbeddingConfig) -> SearchResult<Self> {
        config.validate()?;
        let api_key = config.get_api_key()?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(SearchError::Http)?;

        Ok(Self {
            config,
            client,
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.config.api_base.trim_end_matches('/'))
    }

    async fn embed_chunk(&self, texts: &[String]) -> SearchResult<Vec<Vec<f32>>> {
        let max_chars = self.config.max_input_chars;
        let input: Vec<&str> = texts.iter().map(|t| truncate_chars(t, max_chars)).collect();

        // Other APIs (like DashScope) may reject the dimensions parameter
        let dimensions = if self.config.model.starts_with("text-embedding-3") {
            Some(self.config.dimensions)
        } else {
            None
        };

        let request = EmbeddingRequest {
            model: &self.config.model,
            input,
            dimensions,
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(SearchError::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(SearchError::Http)?;

        if !status.is_success() {
            if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&body) {
                return Err(SearchError::Embedding(error_response.error.message));
            }
            return Err(SearchError::Embedding(format!(
                "API error ({}): {}",
                status, body
            )));
        }

        let response: EmbeddingResponse = serde_json::from_str(&body)?;

        // Sort by index to ensure correct order
        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        let vectors: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();

        check_output(&vectors, texts.len(), self.config.dimensions)?;
        Ok(vectors)
    }
}

impl Embedder for EmbeddingClient {
    fn info(&self) -> EmbedderInfo {
        EmbedderInfo {
            name: format!(
                "openai:{}@{}#c{}",
                self.config.model,
                self.endpoint(),
                self.config.max_input_chars
            ),
            dimension: self.config.dimensions,
        }
    }

    fn embed_batch<'a>(
        &'a self,
        texts: &'a [String],
    ) -> BoxFuture<'a, SearchResult<Vec<Vec<f32>>>> {
        Box::pin(async move {
            if texts.is_empty() {
                return Ok(vec![]);
            }
            ensure_non_blank(texts)?;

            let mut all_embeddings = Vec::with_capacity(texts.len());
            for batch in texts.chunks(self.config.batch_size) {
                let batch_embeddings = self.embed_chunk(batch).await?;
                all_embeddings.extend(batch_embeddings);
            }
            log::debug!(
                "[Embedding] Embedded {} texts with {}",
                texts.len(),
                self.config.model
            );
            Ok(all_embeddings)
        })
    }
}
