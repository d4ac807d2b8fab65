//! Client for OpenAI-compatible `/v1/embeddings` endpoints (LM Studio,
//! llama.cpp server, Ollama, OpenAI).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::EmbeddingProvider;
use crate::core::config::EmbeddingSettings;
use crate::core::errors::KnowledgeError;

#[derive(Clone)]
pub struct OpenAiEmbeddingProvider {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

impl OpenAiEmbeddingProvider {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self, KnowledgeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(KnowledgeError::provider)?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone().filter(|key| !key.is_empty()),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Pulls the first `data[].embedding` array out of an embeddings response.
fn parse_embedding_response(payload: &Value) -> Result<Vec<f32>, KnowledgeError> {
    let values = payload["data"]
        .as_array()
        .and_then(|data| data.first())
        .and_then(|item| item["embedding"].as_array())
        .ok_or_else(|| KnowledgeError::Provider("response has no embedding data".to_string()))?;

    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| KnowledgeError::Provider("non-numeric embedding value".to_string()))
        })
        .collect()
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, KnowledgeError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": [text],
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let res = request.send().await.map_err(KnowledgeError::provider)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(KnowledgeError::Provider(format!(
                "embedding request failed ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(KnowledgeError::provider)?;
        parse_embedding_response(&payload)
    }
}
