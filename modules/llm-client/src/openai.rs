use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::traits::{ChatModel, Message, TextEmbedder};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible chat + embeddings client. Works against any endpoint
/// that speaks the /chat/completions and /embeddings wire format.
#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
    model: String,
    embedding_model: String,
}

impl OpenAi {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
            base_url: OPENAI_API_URL.to_string(),
            model: model.to_string(),
            embedding_model: "text-embedding-3-large".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_embedding_model(mut self, model: &str) -> Self {
        self.embedding_model = model.to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %request.model, "chat request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("chat API error ({}): {}", status, error_text));
        }

        Ok(response.json().await?)
    }

    async fn embeddings(&self, input: serde_json::Value) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = EmbeddingRequest {
            model: self.embedding_model.clone(),
            input,
        };

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("embedding API error ({}): {}", status, error_text));
        }

        let mut embed_response: EmbeddingResponse = response.json().await?;
        // The API does not guarantee order; index is authoritative.
        embed_response.data.sort_by_key(|d| d.index);
        Ok(embed_response.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl ChatModel for OpenAi {
    async fn complete(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature,
            max_tokens,
        };

        let response = self.chat(&request).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("empty chat completion"))
    }
}

#[async_trait]
impl TextEmbedder for OpenAi {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self
            .embeddings(serde_json::Value::String(text.to_string()))
            .await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("embedding API returned no vectors"))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let count = texts.len();
        let vectors = self.embeddings(serde_json::json!(texts)).await?;
        if vectors.len() != count {
            return Err(anyhow!(
                "embedding API returned {} vectors for {} inputs",
                vectors.len(),
                count
            ));
        }
        Ok(vectors)
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}
