/// OpenAI adapters
///
/// `OpenAiEmbedder` calls /v1/embeddings and `OpenAiChat` calls
/// /v1/chat/completions. Both share the caller's HTTP client, which carries the
/// request timeout.
use reqwest::Client as HttpClient;
use serde_json::json;

use crate::{
    error::{AppError, AppResult},
    models::{ChatCompletionResponse, ChatMessage, EmbeddingResponse},
    services::providers::{CompletionProvider, EmbeddingProvider},
};

const SYSTEM_PROMPT: &str = "You are a movie expert that suggests personalized movies.";
const CHAT_TEMPERATURE: f32 = 0.7;

async fn error_for_status(response: reqwest::Response) -> AppResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(AppError::ExternalApi(format!(
        "OpenAI API returned status {}: {}",
        status, body
    )))
}

#[derive(Clone)]
pub struct OpenAiEmbedder {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(http_client: HttpClient, api_key: String, api_url: String, model: String) -> Self {
        Self {
            http_client,
            api_key,
            api_url,
            model,
        }
    }

    fn parse_response(response: EmbeddingResponse) -> AppResult<Vec<f32>> {
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AppError::ExternalApi("No embedding in OpenAI response".to_string()))
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Cannot embed empty text".to_string(),
            ));
        }

        let url = format!("{}/v1/embeddings", self.api_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "input": text,
            }))
            .send()
            .await?;

        let response: EmbeddingResponse = error_for_status(response).await?.json().await?;
        let embedding = Self::parse_response(response)?;

        tracing::debug!(
            model = %self.model,
            dimension = embedding.len(),
            "Embedding generated"
        );

        Ok(embedding)
    }

    fn name(&self) -> &'static str {
        "openai-embeddings"
    }
}

#[derive(Clone)]
pub struct OpenAiChat {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model: String,
}

impl OpenAiChat {
    pub fn new(http_client: HttpClient, api_key: String, api_url: String, model: String) -> Self {
        Self {
            http_client,
            api_key,
            api_url,
            model,
        }
    }

    fn messages(prompt: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: "system".to_string(),
                content: Some(SYSTEM_PROMPT.to_string()),
            },
            ChatMessage {
                role: "user".to_string(),
                content: Some(prompt.to_string()),
            },
        ]
    }

    fn parse_response(response: ChatCompletionResponse) -> AppResult<String> {
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::ExternalApi("No content in OpenAI completion".to_string()))
    }
}

#[async_trait::async_trait]
impl CompletionProvider for OpenAiChat {
    async fn complete(&self, prompt: &str) -> AppResult<String> {
        let url = format!("{}/v1/chat/completions", self.api_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": Self::messages(prompt),
                "temperature": CHAT_TEMPERATURE,
            }))
            .send()
            .await?;

        let response: ChatCompletionResponse = error_for_status(response).await?.json().await?;
        let content = Self::parse_response(response)?;

        tracing::info!(
            model = %self.model,
            chars = content.len(),
            provider = "openai",
            "Completion received"
        );

        Ok(content)
    }

    fn name(&self) -> &'static str {
        "openai-chat"
    }
}
