use crate::llm::client::LLMClient;
use crate::types::{AppError, Result};
use crate::utils::http::{check_status, request_timeout};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Chat completions client for OpenRouter and other OpenAI-compatible APIs.
pub struct OpenRouterClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenRouterClient {
    pub fn new(api_key: String, base_url: String, model: String, timeout_secs: f64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout(timeout_secs)?)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }
}

#[async_trait]
impl LLMClient for OpenRouterClient {
    async fn complete(&self, prompt: &str, role_context: &str) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if !role_context.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: role_context,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model: &self.model,
            messages,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let response = check_status("OpenRouter", response).await?;

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| AppError::EmptyResult("No response from OpenRouter".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
