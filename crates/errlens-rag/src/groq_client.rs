// Groq Cloud LLM client (OpenAI-compatible chat completions)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::llm_client::{LlmClient, LlmError};

#[derive(Debug, Clone)]
pub struct GroqClient {
    client: Client,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl GroqClient {
    const BASE_URL: &'static str = "https://api.groq.com/openai/v1/chat/completions";
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.1,
        }
    }

    /// Create with the key held in env var `var` (normally GROQ_API_KEY)
    pub fn from_env_var(var: &str, model: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = std::env::var(var)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(var.to_string()))?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl LlmClient for GroqClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: "You are a log analysis expert and SRE. Always answer with a single JSON object.",
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: 1024,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response = self
            .client
            .post(Self::BASE_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(LlmError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status, error_text));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ApiError(format!("Failed to parse response: {}", e)))?;
        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::ApiError("No response".to_string()))
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &str {
        "groq"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = GroqClient::new("test-key", "llama-3.3-70b-versatile");
        assert_eq!(client.model(), "llama-3.3-70b-versatile");
        assert_eq!(client.provider(), "groq");
    }

    #[test]
    fn test_missing_key_is_reported() {
        let err = GroqClient::from_env_var("ERRLENS_TEST_KEY_THAT_IS_NOT_SET", "m").unwrap_err();
        assert_eq!(err, LlmError::MissingApiKey("ERRLENS_TEST_KEY_THAT_IS_NOT_SET".into()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_request_asks_for_json() {
        let request = ChatRequest {
            model: "m",
            messages: vec![],
            temperature: 0.1,
            max_tokens: 16,
            response_format: ResponseFormat { kind: "json_object" },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");
    }
}
