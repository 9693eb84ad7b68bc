//! Chat-completions client for OpenAI-compatible endpoints (Groq, OpenAI, Ollama).

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use crmquery_core::config::LlmConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::llm::{CompletionRequest, LlmClient};

#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

impl OpenAiCompatibleClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build llm http client")?;
        Ok(Self { client, base_url: base_url.into(), api_key })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let base_url = config
            .resolved_base_url()
            .ok_or_else(|| anyhow!("llm base url is not configured for {:?}", config.provider))?;
        Self::new(base_url, config.api_key.clone(), Duration::from_secs(config.timeout_secs))
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &request.model,
            messages: [
                ChatMessage { role: "system", content: &request.system_prompt },
                ChatMessage { role: "user", content: &request.user_prompt },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let mut builder = self.client.post(self.endpoint()).json(&body);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response = builder.send().await.context("llm request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("llm api error {status}: {body}"));
        }

        let payload: ChatResponse =
            response.json().await.context("llm response was not valid completion json")?;
        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("llm returned no completion choices"))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crmquery_core::config::{AppConfig, LlmProvider};

    use super::OpenAiCompatibleClient;

    #[test]
    fn endpoint_joins_base_url_without_double_slash() {
        let client = OpenAiCompatibleClient::new(
            "https://api.groq.com/openai/v1/",
            None,
            Duration::from_secs(5),
        )
        .expect("client builds");
        assert_eq!(client.endpoint(), "https://api.groq.com/openai/v1/chat/completions");
    }

    #[test]
    fn from_config_uses_provider_default_base_url() {
        let mut config = AppConfig::default().llm;
        config.provider = LlmProvider::OpenAi;
        let client = OpenAiCompatibleClient::from_config(&config).expect("client builds");
        assert_eq!(client.endpoint(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn from_config_requires_base_url_for_ollama() {
        let mut config = AppConfig::default().llm;
        config.provider = LlmProvider::Ollama;
        assert!(OpenAiCompatibleClient::from_config(&config).is_err());

        config.base_url = Some("http://localhost:11434/v1".to_string());
        let client = OpenAiCompatibleClient::from_config(&config).expect("client builds");
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");
    }
}
