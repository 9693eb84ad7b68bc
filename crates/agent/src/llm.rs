use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

/// One chat completion: fixed system prompt, user prompt and sampling bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Replays a fixed completion (or failure) and keeps every request it saw.
pub struct ScriptedLlmClient {
    reply: std::result::Result<String, String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlmClient {
    pub fn replying(text: impl Into<String>) -> Self {
        Self { reply: Ok(text.into()), requests: Mutex::new(Vec::new()) }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self { reply: Err(message.into()), requests: Mutex::new(Vec::new()) }
    }

    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().await.push(request.clone());
        self.reply.clone().map_err(|message| anyhow!(message))
    }
}
