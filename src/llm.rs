use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Anything that turns a system instruction plus a prompt into free text.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn from_env() -> Result<Self> {
        let base_url = dotenv::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:1234/v1".to_string());
        let model =
            dotenv::var("LLM_MODEL").unwrap_or_else(|_| "gemini-2.0-flash".to_string());
        let temperature = match dotenv::var("LLM_TEMPERATURE") {
            Ok(raw) => raw
                .parse::<f32>()
                .with_context(|| format!("LLM_TEMPERATURE is not a number: {raw}"))?,
            Err(_) => 0.5,
        };
        let api_key = dotenv::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());

        // Transport ceiling only; the pipeline imposes its own per-batch timeout.
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            model,
            temperature,
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else if base.ends_with("/v1") || base.ends_with("/openai") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    /// Non-streaming chat completion.
    pub async fn chat(&self, messages: &[Message]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });

        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req.send().await.context("LLM request failed")?;
        let status = resp.status();
        let text = resp.text().await.context("Failed to read LLM response")?;
        if !status.is_success() {
            anyhow::bail!("LLM returned {}: {}", status, text);
        }
        let json: serde_json::Value =
            serde_json::from_str(&text).context("Failed to parse LLM JSON")?;

        // Extract content from choices[0].message.content (handle null)
        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .unwrap_or("")
            .to_string();

        Ok(content)
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let messages = vec![Message::system(system), Message::user(prompt)];
        self.chat(&messages).await
    }
}
