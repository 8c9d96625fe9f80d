use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use scribe_config::LlmConfig;

/// A text-generation backend that can answer a prompt with a JSON value
/// conforming to a caller-supplied JSON Schema.
///
/// This is the only capability the pipeline needs from a model, so swapping
/// providers never touches the pipeline itself.
#[async_trait]
pub trait StructuredBackend: Send + Sync {
    async fn generate_structured(&self, prompt: &str, schema: &Value) -> Result<Value>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Ollama,
    OpenAi,
}

impl Provider {
    /// Parse the `llm.provider` config value.  Anything that is not `ollama`
    /// is treated as an OpenAI-compatible endpoint.
    pub fn from_config(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("ollama") {
            Self::Ollama
        } else {
            Self::OpenAi
        }
    }
}

fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()?)
}

// ── Ollama ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config.timeout_secs)?,
            base_url: config.ollama_base_url.clone(),
            model: config.ollama_model.clone(),
            temperature: config.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl StructuredBackend for OllamaClient {
    async fn generate_structured(&self, prompt: &str, schema: &Value) -> Result<Value> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "format": schema,
            "options": { "temperature": self.temperature }
        });

        let response = self
            .client
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                anyhow!(
                    "Ollama unavailable at {}. Start Ollama and ensure model '{}' is installed. Error: {err}",
                    self.base_url,
                    self.model
                )
            })?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            bail!("Ollama error ({status}): {body}");
        }

        let text = body
            .get("response")
            .and_then(|value| value.as_str())
            .ok_or_else(|| anyhow!("Ollama response missing text: {body}"))?;

        parse_structured_reply(text)
    }
}

// ── OpenAI-compatible (DeepSeek, OpenAI, OpenRouter) ─────────────────────────

#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
}

impl OpenAiCompatClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config.timeout_secs)?,
            base_url: config.openai_base_url.clone(),
            model: config.openai_model.clone(),
            api_key: config.openai_api_key.clone(),
            temperature: config.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl StructuredBackend for OpenAiCompatClient {
    async fn generate_structured(&self, prompt: &str, schema: &Value) -> Result<Value> {
        if self.api_key.trim().is_empty() {
            bail!("API key missing. Set SCRIBE_API_KEY or llm.openai_api_key, or switch llm.provider to ollama.");
        }

        let payload = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": { "name": "structured_reply", "schema": schema }
            }
        });

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            bail!("backend error ({status}): {body}");
        }

        let text = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or_else(|| anyhow!("backend response missing message content: {body}"))?;

        parse_structured_reply(text)
    }
}

// ── Router ───────────────────────────────────────────────────────────────────

/// Dispatches to the client selected by `llm.provider`.
#[derive(Debug, Clone)]
pub struct LlmRouter {
    provider: Provider,
    ollama: OllamaClient,
    openai: OpenAiCompatClient,
}

impl LlmRouter {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            provider: Provider::from_config(&config.provider),
            ollama: OllamaClient::new(config)?,
            openai: OpenAiCompatClient::new(config)?,
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }
}

#[async_trait]
impl StructuredBackend for LlmRouter {
    async fn generate_structured(&self, prompt: &str, schema: &Value) -> Result<Value> {
        tracing::debug!(
            provider = ?self.provider,
            prompt_chars = prompt.len(),
            "structured request"
        );
        match self.provider {
            Provider::Ollama => self.ollama.generate_structured(prompt, schema).await,
            Provider::OpenAi => self.openai.generate_structured(prompt, schema).await,
        }
    }
}

// ── Structured output extraction ──────────────────────────────────────────────

fn parse_structured_reply(text: &str) -> Result<Value> {
    extract_json_output::<Value>(text)
        .ok_or_else(|| anyhow!("backend reply contained no parseable JSON"))
}

/// Extract the first valid JSON value from an LLM response.
///
/// Looks for ` ```json\n...\n` ``` ` delimiters first, then falls back to the
/// span between the first `{` and the last `}`, then to the whole reply
/// (some backends answer with a bare JSON array).  Returns `None` when none
/// of those parse.
///
/// ```rust
/// use scribe_llm::extract_json_output;
///
/// let raw = "Sure!\n```json\n{\"entries\":[]}\n```";
/// let value: serde_json::Value = extract_json_output(raw).unwrap();
/// assert!(value["entries"].is_array());
/// ```
pub fn extract_json_output<T: serde::de::DeserializeOwned>(response: &str) -> Option<T> {
    // Strategy 1: fenced ```json ... ``` blocks.
    if let Some(fence_start) = response.find("```json") {
        let after_fence = &response[fence_start + "```json".len()..];
        if let Some(json_start) = after_fence.find(|c: char| !c.is_whitespace()) {
            let json_body = &after_fence[json_start..];
            if let Some(fence_end) = json_body.find("```") {
                let json_str = json_body[..fence_end].trim();
                if let Ok(val) = serde_json::from_str(json_str) {
                    return Some(val);
                }
            }
        }
    }

    // Strategy 2: bare JSON object, first '{' to last '}'.
    let trimmed = response.trim();
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                let candidate = &trimmed[start..=end];
                if let Ok(val) = serde_json::from_str(candidate) {
                    return Some(val);
                }
            }
        }
    }

    // Strategy 3: the whole reply.
    serde_json::from_str(trimmed).ok()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── extract_json_output: fenced code block ─────────────────────────────

    #[test]
    fn extract_fenced_json() {
        let raw = "Sure!\n```json\n{\"entries\":[{\"title\":\"Test 1\"}]}\n```";
        let out = extract_json_output::<Value>(raw).unwrap();
        assert_eq!(out["entries"][0]["title"], "Test 1");
    }

    #[test]
    fn extract_fenced_json_with_extra_text() {
        let raw = "Here is the result:\n\n```json\n{\"entries\":[],\"note\":\"none\"}\n```\n\nHope that helps!";
        let out = extract_json_output::<Value>(raw).unwrap();
        assert_eq!(out["note"], "none");
    }

    #[test]
    fn extract_fenced_json_with_leading_newlines() {
        let raw = "```json\n\n  {\"entries\":[]}\n```";
        let out = extract_json_output::<Value>(raw).unwrap();
        assert!(out["entries"].as_array().unwrap().is_empty());
    }

    // ── extract_json_output: bare JSON ─────────────────────────────────────

    #[test]
    fn extract_bare_json_with_surrounding_text() {
        let raw = "some preamble {\"entries\":[{\"link\":\"https://x.dev\"}]} some epilogue";
        let out = extract_json_output::<Value>(raw).unwrap();
        assert_eq!(out["entries"][0]["link"], "https://x.dev");
    }

    #[test]
    fn extract_bare_array() {
        let raw = r#"[{"title":"a"},{"title":"b"}]"#;
        let out = extract_json_output::<Value>(raw).unwrap();
        assert_eq!(out.as_array().unwrap().len(), 2);
    }

    #[test]
    fn extract_fenced_takes_precedence_over_bare() {
        let raw = r#"Bare: {"pick":"wrong"}
```json
{"pick":"right"}
```
"#;
        let out = extract_json_output::<Value>(raw).unwrap();
        assert_eq!(out["pick"], "right");
    }

    // ── extract_json_output: failure cases ─────────────────────────────────

    #[test]
    fn extract_returns_none_for_plain_text() {
        let raw = "Hello, this is a plain text response with no JSON.";
        assert!(extract_json_output::<Value>(raw).is_none());
    }

    #[test]
    fn extract_returns_none_for_empty_string() {
        assert!(extract_json_output::<Value>("").is_none());
    }

    #[test]
    fn extract_returns_none_for_malformed_json_in_fence() {
        let raw = "```json\n{not valid json}\n```";
        assert!(extract_json_output::<Value>(raw).is_none());
    }

    #[test]
    fn extract_two_bare_objects_returns_none() {
        // first '{' to last '}' spans both objects, which is not valid JSON.
        let raw = r#"Here: {"a":1} and also {"b":2}"#;
        assert!(extract_json_output::<Value>(raw).is_none());
    }

    #[test]
    fn parse_structured_reply_errors_on_prose() {
        assert!(parse_structured_reply("no json here").is_err());
    }

    // ── Provider ───────────────────────────────────────────────────────────

    #[test]
    fn provider_from_config_value() {
        assert_eq!(Provider::from_config("ollama"), Provider::Ollama);
        assert_eq!(Provider::from_config(" Ollama "), Provider::Ollama);
        assert_eq!(Provider::from_config("openai"), Provider::OpenAi);
        assert_eq!(Provider::from_config("deepseek"), Provider::OpenAi);
    }

    #[test]
    fn router_selects_configured_provider() {
        let mut config = LlmConfig::default();
        config.provider = "ollama".to_string();
        let router = LlmRouter::from_config(&config).unwrap();
        assert_eq!(router.provider(), Provider::Ollama);
    }

    #[test]
    fn endpoints_trim_trailing_slash() {
        let mut config = LlmConfig::default();
        config.ollama_base_url = "http://localhost:11434/".to_string();
        config.openai_base_url = "https://api.example.com/v1/".to_string();
        let ollama = OllamaClient::new(&config).unwrap();
        let openai = OpenAiCompatClient::new(&config).unwrap();
        assert_eq!(ollama.endpoint(), "http://localhost:11434/api/generate");
        assert_eq!(openai.endpoint(), "https://api.example.com/v1/chat/completions");
    }

    #[tokio::test]
    async fn openai_client_without_key_fails_before_network() {
        let config = LlmConfig::default();
        let client = OpenAiCompatClient::new(&config).unwrap();
        let err = client
            .generate_structured("prompt", &json!({"type": "object"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("API key missing"));
    }
}
