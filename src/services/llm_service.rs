use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::models::ChatMessage;
use crate::utils::error::ApiError;

/// Model ranking for flashcard generation; earlier entries win. The match
/// is a substring check against the backend's model ids.
const PREFERRED_MODELS: &[&str] = &[
    "qwen2.5", "qwen2", "qwen", "llama-3.1", "llama-3", "llama-2", "llama", "gemma-2", "gemma",
    "mistral", "mixtral", "gpt", "instruct", "chat",
];

/// The seam the generators and the combiner consume. The response is
/// always one normalized text payload, whatever the backend returned.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: usize,
    ) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub id: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: usize,
    top_p: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ModelListResponse {
    data: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: String,
}

/// Stateless request/response wrapper around a local chat-completion
/// backend (llama-server, LM Studio). The cached model list and selected
/// model are instance fields with explicit invalidation via `refresh()`.
pub struct LlmService {
    client: Client,
    config: LlmConfig,
    base_url: String,
    models: RwLock<Option<Vec<ModelInfo>>>,
    selected_model: RwLock<Option<String>>,
}

impl LlmService {
    pub fn new(config: LlmConfig) -> Self {
        let base_url = normalize_base_url(&config.base_url);
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(config.timeout_seconds))
                .build()
                .expect("Failed to create HTTP client"),
            config,
            base_url,
            models: RwLock::new(None),
            selected_model: RwLock::new(None),
        }
    }

    /// Probe the backend; used by the readiness check.
    pub async fn test_connection(&self) -> Result<(), ApiError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            return Err(ApiError::LlmError(format!(
                "Backend returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// List available models, served from the instance cache unless forced.
    pub async fn list_models(&self, force_refresh: bool) -> Result<Vec<ModelInfo>, ApiError> {
        if !force_refresh {
            if let Some(models) = self.models.read().await.as_ref() {
                return Ok(models.clone());
            }
        }

        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            return Err(ApiError::LlmError(format!(
                "Failed to list models: {}",
                response.status()
            )));
        }

        let list: ModelListResponse = response
            .json()
            .await
            .map_err(|e| ApiError::LlmError(format!("Failed to parse model list: {}", e)))?;

        info!("Found {} available models", list.data.len());
        *self.models.write().await = Some(list.data.clone());
        Ok(list.data)
    }

    /// Drop the cached model list and selection; the next request re-resolves.
    pub async fn refresh(&self) {
        *self.models.write().await = None;
        *self.selected_model.write().await = None;
    }

    /// Resolve which model to use: the configured name when the backend has
    /// it, otherwise the best preference-list match, otherwise the first.
    async fn ensure_model(&self) -> Result<String, ApiError> {
        if let Some(model) = self.selected_model.read().await.as_ref() {
            return Ok(model.clone());
        }

        let models = self.list_models(false).await?;
        if models.is_empty() {
            return Err(ApiError::LlmError("No models available".to_string()));
        }

        let selected = match &self.config.model_name {
            Some(name) if models.iter().any(|m| &m.id == name) => name.clone(),
            Some(name) => {
                warn!("Configured model {} not found, auto-selecting", name);
                select_best_model(&models)
            }
            None => select_best_model(&models),
        };

        info!("Selected model: {}", selected);
        *self.selected_model.write().await = Some(selected.clone());
        Ok(selected)
    }

    /// Send one chat-completion round trip and return the response text.
    pub async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<String, ApiError> {
        let model = self.ensure_model().await?;
        debug!("Chat completion: model={}, {} messages", model, messages.len());

        let request = ChatCompletionRequest {
            model,
            messages,
            temperature,
            max_tokens,
            top_p: self.config.top_p,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::LlmError(format!(
                "LLM API error: {} - {}",
                status, body
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ApiError::LlmError(format!("Failed to parse LLM response: {}", e)))?;

        completion
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| ApiError::LlmError("No choices returned from LLM".to_string()))
    }

    fn map_transport_error(&self, e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::LlmTimeout(self.config.timeout_seconds)
        } else {
            ApiError::LlmError(format!("Failed to call LLM API: {}", e))
        }
    }
}

#[async_trait]
impl LlmProvider for LlmService {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: usize,
    ) -> anyhow::Result<String> {
        self.chat_completion(messages, temperature, max_tokens)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }
}

fn normalize_base_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/v1") {
        base.to_string()
    } else {
        format!("{}/v1", base)
    }
}

fn select_best_model(models: &[ModelInfo]) -> String {
    let ids: Vec<String> = models.iter().map(|m| m.id.to_lowercase()).collect();
    for preferred in PREFERRED_MODELS {
        for (i, id) in ids.iter().enumerate() {
            if id.contains(preferred) {
                return models[i].id.clone();
            }
        }
    }
    models[0].id.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str) -> ModelInfo {
        ModelInfo { id: id.to_string() }
    }

    #[test]
    fn test_select_prefers_qwen_over_llama() {
        let models = vec![model("Meta-Llama-3-8B-Instruct"), model("Qwen2.5-7B-Instruct")];
        assert_eq!(select_best_model(&models), "Qwen2.5-7B-Instruct");
    }

    #[test]
    fn test_select_falls_back_to_first_model() {
        let models = vec![model("some-exotic-model"), model("another-one")];
        assert_eq!(select_best_model(&models), "some-exotic-model");
    }

    #[test]
    fn test_instruct_catch_all_matches() {
        let models = vec![model("unknown-base"), model("tiny-instruct-v2")];
        assert_eq!(select_best_model(&models), "tiny-instruct-v2");
    }

    #[test]
    fn test_base_url_gains_v1_suffix_once() {
        assert_eq!(normalize_base_url("http://localhost:1234"), "http://localhost:1234/v1");
        assert_eq!(normalize_base_url("http://localhost:1234/"), "http://localhost:1234/v1");
        assert_eq!(normalize_base_url("http://localhost:1234/v1"), "http://localhost:1234/v1");
    }
}
