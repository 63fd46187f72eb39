//! OpenAI-compatible provider.
//!
//! Talks to any endpoint exposing the OpenAI chat-completions and
//! embeddings API surface (DeepSeek, LM Studio, vLLM, ...). The API key is
//! read from the environment variable named in the settings; requests go
//! out without auth when it is unset, which local servers accept.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::LlmProvider;
use super::types::ChatRequest;
use crate::core::config::ProviderSettings;
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct OpenAiProvider {
    base_url: String,
    api_key: Option<String>,
    chat_model: String,
    embedding_model: String,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(settings: &ProviderSettings) -> Self {
        let api_key = std::env::var(&settings.api_key_env).ok();
        if api_key.is_none() {
            tracing::warn!(
                "{} is not set; provider requests will be unauthenticated",
                settings.api_key_env
            );
        }

        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            chat_model: settings.chat_model.clone(),
            embedding_model: settings.embedding_model.clone(),
            client: Client::new(),
        }
    }

    fn request(&self, url: &str, body: &Value) -> reqwest::RequestBuilder {
        let builder = self.client.post(url).json(body);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        let url = format!("{}/v1/models", self.base_url);
        let mut builder = self.client.get(&url);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        match builder.send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut body = json!({
            "model": self.chat_model,
            "messages": request.messages,
            "stream": false,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.top_p {
                obj.insert("top_p".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
        }

        let res = self
            .request(&url, &body)
            .send()
            .await
            .map_err(ApiError::model)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::ModelCallFailure(format!(
                "chat completion returned {}: {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::model)?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(content)
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let url = format!("{}/v1/embeddings", self.base_url);

        let body = json!({
            "model": self.embedding_model,
            "input": inputs,
        });

        let res = self
            .request(&url, &body)
            .send()
            .await
            .map_err(ApiError::model)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::ModelCallFailure(format!(
                "embeddings returned {}: {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::model)?;

        let mut embeddings = Vec::new();
        if let Some(data) = payload["data"].as_array() {
            for item in data {
                if let Some(vals) = item["embedding"].as_array() {
                    let vec: Vec<f32> = vals
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    embeddings.push(vec);
                }
            }
        }

        Ok(embeddings)
    }
}
