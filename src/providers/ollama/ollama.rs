use crate::config::ProviderConfig;
use crate::providers::traits::CompletionProvider;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};

/// Local model server. The `api_key` trait argument is unused; the base URL
/// comes from `OLLAMA_API_URL`.
#[derive(Clone)]
pub struct OllamaProvider {
    system_message: Arc<RwLock<String>>,
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OllamaProvider {
    /// Model names come back as `name:tag`; compare on the bare name.
    fn installed_models(tags: &Value) -> Vec<String> {
        tags.get("models")
            .and_then(|models| models.as_array())
            .map(|models| {
                models
                    .iter()
                    .filter_map(|model| model.get("name").and_then(|name| name.as_str()))
                    .map(|name| name.split(':').next().unwrap_or(name).to_string())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionProvider for OllamaProvider {
    async fn new(_api_key: String, system_message: String) -> Result<Self> {
        let config = ProviderConfig::from_env("ollama");
        let client = Client::new();

        let response = client
            .get(format!("{}/api/tags", config.api_url))
            .send()
            .await
            .map_err(|e| anyhow!("Failed to connect to Ollama service: {}", e))?;

        if !response.status().is_success() {
            return Err(anyhow!("Ollama service not available"));
        }

        let tags: Value = response.json().await?;
        let available = Self::installed_models(&tags);
        if !available.contains(&config.default_model) {
            return Err(anyhow!(
                "Model {} not available in Ollama. Available models: {:?}",
                config.default_model,
                available
            ));
        }

        Ok(Self {
            system_message: Arc::new(RwLock::new(system_message)),
            client,
            base_url: config.api_url,
            model: config.default_model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let system_message = self
            .system_message
            .read()
            .map_err(|e| anyhow!("Failed to read system message: {}", e))?
            .clone();

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "system": system_message,
                "stream": false,
                "options": {
                    "temperature": self.temperature,
                    "num_predict": self.max_tokens
                }
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("Ollama API error: {}", error_text));
        }

        let response_json: Value = response.json().await?;
        response_json
            .get("response")
            .and_then(|text| text.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("Invalid response format from Ollama"))
    }

    async fn get_model_info(&self) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("Ollama service not available"));
        }
        Ok(self.model.clone())
    }

    fn get_system_message(&self) -> String {
        self.system_message.read().unwrap().clone()
    }

    fn clone_box(&self) -> Box<dyn CompletionProvider + Send + Sync> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installed_models_strips_tags() {
        let tags = json!({
            "models": [
                {"name": "llama3.1:latest"},
                {"name": "nomic-embed-text:v1.5"},
                {"name": "deepseek-r1"}
            ]
        });
        let models = OllamaProvider::installed_models(&tags);
        assert_eq!(models, vec!["llama3.1", "nomic-embed-text", "deepseek-r1"]);
    }

    #[test]
    fn installed_models_handles_missing_list() {
        assert!(OllamaProvider::installed_models(&json!({})).is_empty());
    }
}
