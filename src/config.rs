use anyhow::{anyhow, Result};
use std::env;
use std::path::PathBuf;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://data.austintexas.gov/resource/dx9v-zd7x.json";
pub const DEFAULT_API_LIMIT: usize = 50;
pub const DEFAULT_PDF_DIR: &str = "traffic_pdfs";
pub const DEFAULT_UPLOAD_DIR: &str = "/tmp/pdf_uploads";
pub const DEFAULT_COLLECTION: &str = "traffic_incidents";

/// Application-wide settings, resolved from the environment with defaults
/// matching the original deployment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_url: String,
    pub api_limit: usize,
    pub pdf_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub qdrant_url: String,
    pub collection: String,
    pub embedding_backend: String,
    pub llm_provider: String,
    pub llm_model: Option<String>,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let api_url = env::var("TRAFFIC_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Url::parse(&api_url).map_err(|e| anyhow!("Invalid TRAFFIC_API_URL {}: {}", api_url, e))?;

        let api_limit = env::var("TRAFFIC_API_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_API_LIMIT);

        Ok(Self {
            api_url,
            api_limit,
            pdf_dir: env::var("PDF_OUTPUT_DIR")
                .unwrap_or_else(|_| DEFAULT_PDF_DIR.to_string())
                .into(),
            upload_dir: env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| DEFAULT_UPLOAD_DIR.to_string())
                .into(),
            qdrant_url: env::var("QDRANT_URL")
                .unwrap_or_else(|_| "http://localhost:6333".to_string()),
            collection: env::var("QDRANT_COLLECTION")
                .unwrap_or_else(|_| DEFAULT_COLLECTION.to_string()),
            embedding_backend: env::var("EMBEDDING_BACKEND")
                .unwrap_or_else(|_| "ollama".to_string()),
            llm_provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string()),
            llm_model: env::var("LLM_MODEL").ok(),
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5001),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub default_model: String,
    pub api_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ProviderConfig {
    pub fn from_env(provider: &str) -> Self {
        let prefix = provider.to_uppercase();

        let default_model = env::var(format!("{}_MODEL", prefix)).unwrap_or_else(|_| {
            match provider {
                "openai" => "gpt-4-turbo-preview",
                "anthropic" => "claude-3-opus-20240229",
                "ollama" => "llama3.1",
                _ => "",
            }
            .to_string()
        });

        let api_url = env::var(format!("{}_API_URL", prefix)).unwrap_or_else(|_| {
            match provider {
                "openai" => "https://api.openai.com/v1/chat/completions",
                "anthropic" => "https://api.anthropic.com/v1/messages",
                "ollama" => "http://localhost:11434",
                _ => "",
            }
            .to_string()
        });

        let temperature = env::var(format!("{}_TEMPERATURE", prefix))
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(0.7);

        let max_tokens = env::var(format!("{}_MAX_TOKENS", prefix))
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(500);

        Self {
            default_model,
            api_url,
            temperature,
            max_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_defaults_cover_known_backends() {
        for provider in ["openai", "anthropic", "ollama"] {
            let config = ProviderConfig::from_env(provider);
            assert!(!config.default_model.is_empty(), "no model for {}", provider);
            assert!(!config.api_url.is_empty(), "no url for {}", provider);
            assert_eq!(config.max_tokens, 500);
        }
    }

    #[test]
    fn unknown_provider_yields_empty_defaults() {
        let config = ProviderConfig::from_env("palm");
        assert!(config.default_model.is_empty());
        assert!(config.api_url.is_empty());
    }
}
