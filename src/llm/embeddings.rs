use anyhow::{anyhow, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
    Client,
};
use lru::LruCache;
use serde::Deserialize;
use std::env;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use tracing::debug;

const CACHE_CAPACITY: usize = 256;

#[derive(Debug)]
enum EmbeddingBackend {
    OpenAI {
        client: Client<OpenAIConfig>,
        model: String,
    },
    Ollama {
        client: reqwest::Client,
        base_url: String,
        model: String,
    },
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embedding: Vec<f64>,
}

/// Turns document text into fixed-length vectors. Backends are the hosted
/// OpenAI embedding endpoint or a local Ollama model; identical inputs are
/// served from an LRU cache.
#[derive(Debug)]
pub struct EmbeddingGenerator {
    backend: EmbeddingBackend,
    dimension: usize,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbeddingGenerator {
    pub fn from_env(backend: &str) -> Result<Self> {
        match backend {
            "openai" => {
                let api_key = env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow!("OPENAI_API_KEY environment variable is not set"))?;
                let model = env::var("OPENAI_EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "text-embedding-3-small".to_string());
                Ok(Self::openai(api_key, model, 1536))
            }
            "ollama" => {
                let base_url = env::var("OLLAMA_API_URL")
                    .unwrap_or_else(|_| "http://localhost:11434".to_string());
                let model = env::var("OLLAMA_EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "nomic-embed-text".to_string());
                Ok(Self::ollama(base_url, model, 768))
            }
            other => Err(anyhow!(
                "Unsupported embedding backend: {}. Supported backends: [\"openai\", \"ollama\"]",
                other
            )),
        }
    }

    pub fn openai(api_key: String, model: String, dimension: usize) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            backend: EmbeddingBackend::OpenAI {
                client: Client::with_config(config),
                model,
            },
            dimension,
            cache: Self::new_cache(),
        }
    }

    pub fn ollama(base_url: String, model: String, dimension: usize) -> Self {
        Self {
            backend: EmbeddingBackend::Ollama {
                client: reqwest::Client::new(),
                base_url,
                model,
            },
            dimension,
            cache: Self::new_cache(),
        }
    }

    fn new_cache() -> Mutex<LruCache<String, Vec<f32>>> {
        Mutex::new(LruCache::new(
            NonZeroUsize::new(CACHE_CAPACITY).expect("cache capacity is non-zero"),
        ))
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.cache.lock().unwrap().get(text).cloned() {
            debug!("Embedding cache hit");
            return Ok(cached);
        }

        let embedding = match &self.backend {
            EmbeddingBackend::OpenAI { client, model } => {
                let request = CreateEmbeddingRequestArgs::default()
                    .model(model)
                    .input(EmbeddingInput::String(text.to_string()))
                    .build()?;

                let response = client.embeddings().create(request).await?;
                response
                    .data
                    .first()
                    .map(|e| e.embedding.clone())
                    .ok_or_else(|| anyhow!("No embedding returned from OpenAI"))?
            }
            EmbeddingBackend::Ollama {
                client,
                base_url,
                model,
            } => {
                let response = client
                    .post(format!("{}/api/embeddings", base_url))
                    .json(&serde_json::json!({
                        "model": model,
                        "prompt": text,
                    }))
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    return Err(anyhow!("Ollama embedding error: {}", status));
                }

                let parsed: OllamaEmbedResponse = response.json().await?;
                parsed.embedding.into_iter().map(|x| x as f32).collect()
            }
        };

        if embedding.len() != self.dimension {
            return Err(anyhow!(
                "Generated embedding has wrong size: {} (expected {})",
                embedding.len(),
                self.dimension
            ));
        }

        self.cache
            .lock()
            .unwrap()
            .put(text.to_string(), embedding.clone());

        Ok(embedding)
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            let embedding = self.embed(text).await?;
            embeddings.push(embedding);
        }
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_rejects_unknown_backend() {
        let err = EmbeddingGenerator::from_env("word2vec").unwrap_err();
        assert!(err.to_string().contains("Unsupported embedding backend"));
    }

    #[test]
    fn ollama_backend_reports_dimension() {
        let encoder = EmbeddingGenerator::ollama(
            "http://localhost:11434".to_string(),
            "nomic-embed-text".to_string(),
            768,
        );
        assert_eq!(encoder.dimension(), 768);
    }
}
