use crate::config::ProviderConfig;
use crate::database::ScoredDocument;
use crate::providers::anthropic::anthropic::AnthropicProvider;
use crate::providers::ollama::ollama::OllamaProvider;
use crate::providers::openai::openai::OpenAIProvider;
use crate::providers::traits::CompletionProvider;
use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use rand::Rng;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const SYSTEM_MESSAGE: &str =
    "You are a helpful assistant that provides information about traffic incidents.";

const MAX_ATTEMPTS: usize = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(4);
const MAX_BACKOFF: Duration = Duration::from_secs(10);
const MAX_JITTER_MS: u64 = 500;

lazy_static! {
    static ref SUPPORTED_MODELS: HashMap<&'static str, Vec<&'static str>> = {
        let mut m = HashMap::new();
        m.insert(
            "openai",
            vec!["gpt-4-turbo-preview", "gpt-4", "gpt-3.5-turbo"],
        );
        m.insert(
            "anthropic",
            vec![
                "claude-3-opus-20240229",
                "claude-3-sonnet-20240229",
                "claude-3-haiku-20240307",
            ],
        );
        m.insert("ollama", vec!["llama3.1", "deepseek-r1", "nomic-embed-text"]);
        m
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Ollama => "ollama",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "anthropic" => Ok(LlmProvider::Anthropic),
            "ollama" => Ok(LlmProvider::Ollama),
            other => Err(anyhow!(
                "Unsupported provider: {}. Supported providers: {:?}",
                other,
                SUPPORTED_MODELS.keys().collect::<Vec<_>>()
            )),
        }
    }
}

/// One chat backend behind a uniform `generate_response` call, with
/// retry-with-backoff around the actual dispatch.
#[derive(Clone)]
pub struct LlmHandler {
    kind: LlmProvider,
    provider: Box<dyn CompletionProvider + Send + Sync>,
    model: String,
}

impl LlmHandler {
    pub async fn new(provider: &str) -> Result<Self> {
        let kind = LlmProvider::from_str(provider)?;
        let config = ProviderConfig::from_env(kind.as_str());

        if let Some(supported) = SUPPORTED_MODELS.get(kind.as_str()) {
            if !supported.contains(&config.default_model.as_str()) {
                warn!(
                    "Model {} not in supported list: {:?}",
                    config.default_model, supported
                );
            }
        }

        let backend: Box<dyn CompletionProvider + Send + Sync> = match kind {
            LlmProvider::OpenAi => {
                let api_key = env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow!("OPENAI_API_KEY environment variable is not set"))?;
                Box::new(OpenAIProvider::new(api_key, SYSTEM_MESSAGE.to_string()).await?)
            }
            LlmProvider::Anthropic => {
                let api_key = env::var("ANTHROPIC_API_KEY")
                    .map_err(|_| anyhow!("ANTHROPIC_API_KEY environment variable is not set"))?;
                Box::new(AnthropicProvider::new(api_key, SYSTEM_MESSAGE.to_string()).await?)
            }
            LlmProvider::Ollama => {
                Box::new(OllamaProvider::new(String::new(), SYSTEM_MESSAGE.to_string()).await?)
            }
        };

        Ok(Self {
            kind,
            provider: backend,
            model: config.default_model,
        })
    }

    pub fn provider_kind(&self) -> LlmProvider {
        self.kind
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Answers `query` from the retrieved documents. Transient failures are
    /// retried with exponential backoff before the error surfaces.
    pub async fn generate_response(
        &self,
        query: &str,
        context_docs: &[ScoredDocument],
    ) -> Result<String> {
        let prompt = build_prompt(query, context_docs);

        let mut delay = INITIAL_BACKOFF;
        let mut attempt = 1;
        loop {
            match self.provider.complete(&prompt).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < MAX_ATTEMPTS => {
                    warn!(
                        "LLM request failed (attempt {}/{}): {}",
                        attempt, MAX_ATTEMPTS, e
                    );
                    let jitter =
                        Duration::from_millis(rand::thread_rng().gen_range(0..MAX_JITTER_MS));
                    tokio::time::sleep(delay + jitter).await;
                    delay = next_delay(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn is_configured(&self) -> bool {
        self.provider.get_model_info().await.is_ok()
    }
}

fn next_delay(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

fn build_prompt(query: &str, context_docs: &[ScoredDocument]) -> String {
    let context_text = context_docs
        .iter()
        .map(|doc| doc.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Based on the following traffic incident information, please answer the query.\n\n\
         Context information:\n{}\n\n\
         Query: {}\n\n\
         Please provide a clear and concise response based only on the information provided in the context.",
        context_text, query
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, text: &str) -> ScoredDocument {
        ScoredDocument {
            id: id.to_string(),
            text: text.to_string(),
            score: 0.9,
        }
    }

    #[test]
    fn provider_names_round_trip() {
        for name in ["openai", "anthropic", "ollama"] {
            let provider = LlmProvider::from_str(name).unwrap();
            assert_eq!(provider.as_str(), name);
        }
    }

    #[test]
    fn unknown_provider_lists_supported_ones() {
        let err = LlmProvider::from_str("grok").unwrap_err().to_string();
        assert!(err.contains("Unsupported provider: grok"));
        assert!(err.contains("openai"));
    }

    #[test]
    fn provider_parse_is_case_insensitive() {
        assert_eq!(
            LlmProvider::from_str("OpenAI").unwrap(),
            LlmProvider::OpenAi
        );
    }

    #[test]
    fn prompt_contains_context_and_query() {
        let docs = vec![
            doc("incident_1.pdf", "Crash on I-35 northbound."),
            doc("incident_2.pdf", "Stalled vehicle at Lamar and 5th."),
        ];
        let prompt = build_prompt("What happened on I-35?", &docs);

        assert!(prompt.contains("Crash on I-35 northbound."));
        assert!(prompt.contains("Stalled vehicle at Lamar and 5th."));
        assert!(prompt.contains("Query: What happened on I-35?"));
        assert!(prompt.contains("based only on the information provided"));
    }

    #[test]
    fn prompt_with_no_documents_still_carries_query() {
        let prompt = build_prompt("Anything going on?", &[]);
        assert!(prompt.contains("Query: Anything going on?"));
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let first = next_delay(INITIAL_BACKOFF);
        assert_eq!(first, Duration::from_secs(8));
        let second = next_delay(first);
        assert_eq!(second, MAX_BACKOFF);
        assert_eq!(next_delay(second), MAX_BACKOFF);
    }
}
