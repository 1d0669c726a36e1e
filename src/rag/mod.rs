use crate::config::AppConfig;
use crate::database::{ScoredDocument, VectorDB};
use crate::llm::{EmbeddingGenerator, LlmHandler};
use anyhow::{anyhow, Result};
use serde::Serialize;
use tracing::{error, info, warn};

pub const DEFAULT_TOP_K: u64 = 5;
pub const LLM_FALLBACK_MESSAGE: &str = "Error: Unable to generate LLM response";

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub documents: Vec<ScoredDocument>,
    pub llm_response: Option<String>,
}

/// Owns the embedding encoder, the vector collection, and (when configured)
/// an LLM handler. `add_documents` feeds the collection, `query` retrieves
/// from it and optionally asks the LLM for a final answer.
pub struct RagPipeline {
    vector_db: VectorDB,
    collection: String,
    encoder: EmbeddingGenerator,
    llm: Option<LlmHandler>,
}

impl RagPipeline {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        info!("Initializing RAG pipeline...");

        let encoder = EmbeddingGenerator::from_env(&config.embedding_backend)?;
        let vector_db = VectorDB::new(&config.qdrant_url).await?;
        vector_db
            .create_collection(&config.collection, encoder.dimension() as u64)
            .await?;

        // A missing or misconfigured LLM must not take retrieval down with it.
        let llm = match LlmHandler::new(&config.llm_provider).await {
            Ok(handler) => {
                info!(
                    "RAG pipeline initialized with {} provider ({})",
                    config.llm_provider,
                    handler.model()
                );
                Some(handler)
            }
            Err(e) => {
                warn!(
                    "LLM handler unavailable, queries return documents only: {}",
                    e
                );
                None
            }
        };

        Ok(Self {
            vector_db,
            collection: config.collection.clone(),
            encoder,
            llm,
        })
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    pub async fn add_documents(&self, documents: &[String], ids: Option<Vec<String>>) -> Result<()> {
        let ids = resolve_ids(documents.len(), ids)?;
        info!("Adding {} documents to the RAG system", documents.len());

        let embeddings = self.encoder.embed_batch(documents).await?;
        for ((text, id), embedding) in documents.iter().zip(&ids).zip(embeddings) {
            self.vector_db
                .store_document(&self.collection, id, text, embedding)
                .await?;
        }

        info!("Documents added successfully");
        Ok(())
    }

    pub async fn query(&self, query_text: &str, top_k: u64) -> Result<QueryResponse> {
        info!("Processing query: {}", query_text);

        let query_embedding = self.encoder.embed(query_text).await?;
        let documents = self
            .vector_db
            .search_documents(&self.collection, query_embedding, top_k)
            .await?;

        let llm_response = match &self.llm {
            Some(handler) if handler.is_configured().await => {
                match handler.generate_response(query_text, &documents).await {
                    Ok(response) => Some(response),
                    Err(e) => {
                        error!("LLM response generation failed: {}", e);
                        Some(LLM_FALLBACK_MESSAGE.to_string())
                    }
                }
            }
            _ => None,
        };

        info!(
            "Query completed. Found {} relevant documents",
            documents.len()
        );
        Ok(QueryResponse {
            documents,
            llm_response,
        })
    }
}

fn resolve_ids(document_count: usize, ids: Option<Vec<String>>) -> Result<Vec<String>> {
    match ids {
        Some(ids) if ids.len() != document_count => Err(anyhow!(
            "Document/id count mismatch: {} documents, {} ids",
            document_count,
            ids.len()
        )),
        Some(ids) => Ok(ids),
        None => Ok((0..document_count).map(|i| format!("doc_{}", i)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_default_to_positional_names() {
        let ids = resolve_ids(3, None).unwrap();
        assert_eq!(ids, vec!["doc_0", "doc_1", "doc_2"]);
    }

    #[test]
    fn explicit_ids_pass_through() {
        let ids = resolve_ids(2, Some(vec!["a.pdf".into(), "b.pdf".into()])).unwrap();
        assert_eq!(ids, vec!["a.pdf", "b.pdf"]);
    }

    #[test]
    fn mismatched_id_count_is_rejected() {
        let err = resolve_ids(2, Some(vec!["only_one.pdf".into()])).unwrap_err();
        assert!(err.to_string().contains("count mismatch"));
    }
}
