use crate::database::qdrant_config::create_qdrant_client;
use qdrant_client::{
    qdrant::{
        point_id::PointIdOptions, with_payload_selector::SelectorOptions, CreateCollection,
        Distance, PointId, PointStruct, SearchPoints, Value, VectorParams, VectorsConfig,
        UpsertPoints, WithPayloadSelector,
    },
    Qdrant,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum VectorDBError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Operation failed: {0}")]
    Operation(String),
}

/// A document retrieved by similarity search.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScoredDocument {
    pub id: String,
    pub text: String,
    pub score: f32,
}

#[derive(Clone)]
pub struct VectorDB {
    client: Arc<Qdrant>,
}

impl VectorDB {
    pub async fn new(url: &str) -> Result<Self, VectorDBError> {
        let client = create_qdrant_client(url)
            .await
            .map_err(|e| VectorDBError::Connection(e.to_string()))?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Point ids are derived from the document id, so storing the same
    /// document twice replaces the existing point instead of duplicating it.
    pub fn point_id_for(document_id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, document_id.as_bytes()).to_string()
    }

    pub async fn create_collection(
        &self,
        name: &str,
        vector_size: u64,
    ) -> Result<(), VectorDBError> {
        let vectors_config = VectorParams {
            size: vector_size,
            distance: Distance::Cosine.into(),
            ..Default::default()
        };

        let vectors_config = VectorsConfig {
            config: Some(qdrant_client::qdrant::vectors_config::Config::Params(
                vectors_config,
            )),
        };

        let create_collection = CreateCollection {
            collection_name: name.to_string(),
            vectors_config: Some(vectors_config),
            ..Default::default()
        };

        match self.client.create_collection(create_collection).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("AlreadyExists") => {
                log::info!("Collection {} already exists, skipping creation", name);
                Ok(())
            }
            Err(e) => Err(VectorDBError::Operation(e.to_string())),
        }
    }

    pub async fn store_document(
        &self,
        collection: &str,
        document_id: &str,
        text: &str,
        vector: Vec<f32>,
    ) -> Result<String, VectorDBError> {
        let point_id = Self::point_id_for(document_id);

        let mut payload: HashMap<String, Value> = HashMap::new();
        payload.insert(
            "doc_id".to_string(),
            Value::from(serde_json::Value::String(document_id.to_string())),
        );
        payload.insert(
            "text".to_string(),
            Value::from(serde_json::Value::String(text.to_string())),
        );

        let point = PointStruct {
            id: Some(PointId {
                point_id_options: Some(PointIdOptions::Uuid(point_id.clone())),
            }),
            vectors: Some(vector.into()),
            payload,
        };

        let upsert_points = UpsertPoints {
            collection_name: collection.to_string(),
            points: vec![point],
            ..Default::default()
        };

        self.client
            .upsert_points(upsert_points)
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        Ok(point_id)
    }

    pub async fn search_documents(
        &self,
        collection: &str,
        query_vector: Vec<f32>,
        limit: u64,
    ) -> Result<Vec<ScoredDocument>, VectorDBError> {
        let request = SearchPoints {
            collection_name: collection.to_string(),
            vector: query_vector,
            limit,
            with_payload: Some(WithPayloadSelector {
                selector_options: Some(SelectorOptions::Enable(true)),
            }),
            ..Default::default()
        };

        let results = self
            .client
            .search_points(request)
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        let documents = results
            .result
            .into_iter()
            .filter_map(|point| {
                let payload: HashMap<String, serde_json::Value> = point
                    .payload
                    .into_iter()
                    .map(|(k, v)| {
                        (
                            k,
                            serde_json::Value::try_from(v).unwrap_or(serde_json::Value::Null),
                        )
                    })
                    .collect();

                let id = payload.get("doc_id")?.as_str()?.to_string();
                let text = payload.get("text")?.as_str()?.to_string();

                Some(ScoredDocument {
                    id,
                    text,
                    score: point.score,
                })
            })
            .collect();

        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_deterministic() {
        let a = VectorDB::point_id_for("incident_ABC123.pdf");
        let b = VectorDB::point_id_for("incident_ABC123.pdf");
        assert_eq!(a, b);
    }

    #[test]
    fn point_ids_differ_per_document() {
        let a = VectorDB::point_id_for("incident_A.pdf");
        let b = VectorDB::point_id_for("incident_B.pdf");
        assert_ne!(a, b);
    }

    #[test]
    fn point_ids_are_valid_uuids() {
        let id = VectorDB::point_id_for("all_incidents_summary.pdf");
        assert!(Uuid::parse_str(&id).is_ok());
    }
}
