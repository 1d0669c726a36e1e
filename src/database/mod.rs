pub mod qdrant_config;
pub mod vector_db;

pub use vector_db::{ScoredDocument, VectorDB, VectorDBError};
