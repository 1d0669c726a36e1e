pub mod embeddings;
pub mod handler;

pub use embeddings::EmbeddingGenerator;
pub use handler::{LlmHandler, LlmProvider, SYSTEM_MESSAGE};
