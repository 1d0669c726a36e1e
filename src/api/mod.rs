use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;
use validator::Validate;

use crate::extractor;
use crate::rag::{RagPipeline, DEFAULT_TOP_K};

const MAX_IN_FLIGHT: usize = 32;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<RagPipeline>,
    upload_dir: PathBuf,
}

#[derive(Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, max = 1000))]
    query: String,
    top_k: Option<u64>,
}

#[derive(Serialize)]
struct MessageBody {
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Create and configure the API router.
pub fn create_api(pipeline: Arc<RagPipeline>, upload_dir: PathBuf) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    let state = AppState {
        pipeline,
        upload_dir,
    };

    Router::new()
        .route("/upload_and_index_pdf", post(upload_and_index_pdf))
        .route("/query", post(query_handler))
        .route("/health", get(health_check))
        .layer(GlobalConcurrencyLimitLayer::new(MAX_IN_FLIGHT))
        .layer(cors)
        .with_state(state)
}

async fn upload_and_index_pdf(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut file: Option<(String, Vec<u8>)> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or("").to_string();
            match field.bytes().await {
                Ok(bytes) => {
                    file = Some((file_name, bytes.to_vec()));
                    break;
                }
                Err(e) => {
                    return error_response(
                        StatusCode::BAD_REQUEST,
                        format!("Failed to read upload: {}", e),
                    )
                }
            }
        }
    }

    let Some((file_name, bytes)) = file else {
        return error_response(StatusCode::BAD_REQUEST, "No file part in the request");
    };

    if let Some(reason) = validate_file_name(&file_name) {
        return error_response(StatusCode::BAD_REQUEST, reason);
    }

    // Only the final path component; uploads must not escape the upload dir.
    let safe_name = Path::new(&file_name)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.clone());
    let file_path = state.upload_dir.join(&safe_name);

    if let Err(e) = tokio::fs::create_dir_all(&state.upload_dir).await {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error processing PDF: {}", e),
        );
    }
    if let Err(e) = tokio::fs::write(&file_path, &bytes).await {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error processing PDF: {}", e),
        );
    }

    let result = index_pdf(&state, file_path.clone(), safe_name).await;

    if let Err(e) = tokio::fs::remove_file(&file_path).await {
        warn!(
            "Error removing temporary file {}: {}",
            file_path.display(),
            e
        );
    }

    match result {
        Ok(()) => Json(MessageBody {
            message: "PDF processed, text extracted and indexed.".to_string(),
        })
        .into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error processing PDF: {}", e),
        ),
    }
}

async fn index_pdf(state: &AppState, path: PathBuf, document_id: String) -> anyhow::Result<()> {
    // pdf parsing is CPU-bound; keep it off the async worker.
    let text = tokio::task::spawn_blocking(move || extractor::extract_text(&path)).await??;
    state
        .pipeline
        .add_documents(&[text], Some(vec![document_id]))
        .await
}

async fn query_handler(State(state): State<AppState>, Json(request): Json<QueryRequest>) -> Response {
    if let Err(e) = request.validate() {
        return error_response(StatusCode::BAD_REQUEST, format!("Invalid request: {}", e));
    }

    match state
        .pipeline
        .query(&request.query, request.top_k.unwrap_or(DEFAULT_TOP_K))
        .await
    {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Query failed: {}", e),
        ),
    }
}

async fn health_check() -> Response {
    Json(MessageBody {
        message: "Server is running and healthy".to_string(),
    })
    .into_response()
}

fn validate_file_name(file_name: &str) -> Option<&'static str> {
    if file_name.is_empty() {
        Some("No selected file")
    } else if !file_name.to_lowercase().ends_with(".pdf") {
        Some("Invalid file type. Only PDF files are allowed.")
    } else {
        None
    }
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: error.into(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_validation_matches_upload_rules() {
        assert_eq!(validate_file_name(""), Some("No selected file"));
        assert_eq!(
            validate_file_name("report.txt"),
            Some("Invalid file type. Only PDF files are allowed.")
        );
        assert_eq!(validate_file_name("incident_A1.pdf"), None);
        assert_eq!(validate_file_name("REPORT.PDF"), None);
    }

    #[test]
    fn query_length_is_bounded() {
        let empty = QueryRequest {
            query: String::new(),
            top_k: None,
        };
        assert!(empty.validate().is_err());

        let ok = QueryRequest {
            query: "What happened on I-35?".to_string(),
            top_k: Some(3),
        };
        assert!(ok.validate().is_ok());

        let too_long = QueryRequest {
            query: "x".repeat(1001),
            top_k: None,
        };
        assert!(too_long.validate().is_err());
    }
}
