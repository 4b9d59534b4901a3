use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ragline_core::PipelineError;
use ragline_memory::{ChunkId, Document, DocumentId, IngestError};

use super::server::AppState;

#[derive(serde::Deserialize)]
pub(crate) struct AskRequest {
    pub question: String,
}

#[derive(serde::Serialize)]
struct AskResponse {
    answer: String,
    success: bool,
    sources: Vec<ChunkId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    degraded_reason: Option<String>,
}

#[derive(serde::Deserialize)]
pub(crate) struct IngestRequest {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(serde::Serialize)]
struct IngestResponse {
    document_id: DocumentId,
    chunk_ids: Vec<ChunkId>,
}

#[derive(serde::Serialize)]
struct RemoveResponse {
    document_id: DocumentId,
    removed: Vec<ChunkId>,
}

/// Chunk as served over HTTP; the embedding is summarised by its length.
#[derive(serde::Serialize)]
struct ChunkResponse<'a> {
    id: ChunkId,
    document_id: &'a DocumentId,
    position: usize,
    start: usize,
    end: usize,
    text: &'a str,
    dimensions: usize,
    /// Metadata of the parent document.
    metadata: BTreeMap<String, String>,
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(serde::Serialize)]
struct StatsResponse {
    uptime_secs: u64,
    documents: usize,
    chunks: usize,
}

#[derive(serde::Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

pub(crate) async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

pub(crate) async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.corpus.store();
    Json(StatsResponse {
        uptime_secs: state.started_at.elapsed().as_secs(),
        documents: store.document_count(),
        chunks: store.chunk_count(),
    })
}

pub(crate) async fn ask_handler(
    State(state): State<AppState>,
    Json(payload): Json<AskRequest>,
) -> Response {
    match state.pipeline.answer(&payload.question).await {
        Ok(answer) => Json(AskResponse {
            answer: answer.text,
            success: answer.success,
            sources: answer.sources,
            degraded_reason: answer.degraded_reason.map(|r| r.to_string()),
        })
        .into_response(),
        Err(PipelineError::EmptyQuestion) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, "question must not be empty")
        }
        Err(e) => {
            tracing::error!(error = %e, "ask failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

pub(crate) async fn ingest_handler(
    State(state): State<AppState>,
    Json(payload): Json<IngestRequest>,
) -> Response {
    if payload.id.trim().is_empty() {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "document id must not be empty");
    }

    let mut document = Document::new(payload.id, payload.text);
    document.metadata.extend(payload.metadata);
    let document_id = document.id.clone();

    match state.corpus.ingest(document).await {
        Ok(chunk_ids) => Json(IngestResponse {
            document_id,
            chunk_ids,
        })
        .into_response(),
        Err(IngestError::Embedding(e)) => {
            tracing::warn!(%document_id, error = %e, "ingestion rejected");
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        Err(e @ IngestError::Conflict { .. }) => error_response(StatusCode::CONFLICT, e.to_string()),
        Err(IngestError::Storage(e)) => {
            tracing::error!(%document_id, error = %e, "ingestion failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

pub(crate) async fn remove_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let document_id = DocumentId::new(id);
    match state.corpus.remove_document(&document_id).await {
        Ok(removed) => Json(RemoveResponse {
            document_id,
            removed,
        })
        .into_response(),
        Err(e) if e.is_not_found() => error_response(StatusCode::NOT_FOUND, e.to_string()),
        Err(e) => {
            tracing::error!(%document_id, error = %e, "removal failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

pub(crate) async fn chunk_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Ok(chunk_id) = id.parse::<ChunkId>() else {
        return error_response(StatusCode::NOT_FOUND, format!("chunk not found: {id}"));
    };
    match state.corpus.chunk(&chunk_id) {
        Some(chunk) => Json(ChunkResponse {
            id: chunk.id,
            document_id: &chunk.document_id,
            position: chunk.position,
            start: chunk.start,
            end: chunk.end,
            text: &chunk.text,
            dimensions: chunk.embedding.len(),
            metadata: state
                .corpus
                .document_metadata(&chunk.document_id)
                .unwrap_or_default(),
        })
        .into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("chunk not found: {chunk_id}")),
    }
}
