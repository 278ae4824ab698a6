// HTTP routes: `/api/events` and the four `/api/upload_*` endpoints

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value};

use super::events::clamp_limit;
use super::sanitize::DEFAULT_ROOM;
use super::uploads::{UploadKind, UploadMeta};
use super::{CollectorState, StoreError};
use crate::relay::RESET;
use crate::warn;

/// Upload bodies beyond this are rejected
const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// `{ok: false, error, detail}` with a status code
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    error: String,
    detail: Option<String>,
}

impl ApiError {
    fn bad_request(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl ToString) -> Self {
        self.detail = Some(detail.to_string());
        self
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let error = match &e {
            StoreError::Io { .. } => "storage error",
            StoreError::Encode(_) => "cannot encode event",
            StoreError::TooManyCollisions(_) => "Too many name collisions",
        };
        warn!("[server] request failed: {}", e);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: error.to_string(),
            detail: Some(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "ok": false, "error": self.error });
        if let Some(detail) = self.detail {
            body["detail"] = Value::from(detail);
        }
        (self.status, Json(body)).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

pub fn router(state: Arc<CollectorState>) -> Router {
    Router::new()
        .route("/api/events", get(list_events).post(post_event))
        .route("/api/upload_audio", post(upload_audio))
        .route("/api/upload_question_clip", post(upload_question_clip))
        .route("/api/upload_log", post(upload_log))
        .route("/api/upload_textlog", post(upload_textlog))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

fn as_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Bodies that are not a JSON object are treated as empty
async fn post_event(State(state): State<Arc<CollectorState>>, body: Bytes) -> ApiResult {
    let body: Map<String, Value> = serde_json::from_slice(&body).unwrap_or_default();
    let room = as_text(body.get("roomId"));
    let event_type = as_text(body.get("type"));
    if event_type.is_empty() {
        return Err(ApiError::bad_request("type is required"));
    }

    if event_type == RESET {
        let room_id = state.events.reset(&room).await?;
        return Ok(Json(json!({ "ok": true, "reset": true, "roomId": room_id })));
    }

    let appended = state.events.append(&room, body).await?;
    Ok(Json(
        json!({ "ok": true, "id": appended.id, "serverTs": appended.server_ts }),
    ))
}

async fn list_events(
    State(state): State<Arc<CollectorState>>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    let room = params
        .get("roomId")
        .map_or(DEFAULT_ROOM, String::as_str);
    let since = params
        .get("since")
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(0);
    let limit = clamp_limit(params.get("limit").and_then(|s| s.trim().parse().ok()));

    let events = state.events.since(room, since, limit).await?;
    Ok(Json(json!({ "ok": true, "events": events })))
}

/// Payload and meta parts of a multipart upload
struct UploadParts {
    bytes: Bytes,
    content_type: Option<String>,
    meta: Option<String>,
}

async fn read_parts(mut multipart: Multipart, file_field: &str) -> Result<UploadParts, ApiError> {
    let mut file = None;
    let mut meta = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request("Upload error").with_detail(e))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == file_field {
            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request("Upload error").with_detail(e))?;
            file = Some((bytes, content_type));
        } else if name == "meta" {
            let text = field
                .text()
                .await
                .map_err(|e| ApiError::bad_request("Invalid meta").with_detail(e))?;
            meta = Some(text);
        }
    }

    let Some((bytes, content_type)) = file else {
        return Err(ApiError::bad_request(format!("No {} file", file_field)));
    };
    Ok(UploadParts {
        bytes,
        content_type,
        meta,
    })
}

/// Clips require a valid meta part; the other uploads fall back to defaults
fn parse_meta(kind: UploadKind, raw: Option<&str>) -> Result<UploadMeta, ApiError> {
    match (kind, raw) {
        (UploadKind::QuestionClip, None) => Err(ApiError::bad_request("Missing meta")),
        (UploadKind::QuestionClip, Some(raw)) => {
            UploadMeta::parse(raw).map_err(|e| ApiError::bad_request("Invalid meta JSON").with_detail(e))
        }
        (_, raw) => Ok(raw
            .and_then(|r| UploadMeta::parse(r).ok())
            .unwrap_or_default()),
    }
}

async fn store_upload(state: &CollectorState, kind: UploadKind, multipart: Multipart) -> ApiResult {
    let parts = read_parts(multipart, kind.file_field()).await?;
    let meta = parse_meta(kind, parts.meta.as_deref())?;
    let file = state
        .uploads
        .save(kind, &meta, parts.content_type.as_deref(), &parts.bytes)
        .await?;
    Ok(Json(json!({ "ok": true, "file": file })))
}

async fn upload_audio(State(state): State<Arc<CollectorState>>, multipart: Multipart) -> ApiResult {
    store_upload(&state, UploadKind::TrialAudio, multipart).await
}

async fn upload_question_clip(
    State(state): State<Arc<CollectorState>>,
    multipart: Multipart,
) -> ApiResult {
    store_upload(&state, UploadKind::QuestionClip, multipart).await
}

async fn upload_log(State(state): State<Arc<CollectorState>>, multipart: Multipart) -> ApiResult {
    store_upload(&state, UploadKind::TaskLog, multipart).await
}

async fn upload_textlog(State(state): State<Arc<CollectorState>>, multipart: Multipart) -> ApiResult {
    store_upload(&state, UploadKind::TextLog, multipart).await
}
