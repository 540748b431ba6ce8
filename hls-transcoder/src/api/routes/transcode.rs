//! Transcode submission route.

use std::path::Path;

use axum::{
    Json, Router,
    extract::{Path as UrlPath, State},
    http::HeaderMap,
    routing::post,
};
use serde::Serialize;

use super::validate_file_name;
use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::encoder::SubmitRequest;

/// Header carrying the caller's live channel id.
pub const SOCKET_ID_HEADER: &str = "socket-id";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeResponse {
    pub message: String,
    pub output_path: String,
    pub job_id: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/{file_name}", post(start_transcode))
}

/// Start transcoding `UPLOAD_DIR/<file_name>` into `OUTPUT_DIR/<file stem>`.
///
/// Responds once the job is accepted; progress arrives on the caller's live
/// channel.
async fn start_transcode(
    State(state): State<AppState>,
    UrlPath(file_name): UrlPath<String>,
    headers: HeaderMap,
) -> ApiResult<Json<TranscodeResponse>> {
    let channel_id = headers
        .get(SOCKET_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::connection_not_found(""))?
        .to_string();

    let file_name = validate_file_name(&file_name)?;
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());

    let request = SubmitRequest {
        source_path: state.config.upload_dir.join(file_name),
        output_dir: state.config.output_dir.join(stem),
        channel_id,
    };

    let ack = state.orchestrator.submit(request).await?;

    Ok(Json(TranscodeResponse {
        message: "Transcoding started.".to_string(),
        output_path: ack.output_dir.to_string_lossy().to_string(),
        job_id: ack.job_id,
    }))
}
