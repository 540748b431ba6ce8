//! Source probing route.

use axum::{
    Json, Router,
    extract::{Path as UrlPath, State},
    routing::post,
};

use super::validate_file_name;
use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::error::Error;
use crate::probe::ProbeResult;

pub fn router() -> Router<AppState> {
    Router::new().route("/{file_name}", post(probe_file))
}

/// Probe an uploaded file.
async fn probe_file(
    State(state): State<AppState>,
    UrlPath(file_name): UrlPath<String>,
) -> ApiResult<Json<ProbeResult>> {
    let file_name = validate_file_name(&file_name)?;
    let path = state.config.upload_dir.join(file_name);

    let result = state.prober.probe(&path).await.map_err(Error::from)?;
    Ok(Json(result))
}
