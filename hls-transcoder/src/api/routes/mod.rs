//! API route modules.

pub mod health;
pub mod probe;
pub mod transcode;
pub mod ws;

use axum::Router;

use crate::api::error::ApiError;
use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/transcode", transcode::router())
        .nest("/api/probe", probe::router())
        .nest("/api/health", health::router())
        .merge(ws::router())
        .with_state(state)
}

/// Accept only a bare file name: no separators, no `.`/`..`.
pub(crate) fn validate_file_name(file_name: &str) -> Result<&str, ApiError> {
    let trimmed = file_name.trim();
    let invalid = trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\', '\0']);
    if invalid {
        return Err(ApiError::validation(format!(
            "Invalid file name: '{file_name}'"
        )));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        assert_eq!(validate_file_name("movie.mp4").unwrap(), "movie.mp4");
        assert_eq!(validate_file_name("my clip.v2.mkv").unwrap(), "my clip.v2.mkv");
    }

    #[test]
    fn rejects_traversal() {
        for name in ["", " ", ".", "..", "../etc/passwd", "a/b.mp4", r"a\b.mp4"] {
            assert!(validate_file_name(name).is_err(), "{name:?}");
        }
    }
}
