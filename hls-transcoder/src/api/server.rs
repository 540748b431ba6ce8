//! API server setup and configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::Request;
use axum::response::Response;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::api::routes;
use crate::channel::ChannelRegistry;
use crate::config::AppConfig;
use crate::encoder::{EncodeEngine, EncodeOrchestrator};
use crate::error::{Error, Result};
use crate::probe::MediaProber;
use crate::publish::{PublishPipeline, RemoteStore};

/// API server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8096,
            enable_cors: true,
        }
    }
}

impl ApiServerConfig {
    /// Reads `API_BIND_ADDRESS` and `API_PORT`; anything unset or invalid
    /// keeps its default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(bind_address) = lookup("API_BIND_ADDRESS")
            && !bind_address.trim().is_empty()
        {
            config.bind_address = bind_address.trim().to_string();
        }

        if let Some(port) = lookup("API_PORT") {
            match port.trim().parse::<u16>() {
                Ok(parsed) => config.port = parsed,
                Err(_) => tracing::warn!(value = %port, "Invalid API_PORT, using default"),
            }
        }

        config
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    pub config: Arc<AppConfig>,
    pub orchestrator: Arc<EncodeOrchestrator>,
    pub prober: Arc<MediaProber>,
    /// Live push channels
    pub channels: ChannelRegistry,
    pub publisher: PublishPipeline,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        orchestrator: Arc<EncodeOrchestrator>,
        prober: Arc<MediaProber>,
        channels: ChannelRegistry,
        publisher: PublishPipeline,
    ) -> Self {
        Self {
            start_time: Instant::now(),
            config,
            orchestrator,
            prober,
            channels,
            publisher,
        }
    }

    /// Wire every service from `config`.
    ///
    /// Cancelling `shutdown` kills running encoders.
    pub fn from_config(
        config: AppConfig,
        engine: Arc<dyn EncodeEngine>,
        store: Arc<dyn RemoteStore>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let plan = config.rendition_plan()?;
        let channels = ChannelRegistry::new();
        let publisher = PublishPipeline::new(store);
        let orchestrator = EncodeOrchestrator::new(
            engine,
            channels.clone(),
            publisher.clone(),
            plan,
            config.publish.token.clone(),
        )
        .with_shutdown_token(shutdown);
        let prober = MediaProber::new(&config.ffprobe_path);

        Ok(Self::new(
            Arc::new(config),
            Arc::new(orchestrator),
            Arc::new(prober),
            channels,
            publisher,
        ))
    }
}

/// Paths whose requests are not traced: health polls and long-lived sockets.
fn is_untraced(path: &str) -> bool {
    path.starts_with("/api/health") || path == "/ws"
}

/// HTTP front end for the transcoder.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState, cancel_token: CancellationToken) -> Self {
        Self {
            config,
            state,
            cancel_token,
        }
    }

    /// Routes plus CORS and request tracing.
    pub fn build_router(&self) -> Router {
        let mut router = routes::create_router(self.state.clone());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        let trace = TraceLayer::new_for_http()
            .make_span_with(|req: &Request| {
                if is_untraced(req.uri().path()) {
                    return Span::none();
                }
                tracing::info_span!("http", method = %req.method(), path = %req.uri().path())
            })
            .on_request(())
            .on_response(|res: &Response, latency: Duration, span: &Span| {
                if !span.is_disabled() {
                    tracing::info!(
                        parent: span,
                        status = res.status().as_u16(),
                        latency_ms = latency.as_millis() as u64,
                        "Request finished"
                    );
                }
            });

        router.layer(trace)
    }

    /// Serve until the cancellation token fires.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| Error::ApiError(format!("Invalid listen address: {e}")))?;

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "Listening");

        let token = self.cancel_token.clone();
        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
            .map_err(|e| Error::ApiError(format!("Server error: {e}")))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn health_and_socket_are_untraced() {
        assert!(is_untraced("/api/health"));
        assert!(is_untraced("/ws"));
        assert!(!is_untraced("/api/transcode/movie.mp4"));
    }

    #[test]
    fn test_config_defaults() {
        let config = ApiServerConfig::default();
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.port, 8096);
        assert!(config.enable_cors);
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> =
            HashMap::from([("API_BIND_ADDRESS", "127.0.0.1"), ("API_PORT", "9100")]);
        let config = ApiServerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.port, 9100);
    }

    #[test]
    fn test_blank_bind_address_keeps_default() {
        let config = ApiServerConfig::from_lookup(|k| (k == "API_BIND_ADDRESS").then(|| "  ".to_string()));
        assert_eq!(config.bind_address, "0.0.0.0");
    }
}
