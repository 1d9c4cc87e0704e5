use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

use crate::assets::{Asset, AssetRoot};
use crate::config::Config;
use crate::error::{AssetError, RefineError};
use crate::llm::RefineClient;
use crate::mode::{self, RefineMode};

const TEXT_PLAIN: &str = "text/plain; charset=UTF-8";

/// How paths that do not exist are answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServeProfile {
    /// GET/HEAD on an unknown path serve the index document
    #[default]
    Spa,
    /// Unknown paths are 404
    Static,
}

/// Shared, read-only server state
pub struct AppState {
    pub assets: AssetRoot,
    pub profile: ServeProfile,
    pub client: Option<RefineClient>,
}

type SharedState = Arc<AppState>;

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<RefineError> for ApiError {
    fn from(err: RefineError) -> Self {
        let status = match err {
            RefineError::EmptyInput => StatusCode::BAD_REQUEST,
            RefineError::Service => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct RefineRequest {
    pub text: String,
    pub mode: RefineMode,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefineResponse {
    pub html: String,
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/modes", get(api_modes))
        .route("/api/refine", post(api_refine))
        .fallback(serve_asset)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until Ctrl-C or SIGTERM
pub async fn serve(config: &Config, client: Option<RefineClient>) -> Result<()> {
    let addr: SocketAddr = config.bind_addr().await?;
    let assets = AssetRoot::new(&config.server.root, config.server.index.clone());
    let root_is_dir = tokio::fs::metadata(assets.root())
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if !root_is_dir {
        tracing::warn!(
            "Asset root {} is not a directory yet; requests fail until it exists",
            assets.root().display()
        );
    }
    match client {
        Some(ref client) => tracing::info!("Refine API enabled ({})", client.backend_name()),
        None => tracing::warn!("No LLM provider configured; /api/refine will answer 503"),
    }

    let state = Arc::new(AppState {
        assets,
        profile: config.server.profile,
        client,
    });
    let router = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to start server on {addr}"))?;

    let display_host = if addr.ip().is_unspecified() {
        "localhost".to_string()
    } else {
        addr.ip().to_string()
    };
    tracing::info!(
        "RefineMail UI running at http://{}:{} ({:?} profile)",
        display_host,
        addr.port(),
        config.server.profile
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn api_modes() -> impl IntoResponse {
    Json(mode::menu())
}

async fn api_refine(
    State(state): State<SharedState>,
    Json(request): Json<RefineRequest>,
) -> Result<Json<RefineResponse>, ApiError> {
    let client = state.client.as_ref().ok_or_else(|| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Refine service is not configured.",
        )
    })?;

    if request.text.trim().is_empty() {
        return Err(RefineError::EmptyInput.into());
    }

    let html = client.process(&request.text, request.mode).await?;
    Ok(Json(RefineResponse { html }))
}

async fn serve_asset(State(state): State<SharedState>, method: Method, uri: Uri) -> Response {
    let head = method == Method::HEAD;
    let path = uri.path();

    match state.assets.load(path).await {
        Ok(asset) => asset_response(asset, head),
        Err(AssetError::NotFound(_)) => {
            let fallback = state.profile == ServeProfile::Spa
                && (method == Method::GET || head);
            if !fallback {
                return plain(StatusCode::NOT_FOUND, "Not Found");
            }
            match state.assets.load_index().await {
                Ok(index) => asset_response(index, head),
                Err(e) => {
                    tracing::error!("SPA fallback for {} failed: {}", path, e);
                    plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                }
            }
        }
        Err(AssetError::Forbidden(_)) => {
            tracing::warn!("Rejected path outside asset root: {}", path);
            plain(StatusCode::FORBIDDEN, "Forbidden")
        }
        Err(AssetError::IsDirectory(_)) => {
            plain(StatusCode::FORBIDDEN, "Directory access is not allowed.")
        }
        Err(e) => {
            tracing::error!("Failed to serve {}: {}", path, e);
            plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn asset_response(asset: Asset, head: bool) -> Response {
    let len = asset.bytes.len();
    let body = if head {
        Body::empty()
    } else {
        Body::from(asset.bytes)
    };
    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, asset.content_type)],
        body,
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    response
}

fn plain(status: StatusCode, message: &'static str) -> Response {
    (status, [(header::CONTENT_TYPE, TEXT_PLAIN)], message).into_response()
}
