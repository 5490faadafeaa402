//! modelwire HTTP server
//!
//! Thin axum shell around [`modelwire_core::Router`]: every request is
//! forwarded through a single fallback handler, run against the shared
//! workspace, and answered with the JSON envelope the core produced.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, Request, State},
    http::{self, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Json,
};
use modelwire_core::{
    read_config, response::RequestEcho, ApiError, ApiRequest, ApiResponse, Config, Method, Router,
    Workspace,
};
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

struct AppState {
    router: Router,
    workspace: Mutex<Workspace>,
    max_body_bytes: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (config, config_error) = match read_config() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .init();

    if let Some(e) = config_error {
        warn!("{}; using default configuration", e);
    }

    let router = Router::standard()?;
    info!(routes = router.routes().count(), "route table compiled");

    let state = Arc::new(AppState {
        router,
        workspace: Mutex::new(Workspace::new(config.layout.clone())),
        max_body_bytes: config.max_body_bytes,
    });

    let app = axum::Router::new()
        .fallback(dispatch)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn(echo_panics))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("modelwire server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

// --- Handler ---

async fn dispatch(
    State(state): State<Arc<AppState>>,
    method: http::Method,
    uri: Uri,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    let method = match method.as_str().parse::<Method>() {
        Ok(method) => method,
        Err(_) => {
            let err = ApiError::not_found("Route", format!("{} {}", method, uri.path()));
            return failure(RequestEcho::new(method.as_str(), uri.path()), &err);
        }
    };
    let echo = || RequestEcho::new(method.as_str(), path.as_str());

    let bytes = match body {
        Ok(bytes) => bytes,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            let limit = state.max_body_bytes;
            return failure(echo(), &ApiError::PayloadTooLarge { limit });
        }
        Err(rejection) => {
            return failure(echo(), &ApiError::BadRequest(rejection.body_text()));
        }
    };

    let body = if bytes.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                return failure(echo(), &ApiError::BadRequest(format!("Invalid JSON body: {}", e)));
            }
        }
    };

    let mut request = ApiRequest::new(method, path.as_str());
    request.body = body;

    let response = {
        let mut workspace = state.workspace.lock().await;
        state.router.handle(&mut workspace, request).await
    };
    debug!(status = response.status, success = response.success, "handled");
    envelope(response)
}

fn failure(echo: RequestEcho, err: &ApiError) -> Response {
    envelope(ApiResponse::fail(echo, err))
}

fn envelope(response: ApiResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response)).into_response()
}

// --- Panics ---

/// Marks a response produced by the panic handler.
#[derive(Debug, Clone)]
struct Panicked(String);

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!(panic = %detail, "handler panicked");
    let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
    response.extensions_mut().insert(Panicked(detail));
    response
}

/// Give panic responses the standard envelope, echoing the request.
async fn echo_panics(request: Request, next: Next) -> Response {
    let echo = RequestEcho::new(
        request.method().as_str(),
        request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| request.uri().path().to_string()),
    );
    let response = next.run(request).await;
    match response.extensions().get::<Panicked>() {
        Some(Panicked(detail)) => failure(echo, &ApiError::Internal(detail.clone())),
        None => response,
    }
}
