use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    extract::MatchedPath,
    http::{header, HeaderValue, Method, Request},
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth;
use crate::state::AppState;

const RESET_SEGMENT: &str = "/reset-password/";

/// Path recorded on request spans. Uses the route template when a route
/// matched, so path parameters such as reset tokens never reach the logs.
fn span_path<B>(req: &Request<B>) -> String {
    match req.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_string(),
        None => redact_path(req.uri().path()),
    }
}

fn redact_path(path: &str) -> String {
    match path.split_once(RESET_SEGMENT) {
        Some((head, _)) => format!("{head}{RESET_SEGMENT}[redacted]"),
        None => path.to_string(),
    }
}

pub fn build_app(state: AppState) -> anyhow::Result<Router> {
    let origin = HeaderValue::from_str(&state.config.cors_origin)
        .context("CORS_ORIGIN is not a valid origin")?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let app = Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .nest("/users", auth::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request<_>| {
                    let method = req.method().clone();
                    let path = span_path(req);
                    tracing::info_span!("http_request", %method, %path, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        );
    Ok(app)
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
