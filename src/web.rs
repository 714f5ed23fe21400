//! HTTP health/status surface

use crate::bot::SharedSession;
use crate::config::Config;
use crate::error::Result;
use crate::qr;
use crate::session::ConnectionState;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct WebState {
    pub session: SharedSession,
    pub bot_name: Arc<str>,
}

impl WebState {
    pub fn new(session: SharedSession, bot_name: &str) -> Self {
        Self {
            session,
            bot_name: Arc::from(bot_name),
        }
    }
}

/// Standard JSON error body
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = json!({ "error": message.into() });
    (status, Json(body)).into_response()
}

pub fn build_router(state: WebState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/qrcode", get(qrcode_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process exits
pub async fn serve(config: &Config, state: WebState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!("HTTP server listening on {}", listener.local_addr()?);
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

async fn health_handler(State(state): State<WebState>) -> impl IntoResponse {
    let session = state.session.lock().await;
    let body = json!({
        "status": "ok",
        "connected": session.is_connected(),
        "uptime": session.uptime_secs(Utc::now()),
    });
    (StatusCode::OK, Json(body))
}

async fn status_handler(State(state): State<WebState>) -> impl IntoResponse {
    let session = state.session.lock().await;
    let mut body = json!({
        "connected": session.is_connected(),
        "state": session.state(),
    });
    if let Some(token) = session.qr_token() {
        body["qr"] = json!(token);
    }
    if let Some(user) = session.user() {
        body["user"] = json!(user);
    }
    (StatusCode::OK, Json(body))
}

async fn qrcode_handler(State(state): State<WebState>) -> Response {
    let token = state.session.lock().await.qr_token().map(str::to_string);
    let Some(token) = token else {
        return api_error(StatusCode::NOT_FOUND, "no pairing code available");
    };

    match qr::render_png(&token) {
        Ok(png) => (StatusCode::OK, [(header::CONTENT_TYPE, "image/png")], png).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn index_handler(State(state): State<WebState>) -> Html<String> {
    let (phase, token, user, uptime) = {
        let session = state.session.lock().await;
        (
            session.state(),
            session.qr_token().map(str::to_string),
            session.user().map(str::to_string),
            session.uptime_secs(Utc::now()),
        )
    };

    let body = match (phase, token) {
        (ConnectionState::AwaitingPairing, Some(token)) => {
            let svg = qr::render_svg(&token).unwrap_or_default();
            format!(
                "<h2>Scan to pair</h2>\n<p>Open WhatsApp &rarr; Linked devices &rarr; Link a device.</p>\n{}",
                svg
            )
        }
        (ConnectionState::Ready, _) => format!(
            "<h2>Connected</h2>\n<p>Paired as {}.</p>",
            escape_html(user.as_deref().unwrap_or("unknown"))
        ),
        (phase, _) => format!("<h2>{}</h2>\n<p>Waiting for the client...</p>", phase),
    };

    Html(format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><meta http-equiv=\"refresh\" content=\"10\">\
<title>{name}</title></head>\n<body>\n<h1>{name}</h1>\n{body}\n<p>Uptime: {uptime}s</p>\n</body></html>\n",
        name = escape_html(&state.bot_name),
        body = body,
        uptime = uptime
    ))
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
