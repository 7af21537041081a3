use std::any::Any;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{ConnectInfo, DefaultBodyLimit, FromRequest, Request, State},
    http::{HeaderMap, Method, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tracing::Instrument;
use uuid::Uuid;

use super::rate_limit::ClientRateLimiter;
use crate::config::RelayConfig;
use crate::error::GENERIC_FAILURE_MESSAGE;
use crate::relay::{RawPayload, SubmissionRequest, SubmissionService};
use crate::security::{SecurityEvent, log_security_event};

const RATE_LIMITED_MESSAGE: &str = "Too many requests. Please try again later.";
const TOO_LARGE_MESSAGE: &str = "Request too large.";
const BAD_BODY_MESSAGE: &str = "Invalid request body.";

/// Limits applied at the HTTP edge.
#[derive(Debug, Clone, Copy)]
pub struct WebSettings {
    pub max_body_bytes: usize,
    pub rate_limit_per_minute: u32,
    /// Honour `X-Forwarded-For`/`X-Real-IP` when identifying clients.
    pub trust_proxy_headers: bool,
}

impl From<&RelayConfig> for WebSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            max_body_bytes: config.max_body_bytes,
            rate_limit_per_minute: config.rate_limit_per_minute,
            trust_proxy_headers: config.trust_proxy_headers,
        }
    }
}

/// Shared state for the relay routes.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SubmissionService>,
    pub limiter: Arc<ClientRateLimiter>,
    pub trust_proxy_headers: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Failure,
}

/// Body of every `/submit` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub status: ResponseStatus,
    pub message: String,
}

impl SubmissionResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Failure,
            message: message.into(),
        }
    }
}

fn reply(status: StatusCode, body: SubmissionResponse) -> Response {
    (status, Json(body)).into_response()
}

/// Build the relay router: `POST /submit` and `GET /health`.
pub fn relay_routes(service: Arc<SubmissionService>, settings: WebSettings) -> Router {
    let state = AppState {
        service,
        limiter: Arc::new(ClientRateLimiter::per_minute(settings.rate_limit_per_minute)),
        trust_proxy_headers: settings.trust_proxy_headers,
    };

    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(AnyOrigin);

    Router::new()
        .route("/submit", post(submit))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(settings.max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(panic_response))
                .layer(cors),
        )
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "secure-form-relay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Address claimed by proxy headers: first `X-Forwarded-For` hop, then `X-Real-IP`.
pub fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    };

    header("x-forwarded-for").or_else(|| header("x-real-ip"))
}

/// Address a request is attributed to. Proxy headers are client-controlled,
/// so they only count when `trust_proxy_headers` is set; otherwise the
/// connection peer is used.
pub fn client_addr(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> Option<IpAddr> {
    if trust_proxy_headers
        && let Some(ip) = forwarded_ip(headers).and_then(|v| v.parse::<IpAddr>().ok())
    {
        return Some(ip);
    }
    peer.map(|addr| addr.ip())
}

async fn submit(State(state): State<AppState>, request: Request) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_addr(request.headers(), peer, state.trust_proxy_headers);
    let forwarded = forwarded_ip(request.headers());

    let span = tracing::info_span!(
        "submission",
        request_id = %Uuid::new_v4(),
        client_ip = ?client,
        forwarded_for = forwarded.as_deref().unwrap_or("-"),
    );
    handle_submit(state, request, client).instrument(span).await
}

async fn handle_submit(state: AppState, request: Request, client: Option<IpAddr>) -> Response {
    let client_ip = client.map(|ip| ip.to_string());
    if !state
        .limiter
        .check(client.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)))
    {
        log_security_event(
            SecurityEvent::RateLimited,
            "per-minute limit",
            client_ip.as_deref(),
        );
        return reply(
            StatusCode::TOO_MANY_REQUESTS,
            SubmissionResponse::failure(RATE_LIMITED_MESSAGE),
        );
    }

    let payload = match decode_payload(request).await {
        Ok(payload) => payload,
        Err(StatusCode::PAYLOAD_TOO_LARGE) => {
            log_security_event(
                SecurityEvent::OversizedRequest,
                "body over limit",
                client_ip.as_deref(),
            );
            return reply(
                StatusCode::PAYLOAD_TOO_LARGE,
                SubmissionResponse::failure(TOO_LARGE_MESSAGE),
            );
        }
        Err(status) => {
            tracing::debug!(%status, "Undecodable submission body");
            return reply(
                StatusCode::BAD_REQUEST,
                SubmissionResponse::failure(BAD_BODY_MESSAGE),
            );
        }
    };

    let request = SubmissionRequest { payload, client_ip };
    match state.service.submit(&request).await {
        Ok(receipt) => reply(StatusCode::OK, SubmissionResponse::success(receipt.notice)),
        Err(e) => {
            tracing::info!(error = %e, "Submission rejected");
            let status = if e.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::OK
            };
            reply(status, SubmissionResponse::failure(e.user_message()))
        }
    }
}

/// Decode a JSON object or urlencoded form into a raw payload.
///
/// On failure the extractor's status is returned (413 for oversized bodies).
async fn decode_payload(request: Request) -> Result<RawPayload, StatusCode> {
    let is_form = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

    if is_form {
        let Form(fields) = Form::<HashMap<String, String>>::from_request(request, &())
            .await
            .map_err(|rejection| rejection.status())?;
        Ok(fields
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect())
    } else {
        let Json(payload) = Json::<RawPayload>::from_request(request, &())
            .await
            .map_err(|rejection| rejection.status())?;
        Ok(payload)
    }
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(%detail, "Request handler panicked");
    reply(
        StatusCode::INTERNAL_SERVER_ERROR,
        SubmissionResponse::failure(GENERIC_FAILURE_MESSAGE),
    )
}
