// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST endpoints.
//!
//! All endpoints share the per-source rate limit; everything except
//! registration requires a bearer token issued at `/v1/register`.

use crate::state::{RegisterRequest, RelayState, SendOutcome};
use crate::RelayError;
use anima_agora::Envelope;
use anima_core::Clock;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

/// Build the relay's router (REST + `/ws`).
pub fn router<C: Clock + 'static>(state: Arc<RelayState<C>>) -> Router {
    Router::new()
        .route("/v1/register", post(register::<C>))
        .route("/v1/send", post(send::<C>))
        .route("/v1/peers", get(peers::<C>))
        .route("/v1/messages", get(messages::<C>))
        .route("/v1/disconnect", delete(disconnect::<C>))
        .route("/ws", any(crate::ws::ws_handler::<C>))
        .with_state(state)
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            RelayError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({"ok": false, "error": "unauthorized"}),
            ),
            RelayError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({"ok": false, "error": "rate limited", "retry_after_ms": 60_000}),
            ),
            RelayError::UnknownRecipient(to) => (
                StatusCode::NOT_FOUND,
                json!({"ok": false, "error": format!("unknown recipient: {to}")}),
            ),
            RelayError::RecipientGone => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({"ok": false, "error": "recipient connection closed"}),
            ),
            RelayError::Invalid(message) => (
                StatusCode::BAD_REQUEST,
                json!({"ok": false, "error": message}),
            ),
        };
        (status, Json(body)).into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, RelayError> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(RelayError::Unauthorized)
}

async fn register<C: Clock + 'static>(
    State(state): State<Arc<RelayState<C>>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<RegisterRequest>,
) -> Result<Response, RelayError> {
    state.check_rate(addr.ip())?;
    let resp = state.register_rest(req)?;
    Ok(Json(resp).into_response())
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    to: String,
    envelope: Envelope,
}

async fn send<C: Clock + 'static>(
    State(state): State<Arc<RelayState<C>>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<SendRequest>,
) -> Result<Response, RelayError> {
    state.check_rate(addr.ip())?;
    let caller = state.authorize(bearer_token(&headers)?)?;

    let mut envelope = req.envelope;
    // A REST client may hand over an unsigned envelope; the relay signs
    // with the session key it already holds.
    if envelope.signature.is_none() {
        state.sign_for_session(&caller, &mut envelope)?;
    }
    state.validate_outbound(&envelope, &caller)?;

    let envelope_id = envelope.id.clone();
    match state.route(&req.to, envelope)? {
        SendOutcome::Delivered | SendOutcome::Buffered | SendOutcome::Duplicate => {
            Ok(Json(json!({"ok": true, "envelopeId": envelope_id})).into_response())
        }
    }
}

async fn peers<C: Clock + 'static>(
    State(state): State<Arc<RelayState<C>>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response, RelayError> {
    state.check_rate(addr.ip())?;
    let caller = state.authorize(bearer_token(&headers)?)?;
    Ok(Json(json!({"ok": true, "peers": state.peers_for(&caller)})).into_response())
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    since: Option<u64>,
    limit: Option<usize>,
}

async fn messages<C: Clock + 'static>(
    State(state): State<Arc<RelayState<C>>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<MessagesQuery>,
) -> Result<Response, RelayError> {
    state.check_rate(addr.ip())?;
    let caller = state.authorize(bearer_token(&headers)?)?;

    let limit = query.limit.unwrap_or(100);
    let (messages, has_more) = state.poll_messages(&caller, query.since, limit)?;
    Ok(Json(json!({"ok": true, "messages": messages, "hasMore": has_more})).into_response())
}

async fn disconnect<C: Clock + 'static>(
    State(state): State<Arc<RelayState<C>>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response, RelayError> {
    state.check_rate(addr.ip())?;
    let caller = state.authorize(bearer_token(&headers)?)?;
    state.disconnect_rest(&caller);
    Ok(Json(json!({"ok": true})).into_response())
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
