//! Read-only stats API for shop owners.
//!
//! Both routes require `Authorization: Bearer <stats_token>` when
//! `[gateway] stats_token` is configured.

use super::AppState;
use crate::util::constant_time_eq;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};

// ── Bearer token auth ────────────────────────────────────────────

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
}

/// Returns an error response unless the stats token is unset or matches.
fn require_auth(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(), (StatusCode, Json<serde_json::Value>)> {
    let Some(expected) = state.stats_token.as_deref() else {
        return Ok(());
    };

    let token = extract_bearer_token(headers).unwrap_or("");
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "Unauthorized: send Authorization: Bearer <stats_token>"
            })),
        ))
    }
}

fn internal_error(what: &str, bot_identifier: &str, e: &anyhow::Error) -> (StatusCode, Json<serde_json::Value>) {
    tracing::error!(tenant = bot_identifier, "Failed to load {what}: {e:#}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": format!("Failed to load {what}") })),
    )
}

// ── Handlers ─────────────────────────────────────────────────────

/// GET /api/token-usage/stats/{bot_identifier}
pub async fn handle_token_usage_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(bot_identifier): Path<String>,
) -> impl IntoResponse {
    if let Err(e) = require_auth(&state, &headers) {
        return e.into_response();
    }

    match state.usage.stats(&bot_identifier) {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => internal_error("token usage", &bot_identifier, &e).into_response(),
    }
}

/// GET /api/bots/{bot_identifier}/stats
pub async fn handle_conversation_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(bot_identifier): Path<String>,
) -> impl IntoResponse {
    if let Err(e) = require_auth(&state, &headers) {
        return e.into_response();
    }

    match state.conversations.conversation_stats(&bot_identifier) {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => internal_error("conversation stats", &bot_identifier, &e).into_response(),
    }
}
