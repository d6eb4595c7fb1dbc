//! Inbound channel contract.
//!
//! `POST /v1/inbound` accepts the normalized envelope from any channel
//! connector (Slack, Telegram, CLI, …) and blocks until the turn
//! produces a reply. Transport framing is the connector's problem;
//! this endpoint only sees `{user_id, text, channel, attachments?,
//! temp_dir?}`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use crate::runtime::{handle_message, InboundMessage};
use crate::state::AppState;

pub async fn inbound(
    State(state): State<AppState>,
    Json(envelope): Json<InboundMessage>,
) -> impl IntoResponse {
    if envelope.text.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "text must not be empty" })),
        )
            .into_response();
    }
    if envelope.user_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "user_id must not be empty" })),
        )
            .into_response();
    }

    let reply = handle_message(&state, envelope).await;
    Json(reply).into_response()
}

/// Cancel the active turn for a user, if any.
pub async fn stop(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let stopped = state.cancel_map.cancel(&user_id);
    Json(serde_json::json!({ "stopped": stopped }))
}

/// Daily usage introspection (per provider/model and per tier).
pub async fn usage_daily(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "summary": state.usage.daily_summary(),
        "by_tier": state.usage.daily_by_tier(),
        "total_cost_usd": state.usage.daily_total_cost(),
    }))
}
