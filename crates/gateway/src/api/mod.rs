pub mod auth;
pub mod health;
pub mod inbound;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// The health probe is public; everything else sits behind the
/// bearer-token middleware (which passes everything in dev mode).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/v1/health", get(health::health));

    let protected = Router::new()
        .route("/v1/inbound", post(inbound::inbound))
        .route("/v1/sessions/:user_id/stop", post(inbound::stop))
        .route("/v1/usage/daily", get(inbound::usage_daily))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public.merge(protected)
}
