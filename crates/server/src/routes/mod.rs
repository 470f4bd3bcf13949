use axum::{Router, response::Json as ResponseJson, routing::get};
use tower_http::trace::TraceLayer;
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

pub mod children;
pub mod location;
pub mod push;
pub mod reminders;
pub mod session;
pub mod tips;

async fn health() -> ResponseJson<ApiResponse<&'static str>> {
    ResponseJson(ApiResponse::success("OK"))
}

/// Token of the signed-in session, for routes that call the backend on the
/// user's behalf. A session suspended after a 401 has none.
pub(crate) async fn require_token(state: &AppState) -> Result<String, ApiError> {
    state
        .session()
        .authenticated_token()
        .await
        .ok_or(ApiError::NotSignedIn)
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .merge(session::router(&state))
        .merge(location::router(&state))
        .merge(push::router(&state))
        .merge(children::router(&state))
        .merge(reminders::router(&state))
        .merge(tips::router(&state));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
