use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::tip::Tip;
use services::services::enact_api::TipsBackend;
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError, routes::require_token};

/// Tips for a context type, as shown when a tip notification is opened.
pub async fn get_tips(
    State(state): State<AppState>,
    Path(location_type): Path<String>,
) -> Result<ResponseJson<ApiResponse<Vec<Tip>>>, ApiError> {
    let token = require_token(&state).await?;
    let tips = state
        .client()
        .fetch_tips(&token, &location_type, state.config().backend.ai_tips)
        .await?;
    Ok(ResponseJson(ApiResponse::success(tips)))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new().route("/tips/{location_type}", get(get_tips))
}
