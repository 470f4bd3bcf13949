//! Device positions pushed into the location feed.

use axum::{
    Json, Router,
    extract::State,
    response::Json as ResponseJson,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use services::services::location::Fix;
use utils::{geo::Position, response::ApiResponse};

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct LocationUpdate {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

pub async fn push_location(
    State(state): State<AppState>,
    Json(update): Json<LocationUpdate>,
) -> Result<ResponseJson<ApiResponse<Fix>>, ApiError> {
    let position = Position::new(update.latitude, update.longitude);
    if !position.is_valid() {
        return Err(ApiError::BadRequest(format!(
            "invalid coordinates ({}, {})",
            update.latitude, update.longitude
        )));
    }

    let fix = Fix {
        position,
        timestamp: update.timestamp.unwrap_or_else(Utc::now),
        accuracy: update.accuracy,
    };
    state.feed().push(fix);
    Ok(ResponseJson(ApiResponse::success(fix)))
}

pub async fn latest_location(State(state): State<AppState>) -> ResponseJson<ApiResponse<Option<Fix>>> {
    ResponseJson(ApiResponse::success(state.feed().latest()))
}

/// Revoke location access until the next pushed fix.
pub async fn disable_location(State(state): State<AppState>) -> ResponseJson<ApiResponse<()>> {
    state.feed().disable();
    ResponseJson(ApiResponse::success(()))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new().route(
        "/location",
        get(latest_location)
            .post(push_location)
            .delete(disable_location),
    )
}
