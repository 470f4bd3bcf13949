use axum::{
    Json, Router,
    extract::State,
    response::Json as ResponseJson,
    routing::post,
};
use db::models::notification::{NotificationPayload, RemoteMessage};
use serde::Deserialize;
use services::services::push_registration::RegistrationOutcome;
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError, routes::require_token};

#[derive(Debug, Deserialize)]
pub struct DeviceTokenRequest {
    pub token: String,
}

/// Register this device's push-messaging token with the backend.
pub async fn register_device_token(
    State(state): State<AppState>,
    Json(request): Json<DeviceTokenRequest>,
) -> Result<ResponseJson<ApiResponse<RegistrationOutcome>>, ApiError> {
    if request.token.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "device token must not be empty".to_string(),
        ));
    }
    let session_token = require_token(&state).await?;
    let outcome = state.push().register(&session_token, &request.token).await?;
    Ok(ResponseJson(ApiResponse::success(outcome)))
}

/// Show a message received from the push-messaging service.
pub async fn relay_message(
    State(state): State<AppState>,
    Json(message): Json<RemoteMessage>,
) -> Result<ResponseJson<ApiResponse<NotificationPayload>>, ApiError> {
    let payload = state.dispatcher().relay_remote_message(message).await?;
    Ok(ResponseJson(ApiResponse::success(payload)))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new().nest(
        "/push",
        Router::new()
            .route("/token", post(register_device_token))
            .route("/message", post(relay_message)),
    )
}
