//! Sign-in, sign-out and status of the tracking session.

use axum::{
    Json, Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, post},
};
use serde::Deserialize;
use services::services::session::SessionStatus;
use tracing::info;
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

/// Either an access token obtained elsewhere or credentials to exchange for one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum LoginRequest {
    Token { token: String },
    Credentials { email: String, password: String },
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<ResponseJson<ApiResponse<SessionStatus>>, ApiError> {
    let (token, profile) = match request {
        LoginRequest::Token { token } => {
            if token.trim().is_empty() {
                return Err(ApiError::BadRequest("token must not be empty".to_string()));
            }
            (token, None)
        }
        LoginRequest::Credentials { email, password } => {
            let info = state.client().login(&email, &password).await?;
            info!("Credentials exchanged for access token");
            let token = info.access_token.unwrap_or_default();
            (token, Some(serde_json::Value::Object(info.profile)))
        }
    };

    state.session().start_with_token(token, profile).await?;
    Ok(ResponseJson(ApiResponse::success(
        state.session().status().await,
    )))
}

pub async fn logout(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    state.session().logout().await?;
    state.children().clear_cache().await;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn status(State(state): State<AppState>) -> ResponseJson<ApiResponse<SessionStatus>> {
    ResponseJson(ApiResponse::success(state.session().status().await))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new().nest(
        "/session",
        Router::new()
            .route("/login", post(login))
            .route("/logout", post(logout))
            .route("/status", get(status)),
    )
}
