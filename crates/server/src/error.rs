use axum::{
    http::StatusCode,
    response::{IntoResponse, Json as ResponseJson, Response},
};
use services::services::{
    enact_api::EnactApiError, notification::NotifyError,
    push_registration::PushRegistrationError, reminders::ReminderError, session::SessionError,
};
use thiserror::Error;
use tracing::error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Backend(#[from] EnactApiError),
    #[error(transparent)]
    PushRegistration(#[from] PushRegistrationError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
    #[error(transparent)]
    Reminder(#[from] ReminderError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    BadRequest(String),
    #[error("not signed in")]
    NotSignedIn,
}

fn backend_status(e: &EnactApiError) -> StatusCode {
    match e {
        EnactApiError::Unauthorized => StatusCode::UNAUTHORIZED,
        EnactApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        EnactApiError::Http { status, .. } if (400..500).contains(status) => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Session(SessionError::Api(e)) | ApiError::Backend(e) => {
                (backend_status(e), e.user_message())
            }
            ApiError::PushRegistration(PushRegistrationError::Api(e)) => {
                (backend_status(e), e.user_message())
            }
            ApiError::Session(SessionError::NotSignedIn) | ApiError::NotSignedIn => {
                (StatusCode::UNAUTHORIZED, "Not signed in".to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Reminder(ReminderError::Invalid(msg)) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            ApiError::Session(SessionError::Database(_))
            | ApiError::Reminder(ReminderError::Database(_))
            | ApiError::PushRegistration(PushRegistrationError::Database(_))
            | ApiError::Database(_) => {
                error!(error = %self, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            ApiError::Notify(e) => {
                error!(error = %e, "Notification error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to display notification".to_string(),
                )
            }
        };

        (status, ResponseJson(ApiResponse::<()>::error(message))).into_response()
    }
}
