use axum::{
    Json, Router, extract::State, response::Json as ResponseJson, routing::get,
};
use db::models::reminder_settings::ReminderSettings;
use serde::Serialize;
use services::services::reminders::ScheduledReminder;
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

#[derive(Debug, Serialize)]
pub struct RemindersView {
    pub settings: ReminderSettings,
    /// Next occurrence of each enabled reminder, soonest first.
    pub upcoming: Vec<ScheduledReminder>,
}

pub async fn get_reminders(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<RemindersView>>, ApiError> {
    let reminders = state.reminders();
    Ok(ResponseJson(ApiResponse::success(RemindersView {
        settings: reminders.settings().await,
        upcoming: reminders.upcoming().await,
    })))
}

pub async fn update_reminders(
    State(state): State<AppState>,
    Json(settings): Json<ReminderSettings>,
) -> Result<ResponseJson<ApiResponse<RemindersView>>, ApiError> {
    let upcoming = state.reminders().update(settings.clone()).await?;
    Ok(ResponseJson(ApiResponse::success(RemindersView {
        settings,
        upcoming,
    })))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new().route("/reminders", get(get_reminders).put(update_reminders))
}
