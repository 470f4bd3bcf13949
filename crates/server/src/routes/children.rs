use axum::{
    Json, Router,
    extract::{Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::children::Child;
use serde::Deserialize;
use services::services::children_info::ChildrenInfo;
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError, routes::require_token};

#[derive(Debug, Default, Deserialize)]
pub struct ChildrenQuery {
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateChildren {
    pub children: Vec<Child>,
}

pub async fn get_children(
    State(state): State<AppState>,
    Query(query): Query<ChildrenQuery>,
) -> Result<ResponseJson<ApiResponse<ChildrenInfo>>, ApiError> {
    let token = require_token(&state).await?;
    let info = state.children().get_children(&token, query.refresh).await;
    Ok(ResponseJson(ApiResponse::success(info)))
}

pub async fn update_children(
    State(state): State<AppState>,
    Json(request): Json<UpdateChildren>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let token = require_token(&state).await?;
    state
        .children()
        .update_children(&token, &request.children)
        .await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new().route("/children", get(get_children).post(update_children))
}
