use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::api::pagination::{PageQuery, PaginatedResponse};
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::result::ResultSummaryResponse;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/me", get(my_results))
}

async fn my_results(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(params): Query<PageQuery>,
) -> Result<Json<PaginatedResponse<ResultSummaryResponse>>, ApiError> {
    let (skip, limit) = params.bounds();

    let rows = repositories::results::list_by_user(state.db(), &user.id, skip, limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list results"))?;
    let total_count = repositories::results::count_by_user(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count results"))?;

    Ok(Json(PaginatedResponse {
        items: rows.into_iter().map(ResultSummaryResponse::from_row).collect(),
        total_count,
        skip,
        limit,
    }))
}
