use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentTeacher, CurrentUser};
use crate::api::pagination::{PageQuery, PaginatedResponse};
use crate::core::state::AppState;
use crate::db::types::{ExamStatus, UserRole};
use crate::repositories;
use crate::schemas::exam::{ExamListQuery, ExamResponse};
use crate::schemas::result::ResultSummaryResponse;

use super::super::helpers;

pub(in crate::api::exams) async fn list_exams(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(params): Query<ExamListQuery>,
) -> Result<Json<PaginatedResponse<ExamResponse>>, ApiError> {
    let skip = params.skip.max(0);
    let limit = params.limit.clamp(1, 1000);

    let filter = match user.role {
        UserRole::Student => repositories::exams::ExamFilter {
            status: Some(ExamStatus::Published),
            created_by: None,
            search: params.search.as_deref(),
        },
        UserRole::Teacher => repositories::exams::ExamFilter {
            status: params.status,
            created_by: Some(&user.id),
            search: params.search.as_deref(),
        },
        UserRole::Admin => repositories::exams::ExamFilter {
            status: params.status,
            created_by: None,
            search: params.search.as_deref(),
        },
    };

    let exams = repositories::exams::list(state.db(), &filter, skip, limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list exams"))?;
    let total_count = repositories::exams::count(state.db(), &filter)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count exams"))?;

    let include_prompt = user.role.can_author_exams();
    let mut items = Vec::with_capacity(exams.len());
    for exam in exams {
        items.push(helpers::exam_response(&state, exam, include_prompt).await?);
    }

    Ok(Json(PaginatedResponse { items, total_count, skip, limit }))
}

pub(in crate::api::exams) async fn list_exam_results(
    Path(exam_id): Path<String>,
    Query(params): Query<PageQuery>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<PaginatedResponse<ResultSummaryResponse>>, ApiError> {
    let exam = helpers::fetch_owned_exam(&state, &teacher, &exam_id).await?;
    let (skip, limit) = params.bounds();

    let rows = repositories::results::list_by_exam(state.db(), &exam.id, skip, limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list results"))?;
    let total_count = repositories::results::count_by_exam(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count results"))?;

    Ok(Json(PaginatedResponse {
        items: rows.into_iter().map(ResultSummaryResponse::from_row).collect(),
        total_count,
        skip,
        limit,
    }))
}
