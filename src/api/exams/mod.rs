mod handlers;
mod helpers;

use axum::{routing::delete, routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_exam).get(handlers::list_exams))
        .route(
            "/:exam_id",
            get(handlers::get_exam).patch(handlers::update_exam).delete(handlers::delete_exam),
        )
        .route("/:exam_id/publish", post(handlers::publish_exam))
        .route("/:exam_id/archive", post(handlers::archive_exam))
        .route("/:exam_id/files", post(handlers::upload_file))
        .route("/:exam_id/files/:file_id", delete(handlers::delete_file))
        .route("/:exam_id/results", get(handlers::list_exam_results))
}
