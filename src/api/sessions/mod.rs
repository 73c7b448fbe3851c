mod helpers;
mod progress;
mod start;
mod submit;

use axum::{routing::get, routing::post, routing::put, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/exams/:exam_id/start", post(start::start_session))
        .route("/:session_id", get(progress::get_session))
        .route("/:session_id/progress", put(progress::save_progress))
        .route("/:session_id/submit", post(submit::submit_session))
        .route("/:session_id/result", get(submit::get_session_result))
}

#[cfg(test)]
mod tests;
