use std::time::Instant;

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc as now_primitive;
use crate::db::models::ExamResult;
use crate::db::types::SessionStatus;
use crate::repositories;
use crate::repositories::sessions::GradingClaim;
use crate::services::documents;
use crate::services::grading::{self, GradeOutcome, GradingReport};

const NO_QUESTIONS_FEEDBACK: &str = "Bài thi không có câu hỏi nào để chấm.";

pub(crate) async fn claim_next_session(pool: &PgPool) -> Result<Option<GradingClaim>> {
    repositories::sessions::claim_next_for_grading(pool, now_primitive())
        .await
        .context("Failed to claim session for grading")
}

/// Grades one claimed session and records either the result or the failure.
pub(crate) async fn process_session(state: &AppState, claim: &GradingClaim) {
    let started = Instant::now();
    let session_id = claim.session_id.as_str();

    match grade_session(state, claim).await {
        Ok(Some(result)) => {
            let elapsed = started.elapsed().as_secs_f64();
            metrics::counter!("grading_jobs_total", "status" => "success").increment(1);
            metrics::histogram!("grading_duration_seconds").record(elapsed);
            tracing::info!(
                session_id,
                score = result.score,
                model = %result.model,
                duration_seconds = elapsed,
                "Session graded"
            );
        }
        Ok(None) => {}
        Err(err) => {
            metrics::counter!("grading_jobs_total", "status" => "failed").increment(1);
            tracing::error!(session_id, error = %format!("{err:#}"), "Grading failed");

            let max_attempts = state.settings().exam().grading_max_attempts as i32;
            match repositories::sessions::record_grading_failure(
                state.db(),
                claim,
                &format!("{err:#}"),
                max_attempts,
                now_primitive(),
            )
            .await
            {
                Ok(Some(SessionStatus::Failed)) => {
                    tracing::warn!(session_id, max_attempts, "Grading gave up after retries");
                }
                Ok(_) => {}
                Err(record_err) => tracing::error!(
                    session_id,
                    error = %record_err,
                    "Failed to record grading failure"
                ),
            }
        }
    }
}

async fn grade_session(state: &AppState, claim: &GradingClaim) -> Result<Option<ExamResult>> {
    let session_id = claim.session_id.as_str();
    let session = repositories::sessions::find_by_id(state.db(), session_id)
        .await
        .context("Failed to fetch session")?
        .context("Session not found")?;

    if session.status != SessionStatus::Grading {
        tracing::info!(session_id, status = ?session.status, "Skipping grading");
        return Ok(None);
    }

    let exam = repositories::exams::find_by_id(state.db(), &session.exam_id)
        .await
        .context("Failed to fetch exam")?
        .context("Exam not found")?;

    let questions = session.question_list();
    let outcome = if questions.is_empty() {
        GradeOutcome {
            reconciled: grading::reconcile(questions, &session.answers, &GradingReport::default()),
            feedback: NO_QUESTIONS_FEEDBACK.to_string(),
            model: state.ai().default_model().to_string(),
        }
    } else {
        let files = repositories::exam_files::list_by_exam(state.db(), &exam.id)
            .await
            .context("Failed to fetch exam files")?;
        let documents = documents::load_exam_documents(
            state.storage(),
            &files,
            state.settings().max_document_bytes(),
        )
        .await
        .context("Failed to load exam documents")?;

        grading::grade_answers(
            state.ai(),
            &exam,
            questions,
            &session.answers,
            &documents,
            session_id,
        )
        .await?
    };

    let now = now_primitive();
    let mut tx = state.db().begin().await.context("Failed to start transaction")?;
    let still_claimed = repositories::sessions::mark_graded(&mut *tx, claim, now)
        .await
        .context("Failed to mark session graded")?;
    if !still_claimed {
        tracing::warn!(session_id, "Grading claim lost, discarding result");
        return Ok(None);
    }

    let result = repositories::results::save(
        &mut *tx,
        repositories::results::SaveResult {
            id: &Uuid::new_v4().to_string(),
            session_id: &session.id,
            exam_id: &exam.id,
            user_id: &session.user_id,
            score: outcome.reconciled.score,
            stated_total: outcome.reconciled.stated_total,
            computed_total: outcome.reconciled.computed_total,
            items: &outcome.reconciled.items,
            feedback: &outcome.feedback,
            model: &outcome.model,
            now,
        },
    )
    .await
    .context("Failed to save result")?;
    tx.commit().await.context("Failed to commit grading result")?;

    Ok(Some(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::{ExamStatus, UserRole};
    use crate::test_support;

    #[tokio::test]
    #[ignore = "requires postgres and redis"]
    async fn failed_grading_returns_session_to_queue_then_fails() {
        let ctx = test_support::setup_test_context().await;
        let db = ctx.state.db();

        let teacher =
            test_support::insert_user(db, "teacher21", "Giáo Viên", "pass-1234", UserRole::Teacher)
                .await;
        let student =
            test_support::insert_user(db, "student21", "Học Sinh", "pass-1234", UserRole::Student)
                .await;
        let exam = test_support::insert_exam(db, &teacher.id, ExamStatus::Published).await;
        let session =
            test_support::insert_session_with_questions(db, &exam, &student.id, None).await;
        repositories::sessions::submit(db, &session.id, now_primitive(), false, now_primitive())
            .await
            .expect("submit")
            .expect("submitted");

        let max_attempts = ctx.state.settings().exam().grading_max_attempts;
        for attempt in 1..=max_attempts {
            let claimed = claim_next_session(db).await.expect("claim").expect("claimed session");
            assert_eq!(claimed.session_id, session.id);

            // No AI key is configured, so every attempt fails.
            process_session(&ctx.state, &claimed).await;

            let stored = repositories::sessions::fetch_one_by_id(db, &session.id)
                .await
                .expect("session");
            assert_eq!(stored.grading_attempts, attempt as i32);
            assert!(stored.grading_error.is_some());
            let expected = if attempt == max_attempts {
                SessionStatus::Failed
            } else {
                SessionStatus::Submitted
            };
            assert_eq!(stored.status, expected);
        }

        assert!(claim_next_session(db).await.expect("claim").is_none());
    }

    #[tokio::test]
    #[ignore = "requires postgres and redis"]
    async fn session_without_questions_gets_zero_result() {
        let ctx = test_support::setup_test_context().await;
        let db = ctx.state.db();

        let teacher =
            test_support::insert_user(db, "teacher22", "Giáo Viên", "pass-1234", UserRole::Teacher)
                .await;
        let student =
            test_support::insert_user(db, "student22", "Học Sinh", "pass-1234", UserRole::Student)
                .await;
        let exam = test_support::insert_exam(db, &teacher.id, ExamStatus::Published).await;

        let session_id = Uuid::new_v4().to_string();
        let now = now_primitive();
        repositories::sessions::create(
            db,
            repositories::sessions::CreateSession {
                id: &session_id,
                exam_id: &exam.id,
                user_id: &student.id,
                attempt_number: 1,
                shuffle_seed: None,
                started_at: now,
                expires_at: None,
            },
        )
        .await
        .expect("create session");
        repositories::sessions::submit(db, &session_id, now, false, now)
            .await
            .expect("submit")
            .expect("submitted");

        let claimed = claim_next_session(db).await.expect("claim").expect("claimed");
        process_session(&ctx.state, &claimed).await;

        let stored = repositories::sessions::fetch_one_by_id(db, &session_id).await.expect("session");
        assert_eq!(stored.status, SessionStatus::Graded);
        assert_eq!(stored.grading_started_at, Some(claimed.claimed_at));

        let result = repositories::results::find_by_session(db, &session_id)
            .await
            .expect("query")
            .expect("result");
        assert_eq!(result.score, 0.0);
        assert!(result.items.0.is_empty());
        assert_eq!(result.feedback, NO_QUESTIONS_FEEDBACK);
    }

    #[tokio::test]
    #[ignore = "requires postgres and redis"]
    async fn superseded_claim_cannot_finish_grading() {
        let ctx = test_support::setup_test_context().await;
        let db = ctx.state.db();

        let teacher =
            test_support::insert_user(db, "teacher27", "Giáo Viên", "pass-1234", UserRole::Teacher)
                .await;
        let student =
            test_support::insert_user(db, "student27", "Học Sinh", "pass-1234", UserRole::Student)
                .await;
        let exam = test_support::insert_exam(db, &teacher.id, ExamStatus::Published).await;
        let session =
            test_support::insert_session_with_questions(db, &exam, &student.id, None).await;

        let long_ago = now_primitive() - time::Duration::hours(6);
        repositories::sessions::submit(db, &session.id, long_ago, false, long_ago)
            .await
            .expect("submit")
            .expect("submitted");
        let stale = repositories::sessions::claim_next_for_grading(db, long_ago)
            .await
            .expect("claim")
            .expect("claimed");

        let cutoff = now_primitive() - time::Duration::minutes(1);
        let requeued = repositories::sessions::requeue_stale_grading(db, cutoff, now_primitive())
            .await
            .expect("requeue");
        assert_eq!(requeued, 1);
        let fresh = claim_next_session(db).await.expect("claim").expect("reclaimed");
        assert_ne!(fresh.claimed_at, stale.claimed_at);

        assert!(!repositories::sessions::mark_graded(db, &stale, now_primitive())
            .await
            .expect("stale mark"));
        let status = repositories::sessions::record_grading_failure(
            db,
            &stale,
            "timed out",
            3,
            now_primitive(),
        )
        .await
        .expect("stale failure");
        assert!(status.is_none());

        let stored = repositories::sessions::fetch_one_by_id(db, &session.id).await.expect("fetch");
        assert_eq!(stored.status, SessionStatus::Grading);
        assert_eq!(stored.grading_attempts, 0);

        assert!(repositories::sessions::mark_graded(db, &fresh, now_primitive())
            .await
            .expect("fresh mark"));
    }
}
