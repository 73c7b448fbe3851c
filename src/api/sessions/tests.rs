use axum::http::{Method, StatusCode};
use serde_json::json;
use time::Duration;
use tower::ServiceExt;

use crate::core::time::primitive_now_utc;
use crate::db::models::ResultItem;
use crate::db::types::{AnswerStatus, ExamStatus, UserRole};
use crate::repositories;
use crate::test_support;

#[tokio::test]
#[ignore = "requires postgres and redis"]
async fn start_without_ai_reports_bad_gateway_and_resume_reuses_session() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();

    let teacher =
        test_support::insert_user(db, "teacher11", "Giáo Viên", "teacher-pass", UserRole::Teacher)
            .await;
    let student =
        test_support::insert_user(db, "student11", "Học Sinh", "student-pass", UserRole::Student)
            .await;
    let exam = test_support::insert_exam(db, &teacher.id, ExamStatus::Published).await;
    let token = test_support::bearer_token(&student.id, ctx.state.settings());
    let uri = format!("/api/v1/sessions/exams/{}/start", exam.id);

    for _ in 0..2 {
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(Method::POST, &uri, Some(&token), None))
            .await
            .expect("start session");
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    let attempts = repositories::sessions::count_attempts(db, &exam.id, &student.id)
        .await
        .expect("count attempts");
    assert_eq!(attempts, 1);
}

#[tokio::test]
#[ignore = "requires postgres and redis"]
async fn start_rejects_drafts_and_teachers() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();

    let teacher =
        test_support::insert_user(db, "teacher12", "Giáo Viên", "teacher-pass", UserRole::Teacher)
            .await;
    let student =
        test_support::insert_user(db, "student12", "Học Sinh", "student-pass", UserRole::Student)
            .await;
    let draft = test_support::insert_exam(db, &teacher.id, ExamStatus::Draft).await;

    let student_token = test_support::bearer_token(&student.id, ctx.state.settings());
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/sessions/exams/{}/start", draft.id),
            Some(&student_token),
            None,
        ))
        .await
        .expect("start draft");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let teacher_token = test_support::bearer_token(&teacher.id, ctx.state.settings());
    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/sessions/exams/{}/start", draft.id),
            Some(&teacher_token),
            None,
        ))
        .await
        .expect("teacher start");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore = "requires postgres and redis"]
async fn progress_merges_answers_and_submit_moves_to_submitted() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();

    let teacher =
        test_support::insert_user(db, "teacher13", "Giáo Viên", "teacher-pass", UserRole::Teacher)
            .await;
    let student =
        test_support::insert_user(db, "student13", "Học Sinh", "student-pass", UserRole::Student)
            .await;
    let other =
        test_support::insert_user(db, "student14", "Bạn Khác", "student-pass", UserRole::Student)
            .await;
    let exam = test_support::insert_exam(db, &teacher.id, ExamStatus::Published).await;
    let session = test_support::insert_session_with_questions(
        db,
        &exam,
        &student.id,
        Some(Duration::minutes(45)),
    )
    .await;
    let token = test_support::bearer_token(&student.id, ctx.state.settings());
    let other_token = test_support::bearer_token(&other.id, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/sessions/{}", session.id),
            Some(&other_token),
            None,
        ))
        .await
        .expect("foreign session");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PUT,
            &format!("/api/v1/sessions/{}/progress", session.id),
            Some(&token),
            Some(json!({"answers": {"q1": "A", "q2": "So sánh"}, "current_index": 1})),
        ))
        .await
        .expect("save progress");
    let status = response.status();
    let saved = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {saved}");
    assert_eq!(saved["answered"], 2);
    assert_eq!(saved["current_index"], 1);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PUT,
            &format!("/api/v1/sessions/{}/progress", session.id),
            Some(&token),
            Some(json!({"answers": {"q9": "B"}})),
        ))
        .await
        .expect("rate limited save");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PUT,
            &format!("/api/v1/sessions/{}/progress", session.id),
            Some(&token),
            Some(json!({"answers": {"q9": "B"}})),
        ))
        .await
        .expect("unknown question");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/sessions/{}", session.id),
            Some(&token),
            None,
        ))
        .await
        .expect("restore session");
    let restored = test_support::read_json(response).await;
    assert_eq!(restored["answers"]["q1"], "A");
    assert_eq!(restored["current_index"], 1);
    assert!(restored["questions"][0].get("correct_answer").is_none());
    assert!(restored["time_remaining_seconds"].as_i64().expect("remaining") > 0);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/sessions/{}/submit", session.id),
            Some(&token),
            Some(json!({"answers": {"q2": ""}})),
        ))
        .await
        .expect("submit");
    let status = response.status();
    let submitted = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {submitted}");
    assert_eq!(submitted["status"], "submitted");
    assert_eq!(submitted["auto_submitted"], false);

    let stored = repositories::sessions::fetch_one_by_id(db, &session.id).await.expect("session");
    assert!(!stored.answers.0.contains_key("q2"));

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/sessions/{}/result", session.id),
            Some(&token),
            None,
        ))
        .await
        .expect("pending result");
    let pending = test_support::read_json(response).await;
    assert_eq!(pending["status"], "submitted");
}

#[tokio::test]
#[ignore = "requires postgres and redis"]
async fn expired_session_is_auto_submitted_on_access() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();

    let teacher =
        test_support::insert_user(db, "teacher15", "Giáo Viên", "teacher-pass", UserRole::Teacher)
            .await;
    let student =
        test_support::insert_user(db, "student15", "Học Sinh", "student-pass", UserRole::Student)
            .await;
    let exam = test_support::insert_exam(db, &teacher.id, ExamStatus::Published).await;
    let session = test_support::insert_session_with_questions(
        db,
        &exam,
        &student.id,
        Some(Duration::minutes(-5)),
    )
    .await;
    let token = test_support::bearer_token(&student.id, ctx.state.settings());

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/sessions/{}", session.id),
            Some(&token),
            None,
        ))
        .await
        .expect("get session");
    let body = test_support::read_json(response).await;
    assert_eq!(body["status"], "submitted");
    assert_eq!(body["auto_submitted"], true);
    assert!(body["time_remaining_seconds"].is_null());

    let stored = repositories::sessions::fetch_one_by_id(db, &session.id).await.expect("session");
    assert_eq!(stored.submitted_at, stored.expires_at);
}

#[tokio::test]
#[ignore = "requires postgres and redis"]
async fn submit_within_grace_keeps_final_answers_after_sweep() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();

    let teacher =
        test_support::insert_user(db, "teacher16", "Giáo Viên", "teacher-pass", UserRole::Teacher)
            .await;
    let student =
        test_support::insert_user(db, "student16", "Học Sinh", "student-pass", UserRole::Student)
            .await;
    let exam = test_support::insert_exam(db, &teacher.id, ExamStatus::Published).await;
    let session = test_support::insert_session_with_questions(
        db,
        &exam,
        &student.id,
        Some(Duration::seconds(-20)),
    )
    .await;
    let token = test_support::bearer_token(&student.id, ctx.state.settings());

    let swept = crate::tasks::grading::auto_submit_expired_sessions(&ctx.state)
        .await
        .expect("sweep");
    assert_eq!(swept, 0);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/sessions/{}", session.id),
            Some(&token),
            None,
        ))
        .await
        .expect("get session");
    let body = test_support::read_json(response).await;
    assert_eq!(body["status"], "active");
    assert_eq!(body["time_remaining_seconds"], 0);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PUT,
            &format!("/api/v1/sessions/{}/progress", session.id),
            Some(&token),
            Some(json!({"answers": {"q1": "B"}})),
        ))
        .await
        .expect("late autosave");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/sessions/{}/submit", session.id),
            Some(&token),
            Some(json!({"answers": {"q1": "A", "q2": "Ẩn dụ"}})),
        ))
        .await
        .expect("submit");
    let status = response.status();
    let submitted = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {submitted}");
    assert_eq!(submitted["status"], "submitted");
    assert_eq!(submitted["auto_submitted"], false);

    let stored = repositories::sessions::fetch_one_by_id(db, &session.id).await.expect("session");
    assert!(!stored.auto_submitted);
    assert_eq!(stored.answers.0.get("q1").map(String::as_str), Some("A"));
    assert_eq!(stored.answers.0.get("q2").map(String::as_str), Some("Ẩn dụ"));
}

#[tokio::test]
#[ignore = "requires postgres and redis"]
async fn graded_result_is_visible_to_student_and_teacher() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();

    let teacher =
        test_support::insert_user(db, "teacher16", "Giáo Viên", "teacher-pass", UserRole::Teacher)
            .await;
    let student =
        test_support::insert_user(db, "student16", "Học Sinh", "student-pass", UserRole::Student)
            .await;
    let exam = test_support::insert_exam(db, &teacher.id, ExamStatus::Published).await;
    let session = test_support::insert_session_with_questions(db, &exam, &student.id, None).await;

    let items = vec![ResultItem {
        question_id: "q1".to_string(),
        question: "Tác giả của \"Truyện Kiều\" là ai?".to_string(),
        user_answer: Some("A".to_string()),
        correct_answer: Some("A".to_string()),
        status: AnswerStatus::Correct,
        score: 5.0,
        max_score: 5.0,
        explanation: None,
    }];
    repositories::results::save(
        db,
        repositories::results::SaveResult {
            id: "result-1",
            session_id: &session.id,
            exam_id: &exam.id,
            user_id: &student.id,
            score: 5.0,
            stated_total: None,
            computed_total: 5.0,
            items: &items,
            feedback: "Câu 1: Đúng",
            model: "gpt-4o",
            now: primitive_now_utc(),
        },
    )
    .await
    .expect("save result");

    let student_token = test_support::bearer_token(&student.id, ctx.state.settings());
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/sessions/{}/result", session.id),
            Some(&student_token),
            None,
        ))
        .await
        .expect("session result");
    let result = test_support::read_json(response).await;
    assert_eq!(result["score"], 5.0);
    assert_eq!(result["max_score"], 10.0);
    assert_eq!(result["items"][0]["status"], "correct");

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            "/api/v1/results/me",
            Some(&student_token),
            None,
        ))
        .await
        .expect("my results");
    let mine = test_support::read_json(response).await;
    assert_eq!(mine["total_count"], 1);
    assert_eq!(mine["items"][0]["exam_name"], exam.name);

    let teacher_token = test_support::bearer_token(&teacher.id, ctx.state.settings());
    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/exams/{}/results", exam.id),
            Some(&teacher_token),
            None,
        ))
        .await
        .expect("exam results");
    let listed = test_support::read_json(response).await;
    assert_eq!(listed["items"][0]["username"], "student16");
}
