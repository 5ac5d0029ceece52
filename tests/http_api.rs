#![cfg(feature = "server")]

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use quizduel::http::{AppState, build_router};
use quizduel::repository::memory::MemoryChallengeRepository;
use quizduel::{BankContentProvider, ChallengeManager, InviteCodeGenerator, StaticDirectory};
use serde_json::{Value, json};

fn server() -> TestServer {
    let mut directory = StaticDirectory::default();
    directory.insert("X", "Ada");
    let manager = ChallengeManager::new(
        Arc::new(MemoryChallengeRepository::new()),
        Arc::new(BankContentProvider::builtin()),
    )
    .with_directory(Arc::new(directory))
    .with_invite_codes(InviteCodeGenerator::with_source(5, || "AB12CD".to_string()));
    TestServer::new(build_router(AppState { manager })).unwrap()
}

async fn create(server: &TestServer, body: Value) -> Value {
    let response = server.post("/play/challenges").json(&body).await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()
}

#[tokio::test]
async fn test_health() {
    let server = server();
    let response = server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "ok");
}

#[tokio::test]
async fn test_full_duel_over_http() {
    let server = server();
    let created = create(
        &server,
        json!({"creator_id": "X", "subject": "Science", "topic": "Physics", "level": "easy"}),
    )
    .await;
    assert_eq!(created["status"], "waiting");
    assert_eq!(created["invite_code"], "AB12CD");
    let short_id = created["short_id"].as_str().unwrap().to_string();

    let joined = server
        .post("/play/challenges/join")
        .json(&json!({"invite_code": "ab12cd", "user_id": "Y"}))
        .await;
    joined.assert_status_ok();
    assert_eq!(joined.json::<Value>()["challenge_id"], created["challenge_id"]);

    let started = server.post(&format!("/play/challenges/{}/start", short_id)).await;
    started.assert_status_ok();
    let questions = started.json::<Value>()["questions"].as_array().unwrap().clone();
    assert_eq!(questions.len(), 2);
    assert!(questions.iter().all(|q| q.get("correct_answer").is_none()));

    let answers = [("X", 0, "Law of Conservation of Energy"), ("X", 1, "Ampere"), ("Y", 0, "Ohm's Law")];
    for (user, index, answer) in answers {
        let response = server
            .post(&format!("/play/challenges/{}/answer", short_id))
            .json(&json!({"user_id": user, "question_index": index, "answer": answer}))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["recorded"], true);
    }

    let result = server.get(&format!("/play/challenges/{}/result", short_id)).await;
    result.assert_status_ok();
    let result = result.json::<Value>();
    assert_eq!(result["status"], "complete");
    assert_eq!(result["winner"], "X");
    assert_eq!(result["scores"]["X"], 2);
    assert_eq!(result["scores"]["Y"], 0);
    assert_eq!(result["display_names"]["X"], "Ada");

    let status = server.get(&format!("/play/challenges/{}/status", short_id)).await;
    status.assert_status_ok();
    assert_eq!(status.json::<Value>()["status"], "started");

    let listed = server.get("/play/challenges/user/Y").await;
    listed.assert_status_ok();
    let listed = listed.json::<Value>();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["role"], "opponent");
}

#[tokio::test]
async fn test_error_statuses() {
    let server = server();

    server
        .post("/play/challenges")
        .json(&json!({"creator_id": "X", "subject": "Science", "topic": "Physics", "mode": "sync"}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let missing = server
        .post("/play/challenges/join")
        .json(&json!({"invite_code": "ZZZZZZ", "user_id": "Y"}))
        .await;
    missing.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(missing.json::<Value>()["kind"], "not_found");

    server
        .get("/play/challenges/not-a-real-id/result")
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let created = create(
        &server,
        json!({"creator_id": "X", "opponent_id": "Y", "subject": "Science", "topic": "Physics", "mode": "sync"}),
    )
    .await;
    let id = created["challenge_id"].as_str().unwrap().to_string();
    assert_eq!(created["status"], "ready");
    assert!(created.get("invite_code").is_none());

    server
        .post(&format!("/play/challenges/{}/start", id))
        .await
        .assert_status_ok();
    let forbidden = server
        .post(&format!("/play/challenges/{}/answer", id))
        .json(&json!({"user_id": "W", "question_index": 0, "answer": "Volt"}))
        .await;
    forbidden.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(forbidden.json::<Value>()["kind"], "forbidden");

    server
        .post(&format!("/play/challenges/{}/answer", id))
        .json(&json!({"user_id": "X", "question_index": 9, "answer": "Volt"}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_join_conflict_and_exhausted_codes() {
    let server = server();
    create(&server, json!({"creator_id": "X", "subject": "Science", "topic": "Physics"})).await;

    // Every draw returns the same active code.
    server
        .post("/play/challenges")
        .json(&json!({"creator_id": "W", "subject": "Science", "topic": "Physics"}))
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    server
        .post("/play/challenges/join")
        .json(&json!({"invite_code": "AB12CD", "user_id": "Y"}))
        .await
        .assert_status_ok();
    let conflict = server
        .post("/play/challenges/join")
        .json(&json!({"invite_code": "AB12CD", "user_id": "Z"}))
        .await;
    conflict.assert_status(StatusCode::CONFLICT);
    assert_eq!(conflict.json::<Value>()["kind"], "conflict");
}

#[tokio::test]
async fn test_start_degraded_over_http() {
    let server = server();
    let created = create(
        &server,
        json!({"creator_id": "X", "opponent_id": "Y", "subject": "Art", "topic": "Baroque"}),
    )
    .await;
    let id = created["challenge_id"].as_str().unwrap().to_string();

    server
        .post(&format!("/play/challenges/{}/start", id))
        .await
        .assert_status(StatusCode::BAD_GATEWAY);

    let degraded = server
        .post(&format!("/play/challenges/{}/start", id))
        .add_query_param("allow_degraded", true)
        .await;
    degraded.assert_status_ok();
    assert_eq!(degraded.json::<Value>()["questions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_status_override_and_weekly_count() {
    let server = server();
    let created = create(
        &server,
        json!({"creator_id": "X", "opponent_id": "Y", "subject": "Science", "topic": "Physics", "mode": "sync"}),
    )
    .await;
    let id = created["challenge_id"].as_str().unwrap().to_string();

    let bad = server
        .put(&format!("/play/challenges/{}/status", id))
        .json(&json!({"status": "archived"}))
        .await;
    bad.assert_status(StatusCode::BAD_REQUEST);

    let updated = server
        .put(&format!("/play/challenges/{}/status", id))
        .json(&json!({"status": "completed"}))
        .await;
    updated.assert_status_ok();
    assert_eq!(updated.json::<Value>()["status"], "completed");

    let count = server
        .get("/play/challenges/completed-last-week")
        .add_query_param("user_id", "Y")
        .await;
    count.assert_status_ok();
    let count = count.json::<Value>();
    assert_eq!(count["user_id"], "Y");
    assert_eq!(count["completed"], 1);
}

#[tokio::test]
async fn test_malformed_requests_get_json_errors() {
    let server = server();
    let created = create(
        &server,
        json!({"creator_id": "X", "opponent_id": "Y", "subject": "Science", "topic": "Physics", "mode": "sync"}),
    )
    .await;
    let id = created["challenge_id"].as_str().unwrap().to_string();

    let negative = server
        .post(&format!("/play/challenges/{}/answer", id))
        .json(&json!({"user_id": "X", "question_index": -1, "answer": "Volt"}))
        .await;
    negative.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(negative.json::<Value>()["kind"], "validation");

    let missing_user = server
        .post("/play/challenges/join")
        .json(&json!({"invite_code": "AB12CD"}))
        .await;
    missing_user.assert_status(StatusCode::BAD_REQUEST);
    let body = missing_user.json::<Value>();
    assert_eq!(body["kind"], "validation");
    assert!(body["error"].as_str().unwrap().contains("user_id"));

    let missing_query = server.get("/play/challenges/completed-last-week").await;
    missing_query.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(missing_query.json::<Value>()["kind"], "validation");

    let bad_flag = server
        .post(&format!("/play/challenges/{}/start", id))
        .add_query_param("allow_degraded", "maybe")
        .await;
    bad_flag.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(bad_flag.json::<Value>()["kind"], "validation");
}
