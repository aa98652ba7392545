//! Integration tests for matchmaking, action submission and session reads.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

#[sqlx::test(migrations = "../../migrations")]
async fn test_tick_matches_idle_agents_into_an_active_session(pool: PgPool) {
    // Arrange
    common::register_agent(&pool, "Ash").await;
    common::register_agent(&pool, "Bea").await;

    // Act
    let app = common::build_test_app(pool.clone());
    let (status, report) = common::post_json(app, "/api/v1/engine/tick", &json!({})).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["matchmaking"]["created"], 1);
    assert_eq!(report["matchmaking"]["started"], 1);
    assert_eq!(report["sweep"]["due"], 0);

    let app = common::build_test_app(pool);
    let (status, sessions) = common::get_json(app, "/api/v1/sessions?status=active").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sessions.as_array().unwrap().len(), 1);
    assert_eq!(sessions[0]["scenario_id"], "vault-job");
    assert_eq!(sessions[0]["round"], 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_actions_from_every_participant_advance_the_round(pool: PgPool) {
    // Arrange
    let ash = common::register_agent(&pool, "Ash").await;
    let bea = common::register_agent(&pool, "Bea").await;
    let app = common::build_test_app(pool.clone());
    common::post_json(app, "/api/v1/engine/tick", &json!({})).await;
    let app = common::build_test_app(pool.clone());
    let (_, sessions) = common::get_json(app, "/api/v1/sessions").await;
    let session_id: Uuid = sessions[0]["session_id"].as_str().unwrap().parse().unwrap();
    let actions_uri = format!("/api/v1/sessions/{session_id}/actions");

    // Act
    let app = common::build_test_app(pool.clone());
    let (first_status, first) = common::post_json_as(
        app,
        &actions_uri,
        ash,
        &json!({ "content": "I watch the guard rotation." }),
    )
    .await;
    let app = common::build_test_app(pool.clone());
    let (second_status, second) = common::post_json_as(
        app,
        &actions_uri,
        bea,
        &json!({ "content": "I photograph the alarm panel." }),
    )
    .await;

    // Assert
    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(first["round"], 0);
    assert_eq!(first["round_advanced"], false);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(second["round"], 1);
    assert_eq!(second["round_advanced"], true);

    let app = common::build_test_app(pool);
    let (status, detail) = common::get_json(app, &format!("/api/v1/sessions/{session_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["round"], 1);
    let transcript = detail["transcript"].as_array().unwrap();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0]["resolution"], "narration 1");
    assert_eq!(transcript[0]["entries"].as_array().unwrap().len(), 2);
    assert!(detail["current_round"]["prompt"]
        .as_str()
        .unwrap()
        .starts_with("narration 2"));
    assert!(detail["current_round"]["actions"].as_array().unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_duplicate_and_foreign_submissions_are_rejected(pool: PgPool) {
    // Arrange
    let ash = common::register_agent(&pool, "Ash").await;
    common::register_agent(&pool, "Bea").await;
    let app = common::build_test_app(pool.clone());
    common::post_json(app, "/api/v1/engine/tick", &json!({})).await;
    let app = common::build_test_app(pool.clone());
    let (_, sessions) = common::get_json(app, "/api/v1/sessions").await;
    let session_id = sessions[0]["session_id"].as_str().unwrap().to_owned();
    let actions_uri = format!("/api/v1/sessions/{session_id}/actions");
    let app = common::build_test_app(pool.clone());
    common::post_json_as(app, &actions_uri, ash, &json!({ "content": "First." })).await;

    // Act
    let app = common::build_test_app(pool.clone());
    let (dup_status, dup) =
        common::post_json_as(app, &actions_uri, ash, &json!({ "content": "Second." })).await;
    let app = common::build_test_app(pool);
    let (stranger_status, stranger) = common::post_json_as(
        app,
        &actions_uri,
        Uuid::new_v4(),
        &json!({ "content": "Let me in." }),
    )
    .await;

    // Assert
    assert_eq!(dup_status, StatusCode::CONFLICT);
    assert_eq!(dup["error"], "duplicate_submission");
    assert_eq!(stranger_status, StatusCode::CONFLICT);
    assert_eq!(stranger["error"], "not_participant");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_get_unknown_session_returns_404(pool: PgPool) {
    let app = common::build_test_app(pool);

    let (status, json) =
        common::get_json(app, &format!("/api/v1/sessions/{}", Uuid::new_v4())).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "session_not_found");
}
