//! Integration tests for the health and catalog endpoints.

mod common;

use axum::http::StatusCode;
use sqlx::PgPool;

#[sqlx::test(migrations = "../../migrations")]
async fn test_health_reports_ok_and_catalog_version(pool: PgPool) {
    let app = common::build_test_app(pool);

    let (status, json) = common::get_json(app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["catalog_version"].as_str().unwrap().len(), 64);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_scenarios_lists_builtin_catalog(pool: PgPool) {
    let app = common::build_test_app(pool);

    let (status, json) = common::get_json(app, "/api/v1/scenarios").await;

    assert_eq!(status, StatusCode::OK);
    let scenarios = json["scenarios"].as_array().unwrap();
    assert_eq!(scenarios.len(), 3);
    let vault = scenarios
        .iter()
        .find(|s| s["id"] == "vault-job")
        .unwrap();
    assert_eq!(vault["min_players"], 2);
    assert_eq!(vault["round_budget"], 4);
    assert_eq!(vault["scenes"][2]["action"]["kind"], "choice");
}
