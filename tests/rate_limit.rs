#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use securelog::auth::{create_jwt, Role};
use securelog::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use securelog::repo::inmem::InMemRepo;
use securelog::routes::{config, AppState};
use securelog::storage::FsAttachmentStore;
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("SECURELOG_DATA_DIR", tmp.path().to_str().unwrap());
}

fn staff_token() -> String { create_jwt(1, "staffer", vec![Role::Staff]).unwrap() }
fn user_token() -> String { create_jwt(2, "reporter", vec![Role::User]).unwrap() }

#[actix_web::test]
#[serial]
async fn rate_limit_report_creation() {
    setup_env();

    // only 1 report per large window so the second attempt is denied
    let cfg = RateLimitConfig {
        report_limit: 1,
        report_window: Duration::from_secs(300),
        comment_limit: 100,
        comment_window: Duration::from_secs(60),
        attachment_limit: 100,
        attachment_window: Duration::from_secs(3600),
    };
    let limiter = RateLimiterFacade::new(InMemoryRateLimiter::new(true), cfg);

    let state = AppState {
        repo: Arc::new(InMemRepo::new()),
        attachment_store: Arc::new(FsAttachmentStore::new()),
        rate_limiter: limiter,
    };
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/incident-types")
        .insert_header(("Authorization", format!("Bearer {}", staff_token())))
        .set_json(&json!({"name": "Other"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let ty: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let ty = ty["id"].as_i64().unwrap();

    let payload = json!({
        "title": "First report",
        "incident_type_id": ty,
        "description": "d",
        "location": "l",
        "date_occurred": "2026-08-01T09:30:00Z"
    });

    let req = test::TestRequest::post()
        .uri("/api/v1/incidents")
        .insert_header(("Authorization", format!("Bearer {}", user_token())))
        .set_json(&payload)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);

    // same subject, same window -> limited
    let req = test::TestRequest::post()
        .uri("/api/v1/incidents")
        .insert_header(("Authorization", format!("Bearer {}", user_token())))
        .set_json(&payload)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 429);

    // a different subject is unaffected
    let other = create_jwt(3, "other", vec![Role::User]).unwrap();
    let req = test::TestRequest::post()
        .uri("/api/v1/incidents")
        .insert_header(("Authorization", format!("Bearer {}", other)))
        .set_json(&payload)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);
}
