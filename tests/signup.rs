mod common;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use waitlist_gateway::{
    models::SignupRecord,
    store::{InsertOutcome, ListFilter, NewSignup, SignupStore, StoreError},
};

use common::{CLIENT_IP, RecordingMailer, StubVerifier, spawn_app, spawn_app_with};

#[tokio::test]
async fn signup_then_duplicate() {
    let app = spawn_app(StubVerifier::Score(0.9), RecordingMailer::default());

    let first = app
        .post(
            "/signup",
            Some(CLIENT_IP),
            json!({ "email": "a@b.com", "source": "hero", "recaptchaToken": "valid" }),
        )
        .await;
    assert_eq!(first.status, StatusCode::OK);
    let body = first.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Email successfully added to waitlist");
    assert!(!body["id"].as_str().unwrap().is_empty());
    assert_eq!(first.headers["x-ratelimit-limit"], "3");
    assert_eq!(first.headers["x-ratelimit-remaining"], "2");
    assert!(first.headers.contains_key("x-ratelimit-reset"));

    let second = app
        .post(
            "/signup",
            Some(CLIENT_IP),
            json!({ "email": "a@b.com", "source": "hero", "recaptchaToken": "valid" }),
        )
        .await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert_eq!(second.json(), json!({ "error": "Email already registered" }));
}

#[tokio::test]
async fn stored_record_is_normalized() {
    let app = spawn_app(StubVerifier::Score(0.9), RecordingMailer::default());

    let response = app.signup("  Foo@Example.com ", Some(CLIENT_IP)).await;
    assert_eq!(response.status, StatusCode::OK);

    let record = app.store.find_by_email("foo@example.com").await.unwrap().unwrap();
    assert_eq!(record.id, response.json()["id"]);
    assert_eq!(record.source, "hero");
    assert_eq!(record.ip_address, CLIENT_IP);
    assert_eq!(record.recaptcha_score, 0.9);

    let again = app.signup("foo@example.com", Some(CLIENT_IP)).await;
    assert_eq!(again.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn missing_source_defaults_to_unknown() {
    let app = spawn_app(StubVerifier::Score(0.9), RecordingMailer::default());

    let response = app.post("/signup", None, json!({ "email": "a@b.com" })).await;
    assert_eq!(response.status, StatusCode::OK);

    let record = app.store.find_by_email("a@b.com").await.unwrap().unwrap();
    assert_eq!(record.source, "unknown");
    assert_eq!(record.ip_address, "unknown");
    // no token, no verification
    assert_eq!(record.recaptcha_score, 0.0);
}

#[tokio::test]
async fn score_threshold_is_inclusive() {
    let low = spawn_app(StubVerifier::Score(0.29), RecordingMailer::default());
    let response = low.signup("a@b.com", Some(CLIENT_IP)).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json(), json!({ "error": "Security verification failed" }));
    assert!(low.store.find_by_email("a@b.com").await.unwrap().is_none());

    let edge = spawn_app(StubVerifier::Score(0.30), RecordingMailer::default());
    let response = edge.signup("a@b.com", Some(CLIENT_IP)).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn failed_or_slow_verification_rejects() {
    for verifier in [StubVerifier::Fail, StubVerifier::Hang] {
        let app = spawn_app(verifier, RecordingMailer::default());
        let response = app.signup("a@b.com", Some(CLIENT_IP)).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json()["error"], "Security verification failed");
    }
}

#[tokio::test]
async fn invalid_email_is_rejected() {
    let app = spawn_app(StubVerifier::Score(0.9), RecordingMailer::default());

    for body in [json!({ "email": "not-an-email" }), json!({ "email": "" }), json!({})] {
        let response = app.post("/signup", Some(CLIENT_IP), body).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json(), json!({ "error": "Invalid email address" }));
    }
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let app = spawn_app(StubVerifier::Score(0.9), RecordingMailer::default());

    let response = app.post("/signup", None, json!(["not", "an", "object"])).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.json()["error"].is_string());
}

#[tokio::test]
async fn fourth_signup_from_one_ip_is_throttled() {
    let app = spawn_app(StubVerifier::Score(0.9), RecordingMailer::default());

    for n in 0..3 {
        let response = app.signup(&format!("user{n}@b.com"), Some(CLIENT_IP)).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers["x-ratelimit-remaining"], (2 - n).to_string().as_str());
    }

    let throttled = app.signup("user3@b.com", Some(CLIENT_IP)).await;
    assert_eq!(throttled.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(throttled.headers["retry-after"], "3600");
    assert_eq!(throttled.headers["x-ratelimit-remaining"], "0");
    assert_eq!(
        throttled.json(),
        json!({
            "error": "Too many email submissions. Please try again in 60 minutes.",
            "retryAfter": 3600
        })
    );
    assert!(app.store.find_by_email("user3@b.com").await.unwrap().is_none());

    // another client is unaffected
    let other = app.signup("other@b.com", Some("198.51.100.1")).await;
    assert_eq!(other.status, StatusCode::OK);

    // a fresh window starts once the hour is up
    app.clock.advance(Duration::from_secs(3600) + Duration::from_millis(1));
    let response = app.signup("user3@b.com", Some(CLIENT_IP)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers["x-ratelimit-remaining"], "2");
}

#[tokio::test]
async fn loopback_clients_bypass_the_limit() {
    let app = spawn_app(StubVerifier::Score(0.9), RecordingMailer::default());

    for n in 0..10 {
        let response = app.signup(&format!("dev{n}@b.com"), Some("127.0.0.1")).await;
        assert_eq!(response.status, StatusCode::OK);
        assert!(!response.headers.contains_key("x-ratelimit-limit"));
    }
}

#[tokio::test]
async fn welcome_email_marks_record() {
    let app = spawn_app(StubVerifier::Score(0.9), RecordingMailer::default());

    let response = app.signup("a@b.com", Some(CLIENT_IP)).await;
    assert_eq!(response.status, StatusCode::OK);
    app.mailer.wait_for_notification().await;

    let record = app.store.find_by_email("a@b.com").await.unwrap().unwrap();
    assert!(record.welcome_email_sent);
    assert_eq!(record.welcome_email_id.as_deref(), Some("re_1"));
}

#[tokio::test]
async fn failed_welcome_email_does_not_fail_signup() {
    let app = spawn_app(StubVerifier::Score(0.9), RecordingMailer::failing());

    let response = app.signup("a@b.com", Some(CLIENT_IP)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["success"], true);

    app.mailer.wait_for_notification().await;
    assert_eq!(app.mailer.welcomes.load(Ordering::SeqCst), 1);

    let record = app.store.find_by_email("a@b.com").await.unwrap().unwrap();
    assert!(!record.welcome_email_sent);
    assert_eq!(record.welcome_email_id, None);
}

#[tokio::test]
async fn hanging_welcome_email_times_out_quietly() {
    let app = spawn_app(StubVerifier::Score(0.9), RecordingMailer::hanging());

    let response = app.signup("a@b.com", Some(CLIENT_IP)).await;
    assert_eq!(response.status, StatusCode::OK);

    app.mailer.wait_for_notification().await;
    let record = app.store.find_by_email("a@b.com").await.unwrap().unwrap();
    assert!(!record.welcome_email_sent);
}

// Store whose pre-check never sees the other writer, like two racing requests.
struct RacingStore;

#[async_trait]
impl SignupStore for RacingStore {
    async fn find_by_email(&self, _email: &str) -> Result<Option<SignupRecord>, StoreError> {
        Ok(None)
    }

    async fn insert(&self, signup: NewSignup) -> Result<InsertOutcome, StoreError> {
        Err(StoreError::Duplicate(signup.email))
    }

    async fn mark_welcome_sent(&self, id: &str, _provider_id: Option<String>) -> Result<(), StoreError> {
        Err(StoreError::NotFound(id.to_string()))
    }

    async fn delete_by_email(&self, _email: &str) -> Result<bool, StoreError> {
        Ok(false)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(0)
    }

    async fn list(&self, _filter: &ListFilter) -> Result<Vec<SignupRecord>, StoreError> {
        Ok(Vec::new())
    }
}

// Store that never acknowledges writes.
struct UnacknowledgedStore;

#[async_trait]
impl SignupStore for UnacknowledgedStore {
    async fn find_by_email(&self, _email: &str) -> Result<Option<SignupRecord>, StoreError> {
        Ok(None)
    }

    async fn insert(&self, _signup: NewSignup) -> Result<InsertOutcome, StoreError> {
        Ok(InsertOutcome {
            acknowledged: false,
            inserted_id: String::new(),
        })
    }

    async fn mark_welcome_sent(&self, id: &str, _provider_id: Option<String>) -> Result<(), StoreError> {
        Err(StoreError::NotFound(id.to_string()))
    }

    async fn delete_by_email(&self, _email: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("offline".to_string()))
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Err(StoreError::Unavailable("offline".to_string()))
    }

    async fn list(&self, _filter: &ListFilter) -> Result<Vec<SignupRecord>, StoreError> {
        Err(StoreError::Unavailable("offline".to_string()))
    }
}

#[tokio::test]
async fn insert_conflict_maps_to_409() {
    let app = spawn_app_with(
        StubVerifier::Score(0.9),
        RecordingMailer::default(),
        Arc::new(RacingStore),
        None,
    );

    let response = app.signup("a@b.com", Some(CLIENT_IP)).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.json()["error"], "Email already registered");
}

#[tokio::test]
async fn unacknowledged_write_is_generic_500() {
    let app = spawn_app_with(
        StubVerifier::Score(0.9),
        RecordingMailer::default(),
        Arc::new(UnacknowledgedStore),
        None,
    );

    let response = app.signup("a@b.com", Some(CLIENT_IP)).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json(), json!({ "error": "Internal server error" }));
    assert_eq!(app.mailer.welcomes.load(Ordering::SeqCst), 0);

    let count = app.get("/signup-count", None).await;
    assert_eq!(count.status, StatusCode::INTERNAL_SERVER_ERROR);
}
