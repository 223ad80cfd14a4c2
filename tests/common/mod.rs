#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode},
};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tower::util::ServiceExt;
use waitlist_gateway::{
    email::{EmailError, Mailer, SentEmail},
    rate_limit::{ManualClock, RateLimiter},
    recaptcha::{BotVerifier, Verification, VerifyError},
    router,
    session::AdminSessions,
    state::AppState,
    store::{MemoryStore, SignupStore},
    worker::email_worker,
};

pub const ADMIN_PASSWORD: &str = "letmein";
pub const CLIENT_IP: &str = "203.0.113.7";

// Verifier answering every token the same way.
pub enum StubVerifier {
    Score(f64),
    Fail,
    Hang,
}

#[async_trait]
impl BotVerifier for StubVerifier {
    async fn verify(&self, _token: &str) -> Result<Verification, VerifyError> {
        match self {
            StubVerifier::Score(score) => Ok(Verification { score: *score }),
            StubVerifier::Fail => Err(VerifyError::Rejected("invalid-input-response".to_string())),
            StubVerifier::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Verification { score: 1.0 })
            }
        }
    }
}

// Mailer that records calls and signals once each notification is handled.
#[derive(Default)]
pub struct RecordingMailer {
    pub fail_welcome: bool,
    pub hang_welcome: bool,
    pub welcomes: AtomicUsize,
    pub notifications: AtomicUsize,
    pub notified: Notify,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail_welcome: true,
            ..Default::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang_welcome: true,
            ..Default::default()
        }
    }

    // Wait until the worker has finished one job.
    pub async fn wait_for_notification(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.notified.notified())
            .await
            .expect("notification was never sent");
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_welcome(&self, _email: &str, _source: &str) -> Result<SentEmail, EmailError> {
        let n = self.welcomes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.hang_welcome {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if self.fail_welcome {
            return Err(EmailError::SendError("provider down".to_string()));
        }
        Ok(SentEmail {
            id: Some(format!("re_{n}")),
        })
    }

    async fn send_notification(&self, _email: &str, _source: &str) -> Result<(), EmailError> {
        self.notifications.fetch_add(1, Ordering::SeqCst);
        self.notified.notify_one();
        Ok(())
    }
}

pub struct TestApp {
    pub app: Router,
    pub store: Arc<dyn SignupStore>,
    pub mailer: Arc<RecordingMailer>,
    pub clock: Arc<ManualClock>,
}

pub fn spawn_app(verifier: StubVerifier, mailer: RecordingMailer) -> TestApp {
    spawn_app_with(verifier, mailer, Arc::new(MemoryStore::new()), Some(ADMIN_PASSWORD))
}

pub fn spawn_app_with(
    verifier: impl BotVerifier + 'static,
    mailer: RecordingMailer,
    store: Arc<dyn SignupStore>,
    admin_password: Option<&str>,
) -> TestApp {
    let mailer = Arc::new(mailer);
    let clock = Arc::new(ManualClock::new(Utc::now()));

    let (email_tx, email_rx) = mpsc::channel(16);
    tokio::spawn(email_worker(
        email_rx,
        mailer.clone(),
        store.clone(),
        Duration::from_millis(200),
    ));

    let state = Arc::new(AppState {
        store: store.clone(),
        verifier: Arc::new(verifier),
        rate_limiter: Arc::new(RateLimiter::new(clock.clone())),
        sessions: AdminSessions::new(admin_password, Duration::from_secs(3600)),
        email_tx,
        min_score: 0.3,
        verify_timeout: Duration::from_millis(200),
    });

    TestApp {
        app: router(state),
        store,
        mailer,
        clock,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub text: String,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.text).expect("json body")
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        TestResponse {
            status,
            headers,
            text: String::from_utf8(bytes.to_vec()).expect("utf8 body"),
        }
    }

    // POST JSON, optionally from a given client address.
    pub async fn post(&self, uri: &str, ip: Option<&str>, body: Value) -> TestResponse {
        let mut request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(ip) = ip {
            request = request.header("x-forwarded-for", ip);
        }
        self.send(request.body(Body::from(body.to_string())).expect("request"))
            .await
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        let mut request = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            request = request.header("cookie", cookie);
        }
        self.send(request.body(Body::empty()).expect("request")).await
    }

    pub async fn signup(&self, email: &str, ip: Option<&str>) -> TestResponse {
        self.post(
            "/signup",
            ip,
            serde_json::json!({ "email": email, "source": "hero", "recaptchaToken": "token" }),
        )
        .await
    }
}
