use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const SITEVERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("reCAPTCHA secret not configured")]
    NotConfigured,

    #[error("reCAPTCHA verification failed: {0}")]
    Rejected(String),

    #[error("Failed to verify reCAPTCHA token: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verification {
    pub score: f64,
}

#[async_trait]
pub trait BotVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Verification, VerifyError>;
}

#[derive(Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

// Google reCAPTCHA v3 siteverify client
pub struct RecaptchaVerifier {
    client: reqwest::Client,
    secret: Option<String>,
    endpoint: String,
    timeout: Duration,
}

impl RecaptchaVerifier {
    pub fn new(client: reqwest::Client, secret: Option<String>, timeout: Duration) -> Self {
        if secret.is_none() {
            warn!("RECAPTCHA_SECRET_KEY not set, every supplied token will fail verification");
        }
        Self {
            client,
            secret,
            endpoint: SITEVERIFY_URL.to_string(),
            timeout,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl BotVerifier for RecaptchaVerifier {
    async fn verify(&self, token: &str) -> Result<Verification, VerifyError> {
        let secret = self.secret.as_deref().ok_or(VerifyError::NotConfigured)?;

        let form = serde_urlencoded::to_string([("secret", secret), ("response", token)])
            .map_err(|e| VerifyError::Transport(e.to_string()))?;

        let res = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| VerifyError::Transport(e.to_string()))?;

        let body: SiteverifyResponse = res
            .json()
            .await
            .map_err(|e| VerifyError::Transport(e.to_string()))?;

        interpret(body)
    }
}

fn interpret(body: SiteverifyResponse) -> Result<Verification, VerifyError> {
    if !body.success {
        let codes = if body.error_codes.is_empty() {
            "Unknown error".to_string()
        } else {
            body.error_codes.join(", ")
        };
        return Err(VerifyError::Rejected(codes));
    }

    Ok(Verification {
        score: body.score.unwrap_or(0.0),
    })
}
