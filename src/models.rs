use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Persisted waitlist signup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignupRecord {
    pub id: String,
    pub email: String, // always normalized (trimmed, lowercase)
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub ip_address: String,
    pub recaptcha_score: f64,
    pub welcome_email_sent: bool,
    pub welcome_email_id: Option<String>,
}

// POST /signup body
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub email: String,
    pub source: Option<String>,
    pub recaptcha_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignupResponse {
    pub success: bool,
    pub message: String,
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub password: String,
}

// POST /admin/export filters
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExportFilter {
    pub date_range: Option<String>,
    pub source: Option<String>,
}

// Queued best-effort email work for one new signup
#[derive(Debug, Clone)]
pub struct EmailJob {
    pub record_id: String,
    pub email: String,
    pub source: String,
}
