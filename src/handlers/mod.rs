mod admin;
mod emails;
mod health;
mod metrics;
mod signup;
mod unsubscribe;

pub use admin::{admin_emails_handler, export_filtered_handler, export_handler, login_handler, logout_handler};
pub use emails::{check_email_handler, signup_count_handler};
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use signup::signup_handler;
pub use unsubscribe::{unsubscribe_handler, unsubscribe_link_handler};

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use chrono::SecondsFormat;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

use crate::error::AppError;
use crate::rate_limit::{RateLimitPolicy, RateLimitResult, should_bypass_rate_limit};
use crate::state::AppState;

lazy_static! {
    static ref EMAIL_PATTERN: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

// trimmed + lowercased, None if it doesn't look like an email
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    EMAIL_PATTERN.is_match(&email).then_some(email)
}

pub fn rate_limit_headers(limit: u32, result: &RateLimitResult) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static("x-ratelimit-limit"), HeaderValue::from(limit));
    headers.insert(
        HeaderName::from_static("x-ratelimit-remaining"),
        HeaderValue::from(result.remaining_requests),
    );
    let reset = result.reset_time.to_rfc3339_opts(SecondsFormat::Millis, true);
    if let Ok(value) = HeaderValue::from_str(&reset) {
        headers.insert(HeaderName::from_static("x-ratelimit-reset"), value);
    }
    headers
}

// bypassed addresses consume nothing and get Ok(None)
fn enforce_rate_limit(
    state: &AppState,
    action: &str,
    ip: &str,
    policy: &RateLimitPolicy,
) -> Result<Option<(u32, RateLimitResult)>, AppError> {
    if should_bypass_rate_limit(ip) {
        return Ok(None);
    }

    let result = state.rate_limiter.check(&format!("{action}_{ip}"), policy);
    if !result.allowed {
        warn!(ip, action, retry_after = result.retry_after_secs, "Rate limit exceeded");
        return Err(AppError::RateLimited {
            message: result.error.clone().unwrap_or_else(|| "Too many requests".to_string()),
            limit: policy.max_requests,
            result,
        });
    }

    Ok(Some((policy.max_requests, result)))
}
