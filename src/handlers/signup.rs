use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::timeout;
use tracing::{info, warn};

use super::{enforce_rate_limit, normalize_email, rate_limit_headers};
use crate::error::AppError;
use crate::metrics::{SIGNUP_LATENCY, SIGNUP_REJECTIONS, SIGNUP_REQUESTS, SIGNUPS_CREATED};
use crate::models::{EmailJob, SignupRequest, SignupResponse};
use crate::rate_limit::{RATE_LIMITS, client_ip};
use crate::state::AppState;
use crate::store::{NewSignup, StoreError};

pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    SIGNUP_REQUESTS.inc();
    let timer = SIGNUP_LATENCY.start_timer();

    let result = match payload {
        Ok(Json(payload)) => signup(&state, &headers, payload).await,
        Err(rejection) => Err(AppError::BadRequest(rejection.body_text())),
    };

    timer.observe_duration();
    if let Err(e) = &result {
        SIGNUP_REJECTIONS.with_label_values(&[e.reason()]).inc();
    }
    result
}

// verify -> rate limit -> validate -> dedupe -> persist -> queue emails
async fn signup(
    state: &AppState,
    headers: &HeaderMap,
    payload: SignupRequest,
) -> Result<Response, AppError> {
    let ip = client_ip(headers);

    let recaptcha_score = match payload.recaptcha_token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => verify_human(state, &ip, token).await?,
        None => 0.0,
    };

    let limit = enforce_rate_limit(state, "email_signup", &ip, &RATE_LIMITS.email_signup)?;

    let email = normalize_email(&payload.email).ok_or(AppError::InvalidEmail)?;

    // the store's insert is the real uniqueness guard, this only skips a write
    if state
        .store
        .find_by_email(&email)
        .await
        .map_err(AppError::internal)?
        .is_some()
    {
        return Err(AppError::Conflict);
    }

    let source = payload
        .source
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown")
        .to_string();

    let outcome = state
        .store
        .insert(NewSignup {
            email: email.clone(),
            source: source.clone(),
            timestamp: Utc::now(),
            ip_address: ip.clone(),
            recaptcha_score,
        })
        .await
        .map_err(|e| match e {
            StoreError::Duplicate(_) => AppError::Conflict,
            other => AppError::internal(other),
        })?;

    if !outcome.acknowledged {
        return Err(AppError::Internal(format!("insert for {email} was not acknowledged")));
    }

    SIGNUPS_CREATED.inc();
    info!(id = %outcome.inserted_id, %source, %ip, "New waitlist signup");

    queue_emails(
        state,
        EmailJob {
            record_id: outcome.inserted_id.clone(),
            email,
            source,
        },
    );

    let body = Json(SignupResponse {
        success: true,
        message: "Email successfully added to waitlist".to_string(),
        id: outcome.inserted_id,
    });

    Ok(match limit {
        Some((max, result)) => (rate_limit_headers(max, &result), body).into_response(),
        None => body.into_response(),
    })
}

async fn verify_human(state: &AppState, ip: &str, token: &str) -> Result<f64, AppError> {
    let verification = timeout(state.verify_timeout, state.verifier.verify(token))
        .await
        .map_err(|_| {
            warn!(ip, "reCAPTCHA verification timed out");
            AppError::VerificationFailed
        })?
        .map_err(|e| {
            warn!(ip, "{}", e);
            AppError::VerificationFailed
        })?;

    // NaN never passes
    if !(verification.score >= state.min_score) {
        warn!(ip, score = verification.score, "reCAPTCHA score below threshold");
        return Err(AppError::VerificationFailed);
    }

    Ok(verification.score)
}

// Hand the emails to the background worker, never wait on it
fn queue_emails(state: &AppState, job: EmailJob) {
    match state.email_tx.try_send(job) {
        Ok(()) => {}
        Err(TrySendError::Full(job)) => {
            warn!(record_id = %job.record_id, "Email queue full, skipping signup emails");
        }
        Err(TrySendError::Closed(job)) => {
            warn!(record_id = %job.record_id, "Email worker gone, skipping signup emails");
        }
    }
}
