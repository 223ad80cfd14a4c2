use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    response::Html,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

use super::normalize_email;
use crate::email::escape_html;
use crate::error::AppError;
use crate::models::{EmailQuery, UnsubscribeRequest};
use crate::state::AppState;

async fn remove(state: &AppState, raw: &str) -> Result<String, AppError> {
    let email = normalize_email(raw).ok_or(AppError::InvalidEmail)?;

    let removed = state
        .store
        .delete_by_email(&email)
        .await
        .map_err(AppError::internal)?;
    if !removed {
        return Err(AppError::NotFound("Email not found in our system".to_string()));
    }

    info!("Email unsubscribed: {}", email);
    Ok(email)
}

pub async fn unsubscribe_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UnsubscribeRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(payload) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    remove(&state, &payload.email).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Successfully unsubscribed from waitlist updates"
    })))
}

// GET /unsubscribe?email= - target of the link in outgoing emails
pub async fn unsubscribe_link_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EmailQuery>,
) -> Result<Html<String>, AppError> {
    let raw = query
        .email
        .ok_or_else(|| AppError::BadRequest("Email parameter required".to_string()))?;
    let email = remove(&state, &raw).await?;

    Ok(Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Unsubscribed</title>
</head>
<body style="font-family: system-ui, -apple-system, sans-serif; max-width: 500px; margin: 100px auto; text-align: center;">
    <h1>Unsubscribed Successfully</h1>
    <p>The email address <strong>{}</strong> has been removed from waitlist updates.</p>
</body>
</html>"#,
        escape_html(&email)
    )))
}
