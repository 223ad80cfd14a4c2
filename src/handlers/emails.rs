use axum::{
    Json,
    extract::{Query, State},
};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::error::AppError;
use crate::models::EmailQuery;
use crate::state::AppState;

// GET /emails?email= - is this address already on the list?
pub async fn check_email_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<Value>, AppError> {
    let email = query
        .email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::BadRequest("Email parameter required".to_string()))?;

    let exists = state
        .store
        .find_by_email(&email)
        .await
        .map_err(AppError::internal)?
        .is_some();

    Ok(Json(json!({ "exists": exists, "email": email })))
}

pub async fn signup_count_handler(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let count = state.store.count().await.map_err(AppError::internal)?;
    Ok(Json(json!({ "success": true, "count": count })))
}
