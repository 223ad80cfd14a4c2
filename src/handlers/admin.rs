use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{
        HeaderMap,
        header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{DateTime, Datelike, SecondsFormat, TimeDelta, TimeZone, Utc};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::enforce_rate_limit;
use crate::error::AppError;
use crate::models::{ExportFilter, LoginRequest, SignupRecord};
use crate::rate_limit::{RATE_LIMITS, client_ip};
use crate::session::SESSION_COOKIE;
use crate::state::AppState;
use crate::store::ListFilter;

const CSV_COLUMNS: [&str; 7] = [
    "Email",
    "Source",
    "Date",
    "Time",
    "Full Timestamp",
    "IP Address",
    "ID",
];

fn require_admin(state: &AppState, jar: &CookieJar) -> Result<(), AppError> {
    match jar.get(SESSION_COOKIE) {
        Some(cookie) if state.sessions.is_valid(cookie.value()) => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

// POST /admin/login
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<Value>), AppError> {
    let ip = client_ip(&headers);

    // wrong passwords count against the limit too
    enforce_rate_limit(&state, "login_attempt", &ip, &RATE_LIMITS.login_attempt)?;

    let Json(payload) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    if !state.sessions.is_configured() {
        return Err(AppError::Misconfigured);
    }
    if !state.sessions.verify_password(&payload.password) {
        warn!(%ip, "Failed admin login");
        return Err(AppError::InvalidCredentials("Invalid password".to_string()));
    }

    let token = state.sessions.create();
    let cookie = Cookie::parse(state.sessions.cookie(&token)).map_err(AppError::internal)?;

    info!(%ip, "Admin logged in");
    Ok((jar.add(cookie), Json(json!({ "success": true }))))
}

// DELETE /admin/login
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Json<Value>) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.revoke(cookie.value());
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Json(json!({ "success": true })))
}

// GET /admin/emails - dashboard data
pub async fn admin_emails_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &jar)?;

    let emails = state
        .store
        .list(&ListFilter::default())
        .await
        .map_err(AppError::internal)?;
    let stats = signup_stats(&emails, Utc::now());

    Ok(Json(json!({ "emails": emails, "stats": stats })))
}

fn signup_stats(emails: &[SignupRecord], now: DateTime<Utc>) -> Value {
    let mut sources: BTreeMap<&str, usize> = BTreeMap::new();
    for record in emails {
        *sources.entry(record.source.as_str()).or_default() += 1;
    }
    let since = |delta: TimeDelta| emails.iter().filter(|r| r.timestamp >= now - delta).count();

    json!({
        "total": emails.len(),
        "sources": sources,
        "recent": since(TimeDelta::hours(24)),
        "thisWeek": since(TimeDelta::days(7)),
    })
}

// GET /admin/export - every signup as CSV
pub async fn export_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    require_admin(&state, &jar)?;
    export(&state, ExportFilter::default()).await
}

// POST /admin/export - CSV narrowed by source and date range
pub async fn export_filtered_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    payload: Result<Json<ExportFilter>, JsonRejection>,
) -> Result<Response, AppError> {
    require_admin(&state, &jar)?;
    let Json(filter) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    export(&state, filter).await
}

async fn export(state: &AppState, filter: ExportFilter) -> Result<Response, AppError> {
    let now = Utc::now();
    let source = filter.source.filter(|s| !s.is_empty() && s != "all");
    let date_range = filter.date_range.filter(|r| !r.is_empty());

    let emails = state
        .store
        .list(&ListFilter {
            source: source.clone(),
            since: date_range.as_deref().and_then(|r| range_start(r, now)),
        })
        .await
        .map_err(AppError::internal)?;

    let mut filename = "waitlist-emails".to_string();
    for suffix in [source.as_deref(), date_range.as_deref()].into_iter().flatten() {
        filename.push('-');
        filename.push_str(&filename_safe(suffix));
    }
    filename.push_str(&now.format("-%Y-%m-%d.csv").to_string());

    info!(rows = emails.len(), %filename, "Exporting signups");

    Ok((
        [
            (CONTENT_TYPE, "text/csv".to_string()),
            (CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
            (CACHE_CONTROL, "no-cache".to_string()),
        ],
        to_csv(&emails),
    )
        .into_response())
}

fn range_start(range: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match range {
        "today" => Utc
            .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
            .single(),
        "week" => Some(now - TimeDelta::days(7)),
        "month" => Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0).single(),
        _ => None,
    }
}

fn filename_safe(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn csv_field(value: &str) -> String {
    // spreadsheets evaluate cells starting with these as formulas
    let value = if value.starts_with(['=', '+', '-', '@']) {
        format!("'{value}")
    } else {
        value.to_string()
    };

    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value
    }
}

fn to_csv(emails: &[SignupRecord]) -> String {
    if emails.is_empty() {
        return String::new();
    }

    let mut lines = vec![CSV_COLUMNS.join(",")];
    for record in emails {
        let row = [
            record.email.clone(),
            record.source.clone(),
            record.timestamp.format("%-m/%-d/%Y").to_string(),
            record.timestamp.format("%-I:%M:%S %p").to_string(),
            record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            record.ip_address.clone(),
            record.id.clone(),
        ];
        lines.push(row.iter().map(|v| csv_field(v)).collect::<Vec<_>>().join(","));
    }
    lines.join("\n")
}
