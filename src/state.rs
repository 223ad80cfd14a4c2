use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use crate::models::EmailJob;
use crate::rate_limit::RateLimiter;
use crate::recaptcha::BotVerifier;
use crate::session::AdminSessions;
use crate::store::SignupStore;
// app's shared state

pub struct AppState {
    pub store: Arc<dyn SignupStore>,
    pub verifier: Arc<dyn BotVerifier>,
    pub rate_limiter: Arc<RateLimiter>,
    pub sessions: AdminSessions,
    pub email_tx: mpsc::Sender<EmailJob>, // best-effort email queue
    pub min_score: f64,                   // lowest accepted bot score
    pub verify_timeout: Duration,         // bound on the reCAPTCHA round trip
}
