use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, register_counter, register_counter_vec, register_gauge,
    register_histogram,
};


lazy_static! {
    pub static ref SIGNUP_REQUESTS: Counter =
        register_counter!("waitlist_signup_requests_total", "Total number of signup requests").unwrap();
    pub static ref SIGNUPS_CREATED: Counter =
        register_counter!("waitlist_signups_created_total", "Signups persisted").unwrap();
    pub static ref SIGNUP_REJECTIONS: CounterVec = register_counter_vec!(
        "waitlist_signup_rejections_total",
        "Signup requests rejected, by reason",
        &["reason"]
    )
    .unwrap();
    pub static ref EMAILS_SENT: CounterVec = register_counter_vec!(
        "waitlist_emails_sent_total",
        "Best-effort emails delivered, by kind",
        &["kind"]
    )
    .unwrap();
    pub static ref EMAIL_FAILURES: CounterVec = register_counter_vec!(
        "waitlist_email_failures_total",
        "Best-effort emails that failed or timed out, by kind",
        &["kind"]
    )
    .unwrap();
    pub static ref SIGNUP_LATENCY: Histogram = register_histogram!(
        "waitlist_signup_latency_seconds",
        "Signup request latency in seconds"
    )
    .unwrap();
    pub static ref RATE_LIMIT_ENTRIES: Gauge =
        register_gauge!("waitlist_rate_limit_entries", "Identifiers currently tracked by the rate limiter").unwrap();
}
