use clap::Parser;
use std::time::Duration;

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "waitlist-gateway")]
#[command(about = "Waitlist signup backend with rate limiting and bot checks")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "WAITLIST_PORT", default_value_t = 8080)]
    pub port: u16,

    // reCAPTCHA v3 secret; tokens fail verification when unset
    #[arg(long, env = "RECAPTCHA_SECRET_KEY", hide_env_values = true)]
    pub recaptcha_secret: Option<String>,

    // Lowest accepted bot score for signups
    #[arg(long, env = "WAITLIST_RECAPTCHA_MIN_SCORE", default_value_t = 0.3)]
    pub recaptcha_min_score: f64,

    // Resend API key; emails are skipped when unset
    #[arg(long, env = "RESEND_API_KEY", hide_env_values = true)]
    pub resend_api_key: Option<String>,

    // Sender for welcome and notification emails
    #[arg(long, env = "WAITLIST_FROM_EMAIL", default_value = "Waitlist <hello@example.com>")]
    pub from_email: String,

    // Inbox that gets told about each new signup
    #[arg(long, env = "WAITLIST_NOTIFY_EMAIL", default_value = "hello@example.com")]
    pub notify_email: String,

    // Admin dashboard password
    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    // Admin session lifetime in hours
    #[arg(long, env = "WAITLIST_SESSION_TTL_HOURS", default_value_t = 24 * 7)]
    pub session_ttl_hours: u64,

    // Mark the admin session cookie Secure (set when served over https)
    #[arg(long, env = "WAITLIST_SECURE_COOKIES")]
    pub secure_cookies: bool,

    // Timeout for reCAPTCHA and email calls in milliseconds
    #[arg(long, env = "WAITLIST_OUTBOUND_TIMEOUT_MS", default_value_t = 5000)]
    pub outbound_timeout_ms: u64,

    // Expired rate limit entries are swept on this interval (seconds)
    #[arg(long, env = "WAITLIST_SWEEP_INTERVAL", default_value_t = 60 * 60)]
    pub sweep_interval: u64,

    // Capacity of the background email queue
    #[arg(long, env = "WAITLIST_EMAIL_QUEUE", default_value_t = 100)]
    pub email_queue: usize,

    // Allowed browser origin; any origin when unset
    #[arg(long, env = "WAITLIST_CORS_ORIGIN")]
    pub cors_origin: Option<String>,
}

impl Args {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_hours.saturating_mul(60 * 60))
    }
}
