use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::{HeaderValue, Method, header::CONTENT_TYPE},
    routing::{get, post},
};
use tokio::{net::TcpListener, signal, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

pub mod config;
pub mod email;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod recaptcha;
pub mod session;
pub mod state;
pub mod store;
pub mod worker;

use config::Args;
use email::{Mailer, ResendMailer};
use handlers::{
    admin_emails_handler, check_email_handler, export_filtered_handler, export_handler,
    health_handler, login_handler, logout_handler, metrics_handler, signup_count_handler,
    signup_handler, unsubscribe_handler, unsubscribe_link_handler,
};
use rate_limit::{RateLimiter, spawn_sweeper};
use recaptcha::RecaptchaVerifier;
use session::AdminSessions;
use state::AppState;
use store::{MemoryStore, SignupStore};
use worker::email_worker;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/signup", post(signup_handler))
        .route("/emails", get(check_email_handler))
        .route("/signup-count", get(signup_count_handler))
        .route("/unsubscribe", post(unsubscribe_handler).get(unsubscribe_link_handler))
        .route("/admin/login", post(login_handler).delete(logout_handler))
        .route("/admin/emails", get(admin_emails_handler))
        .route("/admin/export", get(export_handler).post(export_filtered_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Ok(match origin {
        // admin cookies only cross origins when the origin is pinned
        Some(origin) => cors
            .allow_origin(HeaderValue::from_str(origin)?)
            .allow_credentials(true),
        None => cors.allow_origin(Any),
    })
}

pub async fn start_server(args: Args) -> anyhow::Result<()> {
    let outbound_timeout = Duration::from_millis(args.outbound_timeout_ms);
    let client = reqwest::Client::builder().timeout(outbound_timeout).build()?;

    let store: Arc<dyn SignupStore> = Arc::new(MemoryStore::new());
    let mailer: Arc<dyn Mailer> = Arc::new(ResendMailer::new(
        client.clone(),
        args.resend_api_key.clone(),
        args.from_email.clone(),
        args.notify_email.clone(),
        outbound_timeout,
    ));
    let verifier = Arc::new(RecaptchaVerifier::new(
        client,
        args.recaptcha_secret.clone(),
        outbound_timeout,
    ));
    let rate_limiter = Arc::new(RateLimiter::default());

    // spawn the background email worker
    let (email_tx, email_rx) = mpsc::channel(args.email_queue.max(1));
    let worker = tokio::spawn(email_worker(email_rx, mailer, store.clone(), outbound_timeout));

    let cancel = CancellationToken::new();
    let sweeper = spawn_sweeper(
        rate_limiter.clone(),
        Duration::from_secs(args.sweep_interval.max(1)),
        cancel.clone(),
    );

    if args.admin_password.is_none() {
        warn!("ADMIN_PASSWORD not set, admin login is disabled");
    }

    let state = Arc::new(AppState {
        store,
        verifier,
        rate_limiter,
        sessions: AdminSessions::new(args.admin_password.as_deref(), args.session_ttl())
            .secure(args.secure_cookies),
        email_tx,
        min_score: args.recaptcha_min_score,
        verify_timeout: outbound_timeout,
    });

    let app = router(state).layer(cors_layer(args.cors_origin.as_deref())?);

    let address = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&address).await?;
    info!("Waitlist gateway running on http://localhost:{}", args.port);
    info!(
        "Signup limit: {} per {:?}, min bot score {}",
        rate_limit::RATE_LIMITS.email_signup.max_requests,
        rate_limit::RATE_LIMITS.email_signup.window,
        args.recaptcha_min_score
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");

    // the router (and with it the queue sender) is gone, let the worker drain
    cancel.cancel();
    if let Err(e) = sweeper.await {
        error!("Rate limit sweeper failed: {}", e);
    }
    match tokio::time::timeout(Duration::from_secs(10), worker).await {
        Ok(Err(e)) => error!("Email worker failed: {}", e),
        Err(_) => warn!("Email worker did not drain in time"),
        Ok(Ok(())) => {}
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
