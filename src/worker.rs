use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::email::{EmailError, Mailer};
use crate::metrics::{EMAIL_FAILURES, EMAILS_SENT};
use crate::models::EmailJob;
use crate::store::SignupStore;


// Background worker -> sends signup emails from the queue one by one
pub async fn email_worker(
    mut rx: mpsc::Receiver<EmailJob>,
    mailer: Arc<dyn Mailer>,
    store: Arc<dyn SignupStore>,
    send_timeout: Duration,
) {
    info!("Email worker started");

    // keep receiving jobs until every sender is dropped
    while let Some(job) = rx.recv().await {
        deliver(&job, mailer.as_ref(), store.as_ref(), send_timeout).await;
    }

    info!("Email worker stopped");
}

// welcome first, then the team notification
pub async fn deliver(
    job: &EmailJob,
    mailer: &dyn Mailer,
    store: &dyn SignupStore,
    send_timeout: Duration,
) {
    match bounded(send_timeout, mailer.send_welcome(&job.email, &job.source)).await {
        Ok(sent) => {
            EMAILS_SENT.with_label_values(&["welcome"]).inc();
            if let Err(e) = store.mark_welcome_sent(&job.record_id, sent.id).await {
                warn!(record_id = %job.record_id, "Could not record welcome email: {}", e);
            }
        }
        Err(e) => {
            EMAIL_FAILURES.with_label_values(&["welcome"]).inc();
            warn!(record_id = %job.record_id, "Welcome email to {} failed: {}", job.email, e);
        }
    }

    match bounded(send_timeout, mailer.send_notification(&job.email, &job.source)).await {
        Ok(()) => EMAILS_SENT.with_label_values(&["notification"]).inc(),
        Err(e) => {
            EMAIL_FAILURES.with_label_values(&["notification"]).inc();
            warn!(record_id = %job.record_id, "Signup notification failed: {}", e);
        }
    }
}

async fn bounded<T>(
    limit: Duration,
    send: impl Future<Output = Result<T, EmailError>>,
) -> Result<T, EmailError> {
    timeout(limit, send)
        .await
        .unwrap_or_else(|_| Err(EmailError::SendError(format!("timed out after {:?}", limit))))
}
