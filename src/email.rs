use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

pub const RESEND_URL: &str = "https://api.resend.com/emails";

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("Email service not configured")]
    NotConfigured,

    #[error("Failed to send email: {0}")]
    SendError(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub id: Option<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_welcome(&self, email: &str, source: &str) -> Result<SentEmail, EmailError>;

    async fn send_notification(&self, email: &str, source: &str) -> Result<(), EmailError>;
}

#[derive(Serialize)]
struct ResendRequest {
    from: String,
    to: Vec<String>,
    subject: String,
    html: String,
    text: String,
}

#[derive(Deserialize)]
struct ResendResponse {
    id: Option<String>,
}

pub struct ResendMailer {
    client: reqwest::Client,
    api_key: Option<String>,
    from: String,
    notify_to: String,
    endpoint: String,
    timeout: Duration,
}

impl ResendMailer {
    pub fn new(
        client: reqwest::Client,
        api_key: Option<String>,
        from: String,
        notify_to: String,
        timeout: Duration,
    ) -> Self {
        if api_key.is_some() {
            info!("Email service configured with Resend API");
        } else {
            warn!("RESEND_API_KEY not set, welcome and notification emails are disabled");
        }
        Self {
            client,
            api_key,
            from,
            notify_to,
            endpoint: RESEND_URL.to_string(),
            timeout,
        }
    }

    // e.g. a local relay or a mock API
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn send(&self, body: ResendRequest) -> Result<SentEmail, EmailError> {
        let api_key = self.api_key.as_deref().ok_or(EmailError::NotConfigured)?;

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| EmailError::SendError(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!("Resend API error: {} - {}", status, text);
            return Err(EmailError::SendError(format!("{}: {}", status, text)));
        }

        let sent: ResendResponse = resp
            .json()
            .await
            .map_err(|e| EmailError::SendError(e.to_string()))?;
        Ok(SentEmail { id: sent.id })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send_welcome(&self, email: &str, source: &str) -> Result<SentEmail, EmailError> {
        let sent = self
            .send(ResendRequest {
                from: self.from.clone(),
                to: vec![email.to_string()],
                subject: "Welcome to the waitlist!".to_string(),
                html: welcome_html(source),
                text: welcome_text(source),
            })
            .await?;

        info!(id = ?sent.id, "Welcome email sent to {}", email);
        Ok(sent)
    }

    async fn send_notification(&self, email: &str, source: &str) -> Result<(), EmailError> {
        self.send(ResendRequest {
            from: self.from.clone(),
            to: vec![self.notify_to.clone()],
            subject: format!("New waitlist signup: {}", email),
            html: format!(
                "<p><strong>{}</strong> joined the waitlist via the <em>{}</em> form.</p>",
                escape_html(email),
                escape_html(source)
            ),
            text: format!("{} joined the waitlist via the {} form.", email, source),
        })
        .await?;
        Ok(())
    }
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn welcome_html(source: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>You're on the list</title>
</head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <div style="background-color: #f9f9f9; border-radius: 8px; padding: 30px; margin-bottom: 20px;">
        <h1 style="margin-top: 0; color: #1a1a1a;">You're on the list!</h1>
        <p>Thanks for joining the waitlist. We'll let you know the moment we go live.</p>
    </div>
    <div style="text-align: center; color: #999; font-size: 12px;">
        <p>You received this email because you signed up via our {source} form.</p>
    </div>
</body>
</html>"#,
        source = escape_html(source)
    )
}

fn welcome_text(source: &str) -> String {
    format!(
        "You're on the list!\n\n\
         Thanks for joining the waitlist. We'll let you know the moment we go live.\n\n\
         ---\n\
         You received this email because you signed up via our {} form.\n",
        source
    )
}
