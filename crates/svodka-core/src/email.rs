//! Digest delivery over the Resend email API.

use std::time::Duration;

use async_trait::async_trait;
use pulldown_cmark::{Options, Parser, html};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::types::Digest;

/// Resend's sandbox sender; usable without a verified domain.
pub const DEFAULT_FROM_ADDRESS: &str = "onboarding@resend.dev";
const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One email submission: both body renditions plus the recipients of this
/// call.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailPayload {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sent,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecipientFailure {
    pub recipient: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryResult {
    pub status: DeliveryStatus,
    pub detail: String,
    pub failures: Vec<RecipientFailure>,
}

/// An email-sending backend. `send` submits one email and returns the
/// backend's message id.
#[async_trait]
pub trait EmailBackend: Send + Sync {
    /// Whether one call may carry every recipient.
    fn supports_batch(&self) -> bool;

    async fn send(&self, payload: &EmailPayload) -> std::result::Result<String, String>;
}

pub struct ResendMailer {
    http: reqwest::Client,
    api_key: String,
    from_address: String,
}

impl ResendMailer {
    /// `None` when `RESEND_API_KEY` is absent; email delivery is optional.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("RESEND_API_KEY").ok()?;
        let from_address =
            std::env::var("RESEND_FROM_EMAIL").unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string());
        Some(Self::new(api_key, from_address))
    }

    pub fn new(api_key: String, from_address: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            http,
            api_key,
            from_address,
        }
    }
}

#[async_trait]
impl EmailBackend for ResendMailer {
    fn supports_batch(&self) -> bool {
        true
    }

    async fn send(&self, payload: &EmailPayload) -> std::result::Result<String, String> {
        let response = self
            .http
            .post(RESEND_ENDPOINT)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "from": self.from_address,
                "to": payload.recipients,
                "subject": payload.subject,
                "html": payload.html_body,
                "text": payload.text_body,
            }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        let body: Value = response.json().await.map_err(|e| e.to_string())?;
        if !status.is_success() {
            return Err(format!(
                "{}: {}",
                status,
                body["message"].as_str().unwrap_or("unknown error")
            ));
        }
        match body["id"].as_str() {
            Some(id) => Ok(id.to_string()),
            None => Err(format!("no message id in response: {body}")),
        }
    }
}

/// Submit the digest to `mailer` for every recipient.
///
/// No mailer or no recipients is a skip, not an error. Batch-capable backends
/// get one call carrying all recipients; otherwise one call per recipient,
/// with any failure turning the aggregate into `Failed` and the failing
/// recipients listed on the result. No automatic retry.
pub async fn deliver<B: EmailBackend + ?Sized>(
    digest: &Digest,
    recipients: &[String],
    mailer: Option<&B>,
) -> DeliveryResult {
    let Some(mailer) = mailer else {
        info!("skipping email: no delivery credentials configured");
        return DeliveryResult {
            status: DeliveryStatus::Skipped,
            detail: "email credentials not configured".to_string(),
            failures: Vec::new(),
        };
    };
    if recipients.is_empty() {
        info!("skipping email: no recipients configured");
        return DeliveryResult {
            status: DeliveryStatus::Skipped,
            detail: "no recipients configured".to_string(),
            failures: Vec::new(),
        };
    }

    let html_body = markdown_to_email_html(&digest.body_markdown);
    let payload = EmailPayload {
        subject: digest.subject.clone(),
        html_body,
        // Plain-text fallback for clients that don't render HTML.
        text_body: digest.body_markdown.clone(),
        recipients: recipients.to_vec(),
    };

    info!("sending email to {} recipient(s)", recipients.len());
    if mailer.supports_batch() {
        match mailer.send(&payload).await {
            Ok(id) => DeliveryResult {
                status: DeliveryStatus::Sent,
                detail: format!("sent to {} recipient(s), id {id}", recipients.len()),
                failures: Vec::new(),
            },
            Err(reason) => {
                warn!("email send failed: {reason}");
                DeliveryResult {
                    status: DeliveryStatus::Failed,
                    detail: reason,
                    failures: Vec::new(),
                }
            }
        }
    } else {
        let mut failures = Vec::new();
        let mut sent = 0usize;
        for recipient in recipients {
            let single = EmailPayload {
                recipients: vec![recipient.clone()],
                ..payload.clone()
            };
            match mailer.send(&single).await {
                Ok(_) => sent += 1,
                Err(reason) => {
                    warn!("email send failed for {recipient}: {reason}");
                    failures.push(RecipientFailure {
                        recipient: recipient.clone(),
                        reason,
                    });
                }
            }
        }
        if failures.is_empty() {
            DeliveryResult {
                status: DeliveryStatus::Sent,
                detail: format!("sent to {sent} recipient(s)"),
                failures,
            }
        } else {
            let failed: Vec<&str> = failures.iter().map(|f| f.recipient.as_str()).collect();
            DeliveryResult {
                status: DeliveryStatus::Failed,
                detail: format!(
                    "{} of {} recipient(s) failed: {}",
                    failures.len(),
                    recipients.len(),
                    failed.join(", ")
                ),
                failures,
            }
        }
    }
}

/// Render the digest Markdown to an HTML fragment (headings, lists, links,
/// emphasis).
pub fn markdown_to_html_fragment(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::empty());
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

/// Wrap the rendered fragment in a fixed email template with inline styling.
pub fn markdown_to_email_html(markdown: &str) -> String {
    let fragment = markdown_to_html_fragment(markdown);
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Helvetica, Arial, sans-serif; line-height: 1.6; color: #333333; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
        h3 {{ color: #1a1a1a; margin-top: 20px; margin-bottom: 5px; }}
        a {{ color: #0066cc; text-decoration: none; }}
        a:hover {{ text-decoration: underline; }}
        ul {{ margin-top: 0; padding-left: 20px; margin-bottom: 20px; }}
        li {{ margin-bottom: 5px; }}
        hr {{ border: 0; border-top: 1px solid #eeeeee; margin: 20px 0; }}
        .footer {{ font-size: 12px; color: #888888; margin-top: 30px; text-align: center; }}
    </style>
</head>
<body>
    <div class="container">
        {fragment}
        <div class="footer">
            <p>Generated by AI</p>
        </div>
    </div>
</body>
</html>"#
    )
}
