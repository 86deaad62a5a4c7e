//! Outbound email. Every send in this crate happens after a database
//! transaction has committed and is best-effort: a failed notification is
//! logged and never propagated to the caller, because the state transition
//! is the thing the caller (or the payment processor) needs confirmed.

use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

use crate::{
    config::EmailConfig,
    error::{AppError, Result},
};

pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl Mailer {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| AppError::Internal(format!("SMTP transport error: {}", e)))?
            .credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ))
            .build();

        let from = config
            .from_address
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;

        Ok(Self { transport, from })
    }

    pub async fn send(&self, to: &str, subject: &str, html: String) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid recipient: {}", e)))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::External(format!("SMTP send failed: {}", e)))?;

        Ok(())
    }
}

/// Fire-and-forget send. Spawned so the caller returns immediately; the
/// outcome is only ever logged.
pub fn send_best_effort(mailer: Option<Arc<Mailer>>, to: String, subject: String, html: String) {
    let Some(mailer) = mailer else {
        tracing::debug!("Email disabled, skipping notification to {}", to);
        return;
    };

    tokio::spawn(async move {
        match mailer.send(&to, &subject, html).await {
            Ok(_) => tracing::debug!("Sent notification to {}", to),
            Err(e) => tracing::warn!("Failed to send notification to {}: {}", to, e),
        }
    });
}
