//! Report delivery through a local mail relay.

use crate::error::{Result, WebglCiError};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use tracing::info;

/// A plain-text report email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailReport {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl EmailReport {
    /// Build the MIME message.
    pub fn to_message(&self) -> Result<Message> {
        let mail_err = |e: &dyn std::fmt::Display| WebglCiError::Mail(e.to_string());

        let from: Mailbox = self.from.parse().map_err(|e| mail_err(&e))?;
        let mut builder = Message::builder().from(from).subject(self.subject.as_str());
        for to in &self.to {
            let mailbox: Mailbox = to.trim().parse().map_err(|e| mail_err(&e))?;
            builder = builder.to(mailbox);
        }

        builder
            .header(ContentType::TEXT_PLAIN)
            .body(self.body.clone())
            .map_err(|e| mail_err(&e))
    }
}

/// Sends rendered reports.
#[async_trait]
pub trait ReportMailer: Send + Sync {
    async fn send(&self, report: &EmailReport) -> Result<()>;
}

/// Unauthenticated SMTP relay (normally the local MTA).
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    host: String,
    port: u16,
}

impl SmtpMailer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Relay on `localhost:25`.
    pub fn localhost() -> Self {
        Self::new("localhost", 25)
    }
}

impl Default for SmtpMailer {
    fn default() -> Self {
        Self::localhost()
    }
}

#[async_trait]
impl ReportMailer for SmtpMailer {
    async fn send(&self, report: &EmailReport) -> Result<()> {
        let message = report.to_message()?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host)
            .port(self.port)
            .build();

        transport
            .send(message)
            .await
            .map_err(|e| WebglCiError::Mail(e.to_string()))?;

        info!(subject = %report.subject, "Email was sent successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> EmailReport {
        EmailReport {
            from: "webgl-ci@example.com".to_string(),
            to: vec!["gpu-team@example.com".to_string(), " oncall@example.com".to_string()],
            subject: "WebGL CTS on Chrome 531002 and Mesa 100234 has 0 Regression".to_string(),
            body: "FAIL: 0, SKIP: 0, PASS 10\n".to_string(),
        }
    }

    #[test]
    fn test_to_message_headers() {
        let message = report().to_message().unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("From: webgl-ci@example.com"));
        assert!(raw.contains("gpu-team@example.com"));
        assert!(raw.contains("oncall@example.com"));
        assert!(raw.contains("Subject: WebGL CTS on Chrome 531002"));
        assert!(raw.contains("text/plain"));
    }

    #[test]
    fn test_invalid_address_is_mail_error() {
        let mut r = report();
        r.to = vec!["not an address".to_string()];
        assert!(matches!(r.to_message(), Err(WebglCiError::Mail(_))));
    }

    #[tokio::test]
    async fn test_recording_mailer() {
        let mailer = crate::fakes::RecordingMailer::new();
        mailer.send(&report()).await.unwrap();
        assert_eq!(mailer.sent().len(), 1);

        let failing = crate::fakes::RecordingMailer::failing();
        assert!(failing.send(&report()).await.is_err());
    }
}
