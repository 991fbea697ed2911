//! SMTP delivery via lettre

use super::{DeliveryAck, Notifier, ReportMessage};
use crate::config::NotificationConfig;
use crate::domain::{ReportError, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;
use std::time::Duration;

const SMTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Sends reports through an SMTP relay using STARTTLS
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    default_from: Option<String>,
    host: String,
}

impl SmtpNotifier {
    pub fn from_config(config: &NotificationConfig) -> Result<Self> {
        let host = config
            .smtp_host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ReportError::Configuration("notification.smtp_host is required".to_string()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| ReportError::Configuration(format!("Invalid SMTP relay '{host}': {e}")))?
            .port(config.smtp_port)
            .timeout(Some(SMTP_TIMEOUT));

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            let password: &str = password.expose_secret().as_ref();
            builder = builder.credentials(Credentials::new(username.clone(), password.to_string()));
        }

        Ok(Self {
            transport: builder.build(),
            default_from: config.from.clone(),
            host: host.to_string(),
        })
    }

    /// Builds the plain-text mail for a report
    pub fn build_message(&self, message: &ReportMessage) -> Result<Message> {
        let from = message
            .from
            .as_deref()
            .or(self.default_from.as_deref())
            .ok_or_else(|| ReportError::Notification("No sender address configured".to_string()))?;

        if message.to.is_empty() {
            return Err(ReportError::Notification("No recipients configured".to_string()));
        }

        let mut builder = Message::builder()
            .from(parse_mailbox(from)?)
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_PLAIN);

        for recipient in &message.to {
            builder = builder.to(parse_mailbox(recipient)?);
        }

        builder
            .body(message.text.clone())
            .map_err(|e| ReportError::Notification(format!("Failed to build mail: {e}")))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| ReportError::Notification(format!("Invalid mail address '{address}': {e}")))
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, message: &ReportMessage) -> Result<DeliveryAck> {
        let mail = self.build_message(message)?;

        tracing::debug!(host = %self.host, recipients = message.to.len(), "Sending report mail");

        let response = self
            .transport
            .send(mail)
            .await
            .map_err(|e| ReportError::Notification(format!("SMTP delivery failed: {e}")))?;

        let detail: Vec<String> = response.message().map(|m| m.to_string()).collect();
        Ok(DeliveryAck {
            transport: self.name(),
            detail: format!("{} {}", response.code(), detail.join(" ")),
        })
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;

    fn config() -> NotificationConfig {
        NotificationConfig {
            enabled: true,
            smtp_host: Some("smtp.example.com".to_string()),
            smtp_port: 587,
            smtp_username: Some("user".to_string()),
            smtp_password: Some(secret_string("pw".to_string())),
            from: Some("\"Lab Reports\" <reports@example.com>".to_string()),
            to: vec!["lab@example.com".to_string()],
        }
    }

    fn message() -> ReportMessage {
        ReportMessage {
            from: None,
            to: vec!["lab@example.com".to_string(), "Dr Who <who@example.com>".to_string()],
            subject: "Lab Reports on 2024-03-01".to_string(),
            text: "Results of Lab Tests".to_string(),
        }
    }

    #[tokio::test]
    async fn test_build_message() {
        let notifier = SmtpNotifier::from_config(&config()).unwrap();
        let mail = notifier.build_message(&message()).unwrap();
        let formatted = String::from_utf8(mail.formatted()).unwrap();

        assert!(formatted.contains("Subject: Lab Reports on 2024-03-01"));
        assert!(formatted.contains("reports@example.com"));
        assert!(formatted.contains("who@example.com"));
        assert!(formatted.contains("Results of Lab Tests"));
    }

    #[tokio::test]
    async fn test_build_message_requires_recipients() {
        let notifier = SmtpNotifier::from_config(&config()).unwrap();
        let mut message = message();
        message.to.clear();
        assert!(matches!(
            notifier.build_message(&message),
            Err(ReportError::Notification(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let notifier = SmtpNotifier::from_config(&config()).unwrap();
        let mut message = message();
        message.to = vec!["not an address".to_string()];
        assert!(notifier.build_message(&message).is_err());
    }

    #[test]
    fn test_missing_host() {
        let mut config = config();
        config.smtp_host = None;
        assert!(matches!(
            SmtpNotifier::from_config(&config),
            Err(ReportError::Configuration(_))
        ));
    }
}
