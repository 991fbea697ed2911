use super::{DeliveryAck, Notifier, ReportMessage};
use crate::domain::Result;
use async_trait::async_trait;

/// Writes the report to stdout instead of sending it
#[derive(Debug, Default, Clone)]
pub struct LogNotifier {
    quiet: bool,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs the delivery without printing the report body
    pub fn quiet() -> Self {
        Self { quiet: true }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &ReportMessage) -> Result<DeliveryAck> {
        tracing::info!(
            subject = %message.subject,
            recipients = message.to.len(),
            bytes = message.text.len(),
            "Report not mailed (log delivery)"
        );

        if !self.quiet {
            println!("Subject: {}\n\n{}", message.subject, message.text);
        }

        Ok(DeliveryAck {
            transport: self.name(),
            detail: format!("logged {} bytes", message.text.len()),
        })
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
