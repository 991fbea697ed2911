//! Report delivery
//!
//! [`Notifier`] implementations receive the finished report as a
//! [`ReportMessage`]. [`SmtpNotifier`] sends it by mail; [`LogNotifier`] writes it
//! to the log and stdout and is used for dry runs or when mail is disabled.

pub mod log;
pub mod smtp;

pub use self::log::LogNotifier;
pub use smtp::SmtpNotifier;

use crate::config::NotificationConfig;
use crate::domain::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A finished report ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportMessage {
    pub from: Option<String>,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
}

/// Acknowledgment returned by a notifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAck {
    pub transport: &'static str,
    pub detail: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &ReportMessage) -> Result<DeliveryAck>;

    fn name(&self) -> &'static str;
}

/// Picks the SMTP notifier when mail is enabled and this is not a dry run
pub fn notifier_from_config(config: &NotificationConfig, dry_run: bool) -> Result<Arc<dyn Notifier>> {
    if dry_run || !config.enabled {
        tracing::info!(dry_run, enabled = config.enabled, "Report will be logged, not mailed");
        return Ok(Arc::new(LogNotifier::new()));
    }
    Ok(Arc::new(SmtpNotifier::from_config(config)?))
}
