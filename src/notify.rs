//! Outbound notifications
//!
//! The mail subsystem is an external collaborator; the refinery only
//! needs a send operation. The default implementation logs instead of
//! delivering, which is also the degraded behavior when no mail
//! transport is wired up.

use crate::error::Result;
use async_trait::async_trait;
use tracing::info;

/// Destination-agnostic notification sender
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a message to one recipient. Best-effort callers log failures
    /// and continue.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Notifier that records intent in the log stream
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        info!(to, subject, body, "notification");
        Ok(())
    }
}
