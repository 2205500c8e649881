//! Notification sink boundary
//!
//! Delivery is best-effort and runs after the atomic commit: a failure is
//! logged and never rolls back or retries the financial transition. The
//! production sink (a messaging bot in deployment) lives behind this trait;
//! the default just writes to the log.

use async_trait::async_trait;
use tracing::info;

use rekber_types::UserId;

/// Best-effort user notification
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, user: UserId, text: &str) -> anyhow::Result<()>;
}

/// Sink that logs instead of delivering
#[derive(Debug, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn notify(&self, user: UserId, text: &str) -> anyhow::Result<()> {
        info!(user = %user, text, "notification");
        Ok(())
    }
}
