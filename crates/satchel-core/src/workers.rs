// ----- standard library imports
// ----- extra library imports
use async_trait::async_trait;
// ----- local imports
use crate::error::Result;

// ----- end imports

///////////////////////////////////////////// WorkQueue
/// Host-side background scheduler. The engine only enqueues; when a mint has
/// no usable NUT-17 websocket the host polls `check_invoice` /
/// `check_token_spendable` from these queues on its own cadence.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn enqueue_invoice_check(&self, quote_id: String) -> Result<()>;
    async fn enqueue_token_spend_check(&self, token: String) -> Result<()>;
}

/// Drops every request; for hosts that poll on their own.
#[derive(Debug, Default, Clone)]
pub struct NoopWorkQueue;

#[async_trait]
impl WorkQueue for NoopWorkQueue {
    async fn enqueue_invoice_check(&self, quote_id: String) -> Result<()> {
        tracing::debug!("no work queue configured, dropping invoice check for {quote_id}");
        Ok(())
    }

    async fn enqueue_token_spend_check(&self, _token: String) -> Result<()> {
        tracing::debug!("no work queue configured, dropping token spend check");
        Ok(())
    }
}
