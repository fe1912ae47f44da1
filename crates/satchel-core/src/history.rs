// ----- standard library imports
// ----- extra library imports
use async_trait::async_trait;
// ----- local imports
use crate::error::Result;
use crate::types::{InvoiceEntry, InvoiceStatus};

// ----- end imports

///////////////////////////////////////////// HistoryRepository
/// Append-only invoice/token history. Entries are keyed by `quote`; the only
/// permitted mutations are status transitions and amount finalization on melt
/// completion. Appending an entry with an existing quote replaces it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn append(&self, entry: InvoiceEntry) -> Result<()>;
    async fn entry(&self, quote: String) -> Result<Option<InvoiceEntry>>;
    async fn entries(&self) -> Result<Vec<InvoiceEntry>>;
    async fn by_bolt11(&self, bolt11: String) -> Result<Vec<InvoiceEntry>>;
    async fn by_token(&self, token: String) -> Result<Option<InvoiceEntry>>;
    async fn set_status(&self, quote: String, status: InvoiceStatus) -> Result<()>;
    async fn set_amount(&self, quote: String, amount: i64) -> Result<()>;
    async fn remove(&self, quote: String) -> Result<()>;
}
