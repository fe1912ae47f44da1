// ----- standard library imports
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
// ----- extra library imports
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
// ----- local imports
use crate::error::Result;
use crate::history::HistoryRepository;
use crate::seed::SeedRepository;
use crate::types::{InvoiceEntry, InvoiceStatus};

// ----- end imports

const MNEMONIC_KEY: &str = "cashu.mnemonic";
const INVOICE_HISTORY_KEY: &str = "cashu.invoiceHistory";
const KEYSET_COUNTERS_KEY: &str = "cashu.keysetCounters";
const OLD_MNEMONIC_COUNTERS_KEY: &str = "cashu.oldMnemonicCounters";

///////////////////////////////////////////// SnapshotStore
/// The host's key-value snapshot storage. Values are whole serialized blobs;
/// the engine never writes partial updates.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get(&self, key: String) -> Result<Option<String>>;
    async fn put(&self, key: String, value: String) -> Result<()>;
}

///////////////////////////////////////////// snapshot blobs
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeysetCounterBlob {
    id: String,
    counter: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OldMnemonicBlob {
    mnemonic: String,
    #[serde(rename = "keysetCounters")]
    keyset_counters: Vec<KeysetCounterBlob>,
}

fn counters_to_blobs(counters: &HashMap<cashu::Id, u32>) -> Vec<KeysetCounterBlob> {
    counters
        .iter()
        .map(|(id, counter)| KeysetCounterBlob {
            id: id.to_string(),
            counter: *counter,
        })
        .collect()
}

fn blobs_to_counters(blobs: Vec<KeysetCounterBlob>) -> HashMap<cashu::Id, u32> {
    blobs
        .into_iter()
        .filter_map(|blob| {
            cashu::Id::from_str(&blob.id)
                .ok()
                .map(|id| (id, blob.counter))
        })
        .collect()
}

///////////////////////////////////////////// SnapshotSeedRepository
/// Seed store over the snapshot keys `cashu.mnemonic`,
/// `cashu.keysetCounters` and `cashu.oldMnemonicCounters`.
pub struct SnapshotSeedRepository {
    store: Arc<dyn SnapshotStore>,
}

impl SnapshotSeedRepository {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    async fn counters(&self) -> Result<HashMap<cashu::Id, u32>> {
        let raw = self.store.get(KEYSET_COUNTERS_KEY.to_string()).await?;
        let Some(raw) = raw else {
            return Ok(HashMap::new());
        };
        Ok(blobs_to_counters(serde_json::from_str(&raw)?))
    }

    async fn write_counters(&self, counters: &HashMap<cashu::Id, u32>) -> Result<()> {
        let raw = serde_json::to_string(&counters_to_blobs(counters))?;
        self.store.put(KEYSET_COUNTERS_KEY.to_string(), raw).await
    }
}

#[async_trait]
impl SeedRepository for SnapshotSeedRepository {
    async fn load_mnemonic(&self) -> Result<Option<String>> {
        self.store.get(MNEMONIC_KEY.to_string()).await
    }

    async fn store_mnemonic(&self, phrase: String) -> Result<()> {
        self.store.put(MNEMONIC_KEY.to_string(), phrase).await
    }

    async fn load_counter(&self, kid: cashu::Id) -> Result<Option<u32>> {
        Ok(self.counters().await?.get(&kid).copied())
    }

    async fn store_counter(&self, kid: cashu::Id, value: u32) -> Result<()> {
        let mut counters = self.counters().await?;
        counters.insert(kid, value);
        self.write_counters(&counters).await
    }

    async fn load_counters(&self) -> Result<HashMap<cashu::Id, u32>> {
        self.counters().await
    }

    async fn clear_counters(&self) -> Result<()> {
        self.write_counters(&HashMap::new()).await
    }

    async fn archive_mnemonic(
        &self,
        phrase: String,
        counters: HashMap<cashu::Id, u32>,
    ) -> Result<()> {
        let raw = self
            .store
            .get(OLD_MNEMONIC_COUNTERS_KEY.to_string())
            .await?;
        let mut archive: Vec<OldMnemonicBlob> = match raw {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        archive.push(OldMnemonicBlob {
            mnemonic: phrase,
            keyset_counters: counters_to_blobs(&counters),
        });
        self.store
            .put(
                OLD_MNEMONIC_COUNTERS_KEY.to_string(),
                serde_json::to_string(&archive)?,
            )
            .await
    }
}

///////////////////////////////////////////// SnapshotHistoryRepository
/// Invoice history over the `cashu.invoiceHistory` snapshot key.
pub struct SnapshotHistoryRepository {
    store: Arc<dyn SnapshotStore>,
}

impl SnapshotHistoryRepository {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    async fn load(&self) -> Result<Vec<InvoiceEntry>> {
        let raw = self.store.get(INVOICE_HISTORY_KEY.to_string()).await?;
        let Some(raw) = raw else {
            return Ok(Vec::new());
        };
        Ok(serde_json::from_str(&raw)?)
    }

    async fn write(&self, entries: &[InvoiceEntry]) -> Result<()> {
        self.store
            .put(
                INVOICE_HISTORY_KEY.to_string(),
                serde_json::to_string(entries)?,
            )
            .await
    }
}

#[async_trait]
impl HistoryRepository for SnapshotHistoryRepository {
    async fn append(&self, entry: InvoiceEntry) -> Result<()> {
        let mut entries = self.load().await?;
        entries.retain(|e| e.quote != entry.quote);
        entries.push(entry);
        self.write(&entries).await
    }

    async fn entry(&self, quote: String) -> Result<Option<InvoiceEntry>> {
        Ok(self.load().await?.into_iter().find(|e| e.quote == quote))
    }

    async fn entries(&self) -> Result<Vec<InvoiceEntry>> {
        let mut entries = self.load().await?;
        entries.sort_by_key(|e| e.date);
        Ok(entries)
    }

    async fn by_bolt11(&self, bolt11: String) -> Result<Vec<InvoiceEntry>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|e| !bolt11.is_empty() && e.bolt11 == bolt11)
            .collect())
    }

    async fn by_token(&self, token: String) -> Result<Option<InvoiceEntry>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .find(|e| e.token.as_deref() == Some(token.as_str())))
    }

    async fn set_status(&self, quote: String, status: InvoiceStatus) -> Result<()> {
        let mut entries = self.load().await?;
        for entry in entries.iter_mut() {
            if entry.quote == quote {
                entry.status = status;
            }
        }
        self.write(&entries).await
    }

    async fn set_amount(&self, quote: String, amount: i64) -> Result<()> {
        let mut entries = self.load().await?;
        for entry in entries.iter_mut() {
            if entry.quote == quote {
                entry.amount = amount;
            }
        }
        self.write(&entries).await
    }

    async fn remove(&self, quote: String) -> Result<()> {
        let mut entries = self.load().await?;
        entries.retain(|e| e.quote != quote);
        self.write(&entries).await
    }
}
