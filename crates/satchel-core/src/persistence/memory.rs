// ----- standard library imports
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
// ----- extra library imports
use async_trait::async_trait;
use cashu::{MintUrl, nut00 as cdk00};
// ----- local imports
use crate::error::Result;
use crate::history::HistoryRepository;
use crate::proofs::{ProofRepository, Reservation};
use crate::seed::SeedRepository;
use crate::types::{InvoiceEntry, InvoiceStatus};

// ----- end imports

///////////////////////////////////////////// InMemorySeedRepository
#[derive(Default)]
pub struct InMemorySeedRepository {
    mnemonic: Arc<Mutex<Option<String>>>,
    counters: Arc<Mutex<HashMap<cashu::Id, u32>>>,
    archive: Arc<Mutex<Vec<(String, HashMap<cashu::Id, u32>)>>>,
}

impl InMemorySeedRepository {
    pub fn archived(&self) -> Vec<(String, HashMap<cashu::Id, u32>)> {
        self.archive.lock().unwrap().clone()
    }
}

#[async_trait]
impl SeedRepository for InMemorySeedRepository {
    async fn load_mnemonic(&self) -> Result<Option<String>> {
        Ok(self.mnemonic.lock().unwrap().clone())
    }
    async fn store_mnemonic(&self, phrase: String) -> Result<()> {
        *self.mnemonic.lock().unwrap() = Some(phrase);
        Ok(())
    }
    async fn load_counter(&self, kid: cashu::Id) -> Result<Option<u32>> {
        Ok(self.counters.lock().unwrap().get(&kid).copied())
    }
    async fn store_counter(&self, kid: cashu::Id, value: u32) -> Result<()> {
        self.counters.lock().unwrap().insert(kid, value);
        Ok(())
    }
    async fn load_counters(&self) -> Result<HashMap<cashu::Id, u32>> {
        Ok(self.counters.lock().unwrap().clone())
    }
    async fn clear_counters(&self) -> Result<()> {
        self.counters.lock().unwrap().clear();
        Ok(())
    }
    async fn archive_mnemonic(
        &self,
        phrase: String,
        counters: HashMap<cashu::Id, u32>,
    ) -> Result<()> {
        self.archive.lock().unwrap().push((phrase, counters));
        Ok(())
    }
}

///////////////////////////////////////////// InMemoryProofRepository
#[derive(Default)]
pub struct InMemoryProofRepository {
    // proofs per mint, keyed by secret
    proofs: Arc<Mutex<HashMap<MintUrl, HashMap<String, (cdk00::Proof, Reservation)>>>>,
}

#[async_trait]
impl ProofRepository for InMemoryProofRepository {
    async fn add(&self, mint: MintUrl, proofs: Vec<cdk00::Proof>) -> Result<()> {
        let mut store = self.proofs.lock().unwrap();
        let entry = store.entry(mint).or_default();
        for proof in proofs {
            // same secret replaces, an idempotent refresh
            entry.insert(proof.secret.to_string(), (proof, Reservation::Available));
        }
        Ok(())
    }

    async fn remove(&self, mint: MintUrl, proofs: Vec<cdk00::Proof>) -> Result<()> {
        let mut store = self.proofs.lock().unwrap();
        if let Some(entry) = store.get_mut(&mint) {
            for proof in proofs {
                entry.remove(&proof.secret.to_string());
            }
        }
        Ok(())
    }

    async fn set_reservation(
        &self,
        mint: MintUrl,
        proofs: Vec<cdk00::Proof>,
        reservation: Reservation,
    ) -> Result<()> {
        let mut store = self.proofs.lock().unwrap();
        if let Some(entry) = store.get_mut(&mint) {
            for proof in proofs {
                if let Some(slot) = entry.get_mut(&proof.secret.to_string()) {
                    slot.1 = reservation.clone();
                }
            }
        }
        Ok(())
    }

    async fn unreserved(&self, mint: MintUrl) -> Result<Vec<cdk00::Proof>> {
        let store = self.proofs.lock().unwrap();
        Ok(store
            .get(&mint)
            .map(|entry| {
                entry
                    .values()
                    .filter(|(_, r)| !r.is_reserved())
                    .map(|(p, _)| p.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn reserved_for_quote(&self, mint: MintUrl, quote: String) -> Result<Vec<cdk00::Proof>> {
        let store = self.proofs.lock().unwrap();
        Ok(store
            .get(&mint)
            .map(|entry| {
                entry
                    .values()
                    .filter(|(_, r)| matches!(r, Reservation::Reserved(Some(q)) if *q == quote))
                    .map(|(p, _)| p.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn all(&self, mint: MintUrl) -> Result<Vec<cdk00::Proof>> {
        let store = self.proofs.lock().unwrap();
        Ok(store
            .get(&mint)
            .map(|entry| entry.values().map(|(p, _)| p.clone()).collect())
            .unwrap_or_default())
    }
}

///////////////////////////////////////////// InMemoryHistoryRepository
#[derive(Default)]
pub struct InMemoryHistoryRepository {
    entries: Arc<Mutex<Vec<InvoiceEntry>>>,
}

#[async_trait]
impl HistoryRepository for InMemoryHistoryRepository {
    async fn append(&self, entry: InvoiceEntry) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|e| e.quote != entry.quote);
        entries.push(entry);
        Ok(())
    }
    async fn entry(&self, quote: String) -> Result<Option<InvoiceEntry>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.iter().find(|e| e.quote == quote).cloned())
    }
    async fn entries(&self) -> Result<Vec<InvoiceEntry>> {
        let mut entries = self.entries.lock().unwrap().clone();
        entries.sort_by_key(|e| e.date);
        Ok(entries)
    }
    async fn by_bolt11(&self, bolt11: String) -> Result<Vec<InvoiceEntry>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|e| !bolt11.is_empty() && e.bolt11 == bolt11)
            .cloned()
            .collect())
    }
    async fn by_token(&self, token: String) -> Result<Option<InvoiceEntry>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .iter()
            .find(|e| e.token.as_deref() == Some(token.as_str()))
            .cloned())
    }
    async fn set_status(&self, quote: String, status: InvoiceStatus) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        for entry in entries.iter_mut() {
            if entry.quote == quote {
                entry.status = status;
            }
        }
        Ok(())
    }
    async fn set_amount(&self, quote: String, amount: i64) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        for entry in entries.iter_mut() {
            if entry.quote == quote {
                entry.amount = amount;
            }
        }
        Ok(())
    }
    async fn remove(&self, quote: String) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|e| e.quote != quote);
        Ok(())
    }
}
