// ----- standard library imports
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
// ----- extra library imports
use async_trait::async_trait;
use bip39::Mnemonic;
use bitcoin::bip32 as btc32;
// ----- local imports
use crate::error::Result;

// ----- end imports

/// counter jump applied when the mint reports outputs already signed
pub const COUNTER_RESYNC_JUMP: i64 = 10;

///////////////////////////////////////////// SeedRepository
/// Persistence for the mnemonic and the per-keyset derivation counters.
/// Rotated mnemonics are archived together with their frozen counters so old
/// proofs stay recoverable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SeedRepository: Send + Sync {
    async fn load_mnemonic(&self) -> Result<Option<String>>;
    async fn store_mnemonic(&self, phrase: String) -> Result<()>;
    async fn load_counter(&self, kid: cashu::Id) -> Result<Option<u32>>;
    async fn store_counter(&self, kid: cashu::Id, value: u32) -> Result<()>;
    async fn load_counters(&self) -> Result<HashMap<cashu::Id, u32>>;
    async fn clear_counters(&self) -> Result<()>;
    async fn archive_mnemonic(
        &self,
        phrase: String,
        counters: HashMap<cashu::Id, u32>,
    ) -> Result<()>;
}

///////////////////////////////////////////// SeedStore
pub struct SeedStore {
    db: Arc<dyn SeedRepository>,
}

impl SeedStore {
    pub fn new(db: Arc<dyn SeedRepository>) -> Self {
        Self { db }
    }

    /// Returns the active mnemonic, generating one on first use only. A
    /// generated phrase is persisted before it is returned and never
    /// silently overwritten afterwards.
    pub async fn get_or_create_mnemonic(&self) -> Result<Mnemonic> {
        if let Some(phrase) = self.db.load_mnemonic().await? {
            return Ok(Mnemonic::from_str(&phrase)?);
        }
        let mnemonic = Mnemonic::generate(12)?;
        self.db.store_mnemonic(mnemonic.to_string()).await?;
        tracing::info!("generated new wallet mnemonic");
        Ok(mnemonic)
    }

    /// BIP-39 seed of the active mnemonic.
    pub async fn seed(&self) -> Result<[u8; 64]> {
        let mnemonic = self.get_or_create_mnemonic().await?;
        Ok(mnemonic.to_seed(""))
    }

    /// BIP-32 master key used for NUT-13 derivation.
    pub async fn xpriv(&self) -> Result<btc32::Xpriv> {
        let seed = self.seed().await?;
        Ok(btc32::Xpriv::new_master(bitcoin::Network::Bitcoin, &seed)?)
    }

    /// Current derivation counter for a keyset. A keyset seen for the first
    /// time gets counter 1.
    pub async fn counter(&self, kid: cashu::Id) -> Result<u32> {
        if let Some(value) = self.db.load_counter(kid).await? {
            return Ok(value);
        }
        self.db.store_counter(kid, 1).await?;
        Ok(1)
    }

    /// Adds `delta` to the keyset counter. Negative deltas roll back
    /// speculative bumps; the result is clamped at 0.
    pub async fn bump_counter(&self, kid: cashu::Id, delta: i64) -> Result<u32> {
        let current = self.db.load_counter(kid).await?.unwrap_or_default();
        let bumped = (current as i64).saturating_add(delta).max(0) as u32;
        self.db.store_counter(kid, bumped).await?;
        tracing::debug!("counter {kid}: {current} -> {bumped}");
        Ok(bumped)
    }

    /// Archives the current mnemonic with its counters, clears the counters
    /// and generates a fresh mnemonic.
    pub async fn rotate_mnemonic(&self) -> Result<Mnemonic> {
        let old = self.get_or_create_mnemonic().await?;
        let counters = self.db.load_counters().await?;
        self.db.archive_mnemonic(old.to_string(), counters).await?;
        self.db.clear_counters().await?;
        let fresh = Mnemonic::generate(12)?;
        self.db.store_mnemonic(fresh.to_string()).await?;
        tracing::info!("rotated wallet mnemonic");
        Ok(fresh)
    }
}
