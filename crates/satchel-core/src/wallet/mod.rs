// ----- standard library imports
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
// ----- extra library imports
use cashu::{Amount, CurrencyUnit, KeySet, KeySetInfo, MintUrl, nut00 as cdk00};
use tokio::sync::Mutex as AsyncMutex;
// ----- local imports
use crate::client::MintConnector;
use crate::decode::{IncomingRequest, LnurlConnector, RequestDecoder};
use crate::error::{Error, Result};
use crate::history::HistoryRepository;
use crate::proofs::{ProofRepository, sum_proofs};
use crate::registry::MintRegistry;
use crate::seed::{SeedRepository, SeedStore};
use crate::types::PaySession;
use crate::workers::WorkQueue;
// ----- local modules
mod issue;
mod pay;
mod reconcile;
mod restore;
#[cfg(test)]
mod scenarios;
mod send;

pub use pay::MeltResult;
pub use send::SendResult;

// ----- end imports

///////////////////////////////////////////// SessionLatch
/// Scoped `blocking` flag on the pay session: taken while a quote request is
/// in flight, released on drop whatever the outcome.
pub struct SessionLatch<'a> {
    session: &'a StdMutex<PaySession>,
}

impl Drop for SessionLatch<'_> {
    fn drop(&mut self) {
        self.session.lock().unwrap().blocking = false;
    }
}

///////////////////////////////////////////// Wallet
/// The wallet engine. Collaborators come in as trait objects; all proof and
/// counter mutations run under the single engine mutex, quote requests are
/// serialized by the session latch instead.
pub struct Wallet {
    pub(crate) client: Arc<dyn MintConnector>,
    pub(crate) proofs: Arc<dyn ProofRepository>,
    pub(crate) history: Arc<dyn HistoryRepository>,
    pub(crate) seed: SeedStore,
    pub(crate) registry: MintRegistry,
    pub(crate) workers: Arc<dyn WorkQueue>,
    pub(crate) decoder: RequestDecoder,
    pub(crate) session: StdMutex<PaySession>,
    pub(crate) op_lock: AsyncMutex<()>,
    pub(crate) unloading: AtomicBool,
}

impl Wallet {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<dyn MintConnector>,
        proofs: Arc<dyn ProofRepository>,
        history: Arc<dyn HistoryRepository>,
        seed_db: Arc<dyn SeedRepository>,
        workers: Arc<dyn WorkQueue>,
        lnurl: Arc<dyn LnurlConnector>,
        mint_url: MintUrl,
        unit: CurrencyUnit,
    ) -> Self {
        Self {
            client,
            proofs,
            history,
            seed: SeedStore::new(seed_db),
            registry: MintRegistry::new(mint_url, unit),
            workers,
            decoder: RequestDecoder::new(lnurl),
            session: StdMutex::new(PaySession::default()),
            op_lock: AsyncMutex::new(()),
            unloading: AtomicBool::new(false),
        }
    }

    /// Pre-exit hook: suppresses melt rollback so an interrupted payment
    /// cannot burn reserved proofs.
    pub fn set_unloading(&self, unloading: bool) {
        self.unloading.store(unloading, Ordering::SeqCst);
    }

    pub(crate) fn is_unloading(&self) -> bool {
        self.unloading.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> &MintRegistry {
        &self.registry
    }

    /// Spendable (unreserved) balance on the active mint.
    pub async fn balance(&self) -> Result<Amount> {
        let mint = self.registry.active_mint();
        let unreserved = self.proofs.unreserved(mint).await?;
        Ok(sum_proofs(&unreserved))
    }

    /// Classifies a pasted/scanned string. BOLT-11 and LNURL results are
    /// parked on the pay session for the quote flows that follow.
    pub async fn decode_request(&self, input: &str) -> Result<IncomingRequest> {
        let request = self.decoder.decode(input).await?;
        match &request {
            IncomingRequest::Bolt11(invoice) => {
                let mut session = self.session.lock().unwrap();
                session.reset();
                session.invoice = Some(invoice.clone());
            }
            IncomingRequest::LnurlPay(data) => {
                let mut session = self.session.lock().unwrap();
                session.reset();
                session.lnurl = Some(data.clone());
            }
            _ => {}
        }
        Ok(request)
    }

    /// Last quote error parked on the session, for display.
    pub fn session_error(&self) -> Option<String> {
        self.session.lock().unwrap().error.clone()
    }

    pub(crate) fn acquire_latch(&self) -> Result<SessionLatch<'_>> {
        let mut session = self.session.lock().unwrap();
        if session.blocking {
            return Err(Error::AlreadyProcessingQuote);
        }
        session.blocking = true;
        Ok(SessionLatch {
            session: &self.session,
        })
    }

    pub(crate) fn latch_engaged(&self) -> bool {
        self.session.lock().unwrap().blocking
    }

    /// Cached keysets for `mint`, fetching keysets and info together on
    /// first contact.
    pub(crate) async fn ensure_keysets(&self, mint: &MintUrl) -> Result<Vec<KeySetInfo>> {
        let cached = self.registry.keysets(mint);
        if !cached.is_empty() {
            return Ok(cached);
        }
        let keysets = self.client.get_mint_keysets(mint.clone()).await?.keysets;
        let info = self
            .client
            .get_mint_info(mint.clone())
            .await
            .unwrap_or_default();
        self.registry
            .update_mint(mint.clone(), keysets.clone(), info);
        Ok(keysets)
    }

    /// Active-unit keyset of `mint` plus its signing keys.
    pub(crate) async fn keyset_for(&self, mint: &MintUrl) -> Result<(KeySetInfo, KeySet)> {
        let keysets = self.ensure_keysets(mint).await?;
        let info = crate::registry::select_keyset(&keysets, &self.registry.active_unit())?;
        let keyset = self.client.get_mint_keyset(mint.clone(), info.id).await?;
        Ok((info, keyset))
    }
}

///////////////////////////////////////////// unblind_proofs
/// Unblinds mint signatures against the premint secrets that produced them.
/// Mismatched keyset ids or amounts are dropped with an error log instead of
/// poisoning the whole batch.
pub(crate) fn unblind_proofs(
    keyset: &KeySet,
    signatures: &[cdk00::BlindSignature],
    premint: &cdk00::PreMintSecrets,
) -> Vec<cdk00::Proof> {
    let mut proofs: Vec<cdk00::Proof> = Vec::new();
    if signatures.len() > premint.len() {
        tracing::error!(
            "more signatures than premint secrets: {} > {}",
            signatures.len(),
            premint.len()
        );
    }
    for (signature, secret) in signatures.iter().zip(premint.iter()) {
        if signature.keyset_id != keyset.id || signature.keyset_id != premint.keyset_id {
            tracing::error!(
                "keyset id mismatch in signature: {}, {}, {}",
                signature.keyset_id,
                keyset.id,
                premint.keyset_id,
            );
            continue;
        }
        if secret.amount != Amount::ZERO && signature.amount != secret.amount {
            tracing::error!(
                "amount mismatch in signature: {} != {}",
                signature.amount,
                secret.amount
            );
            continue;
        }
        let Some(key) = keyset.keys.get(&signature.amount) else {
            tracing::error!(
                "no mint key for amount {} in keyset {}",
                signature.amount,
                keyset.id,
            );
            continue;
        };
        let result = cashu::dhke::unblind_message(&signature.c, &secret.r, key);
        let Ok(c) = result else {
            tracing::error!(
                "unblind_message failed: keyset {}, amount {}",
                keyset.id,
                signature.amount,
            );
            continue;
        };
        proofs.push(cdk00::Proof::new(
            signature.amount,
            signature.keyset_id,
            secret.secret.clone(),
            c,
        ));
    }
    proofs
}
