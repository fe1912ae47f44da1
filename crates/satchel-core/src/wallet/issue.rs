// ----- standard library imports
// ----- extra library imports
use cashu::{Amount, amount::SplitTarget, nut00 as cdk00, nut23 as cdk23};
// ----- local imports
use crate::client::{MintBolt11Request, MintConnector as _};
use crate::error::{Error, Result};
use crate::history::HistoryRepository as _;
use crate::proofs::ProofRepository as _;
use crate::seed::COUNTER_RESYNC_JUMP;
use crate::types::{InvoiceEntry, InvoiceStatus};
use crate::wallet::{Wallet, unblind_proofs};
use crate::workers::WorkQueue as _;
use crate::ws;

// ----- end imports

impl Wallet {
    /// Asks the active mint for a Lightning invoice worth `amount` and
    /// records the pending incoming entry.
    pub async fn request_mint_quote(
        &self,
        amount: Amount,
    ) -> Result<cdk23::MintQuoteBolt11Response<String>> {
        let mint = self.registry.active_mint();
        let unit = self.registry.active_unit();
        let request = cdk23::MintQuoteBolt11Request {
            amount,
            unit: unit.clone(),
            description: None,
            pubkey: None,
        };
        let response = self.client.post_mint_quote(mint.clone(), request).await?;
        self.history
            .append(InvoiceEntry::new_incoming(
                amount,
                response.request.clone(),
                response.quote.clone(),
                mint,
                unit,
            ))
            .await?;
        tracing::info!("mint quote {} for {amount}", response.quote);
        Ok(response)
    }

    /// Executes the blinded mint for a PAID quote. Outputs derive from the
    /// keyset counter; the counter advances by the number of proofs actually
    /// issued, or jumps ahead when the mint reports the outputs as already
    /// signed.
    pub async fn mint(&self, amount: Amount, quote_id: &str) -> Result<Vec<cdk00::Proof>> {
        let _guard = self.op_lock.lock().await;
        let mint = self.registry.active_mint();

        let status = self
            .client
            .get_mint_quote_status(mint.clone(), quote_id.to_string())
            .await?;
        match status.state {
            cdk23::QuoteState::Unpaid => {
                return Err(Error::InvoiceNotPaidYet(quote_id.to_string()));
            }
            cdk23::QuoteState::Issued => {
                return Err(Error::QuoteAlreadyPaid(quote_id.to_string()));
            }
            cdk23::QuoteState::Paid => {}
        }

        let (info, keyset) = self.keyset_for(&mint).await?;
        let seed = self.seed.seed().await?;
        let counter = self.seed.counter(info.id).await?;
        let premint =
            cdk00::PreMintSecrets::from_seed(info.id, counter, &seed, amount, &SplitTarget::None)?;

        let request = MintBolt11Request {
            quote: quote_id.to_string(),
            outputs: premint.blinded_messages(),
        };
        let response = match self.client.post_mint(mint.clone(), request).await {
            Ok(response) => response,
            Err(Error::OutputsAlreadySigned) => {
                self.seed.bump_counter(info.id, COUNTER_RESYNC_JUMP).await?;
                return Err(Error::OutputsAlreadySigned);
            }
            Err(err) => return Err(err),
        };

        let proofs = unblind_proofs(&keyset, &response.signatures, &premint);
        self.seed.bump_counter(info.id, proofs.len() as i64).await?;
        self.proofs.add(mint.clone(), proofs.clone()).await?;
        self.history
            .set_status(quote_id.to_string(), InvoiceStatus::Paid)
            .await?;
        self.history
            .append(InvoiceEntry::new_token(
                u64::from(crate::proofs::sum_proofs(&proofs)) as i64,
                crate::proofs::serialize_proofs(
                    mint.clone(),
                    self.registry.active_unit(),
                    proofs.clone(),
                ),
                InvoiceStatus::Paid,
                mint,
                self.registry.active_unit(),
            ))
            .await?;
        tracing::info!("minted {} proofs for quote {quote_id}", proofs.len());
        Ok(proofs)
    }

    /// Polling check for an incoming quote; mints when the invoice got paid.
    pub async fn check_invoice(&self, quote_id: &str) -> Result<Vec<cdk00::Proof>> {
        let entry = self
            .history
            .entry(quote_id.to_string())
            .await?
            .ok_or_else(|| Error::EntryNotFound(quote_id.to_string()))?;
        if entry.status == InvoiceStatus::Paid {
            return Err(Error::QuoteAlreadyPaid(quote_id.to_string()));
        }
        let amount = Amount::from(entry.amount.unsigned_abs());
        self.mint(amount, quote_id).await
    }

    /// Waits for the mint to report the quote paid. Prefers a NUT-17
    /// `bolt11_mint_quote` subscription; without one the polling worker is
    /// enqueued and this returns immediately.
    pub async fn mint_on_paid(&self, quote_id: &str) -> Result<()> {
        let mint = self.registry.active_mint();
        let unit = self.registry.active_unit();
        self.ensure_keysets(&mint).await?;
        let info = self.registry.info(&mint);
        if !info.supports_ws("bolt11", &unit, "bolt11_mint_quote") {
            return self
                .workers
                .enqueue_invoice_check(quote_id.to_string())
                .await;
        }
        let subscription =
            ws::subscribe(&mint, ws::SubscriptionKind::Bolt11MintQuote, vec![
                quote_id.to_string(),
            ])
            .await;
        let mut subscription = match subscription {
            Ok(subscription) => subscription,
            Err(err) => {
                tracing::warn!("mint quote subscription failed, polling instead: {err}");
                return self
                    .workers
                    .enqueue_invoice_check(quote_id.to_string())
                    .await;
            }
        };
        while let Some(payload) = subscription.next().await {
            match ws::payload_state(&payload).as_deref() {
                Some("PAID") => {
                    let result = self.check_invoice(quote_id).await;
                    if let Err(err) = &result {
                        tracing::warn!("mint after paid notification failed: {err}");
                    }
                    subscription.unsubscribe().await;
                    return result.map(|_| ());
                }
                Some("ISSUED") => {
                    subscription.unsubscribe().await;
                    return Ok(());
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils as fixtures;
    use crate::wallet::test_support::{Mocks, keyset_response};
    use mockall::predicate::*;

    fn expect_keysets(mocks: &mut Mocks, fee_ppk: u64) {
        let info = fixtures::keyset_info(fee_ppk);
        mocks
            .client
            .expect_get_mint_keysets()
            .returning(move |_| Ok(keyset_response(vec![fixtures::keyset_info(fee_ppk)])));
        mocks
            .client
            .expect_get_mint_info()
            .returning(|_| Ok(crate::client::MintInfo::default()));
        let keyset = fixtures::keyset();
        mocks
            .client
            .expect_get_mint_keyset()
            .with(always(), eq(info.id))
            .returning(move |_, _| Ok(keyset.clone()));
    }

    #[tokio::test]
    async fn request_mint_quote_records_pending_entry() {
        let mut mocks = Mocks::default();
        mocks
            .client
            .expect_post_mint_quote()
            .times(1)
            .returning(|_, request| {
                assert_eq!(request.amount, Amount::from(100u64));
                Ok(fixtures::mint_quote_response("Q1", "lnbc100n1...", "UNPAID"))
            });
        mocks
            .history
            .expect_append()
            .times(1)
            .withf(|entry| {
                entry.amount == 100
                    && entry.quote == "Q1"
                    && entry.status == InvoiceStatus::Pending
            })
            .returning(|_| Ok(()));
        let wallet = mocks.wallet();
        let quote = wallet.request_mint_quote(Amount::from(100u64)).await.unwrap();
        assert_eq!(quote.quote, "Q1");
    }

    #[tokio::test]
    async fn mint_fails_while_unpaid() {
        let mut mocks = Mocks::default();
        mocks
            .client
            .expect_get_mint_quote_status()
            .times(1)
            .returning(|_, _| Ok(fixtures::mint_quote_response("Q1", "lnbc1...", "UNPAID")));
        let wallet = mocks.wallet();
        let err = wallet.mint(Amount::from(100u64), "Q1").await.unwrap_err();
        assert!(matches!(err, Error::InvoiceNotPaidYet(_)));
    }

    #[tokio::test]
    async fn mint_issues_deterministic_proofs() {
        let mut mocks = Mocks::default();
        expect_keysets(&mut mocks, 0);
        mocks
            .client
            .expect_get_mint_quote_status()
            .times(1)
            .returning(|_, _| Ok(fixtures::mint_quote_response("Q1", "lnbc1...", "PAID")));
        mocks
            .client
            .expect_post_mint()
            .times(1)
            .returning(|_, request| {
                assert_eq!(request.quote, "Q1");
                // 100 = 4 + 32 + 64
                let amounts: Vec<u64> = request
                    .outputs
                    .iter()
                    .map(|b| u64::from(b.amount))
                    .collect();
                assert_eq!(amounts, vec![4, 32, 64]);
                Ok(crate::client::MintBolt11Response {
                    signatures: fixtures::sigs_for_outputs(&request.outputs),
                })
            });
        mocks
            .proofs
            .expect_add()
            .times(1)
            .withf(|_, proofs| {
                crate::proofs::sum_proofs(proofs) == Amount::from(100u64) && proofs.len() == 3
            })
            .returning(|_, _| Ok(()));
        mocks
            .history
            .expect_set_status()
            .times(1)
            .with(eq("Q1".to_string()), eq(InvoiceStatus::Paid))
            .returning(|_, _| Ok(()));
        mocks
            .history
            .expect_append()
            .times(1)
            .withf(|entry| entry.amount == 100 && entry.token.is_some())
            .returning(|_| Ok(()));

        let wallet = mocks.wallet();
        let proofs = wallet.mint(Amount::from(100u64), "Q1").await.unwrap();
        assert_eq!(proofs.len(), 3);
        // counter: starts at 1, bumped by the 3 issued proofs
        assert_eq!(wallet.seed.counter(fixtures::kid()).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn mint_outputs_already_signed_jumps_counter() {
        let mut mocks = Mocks::default();
        expect_keysets(&mut mocks, 0);
        mocks
            .client
            .expect_get_mint_quote_status()
            .times(1)
            .returning(|_, _| Ok(fixtures::mint_quote_response("Q1", "lnbc1...", "PAID")));
        mocks
            .client
            .expect_post_mint()
            .times(1)
            .returning(|_, _| Err(Error::OutputsAlreadySigned));

        let wallet = mocks.wallet();
        let before = wallet.seed.counter(fixtures::kid()).await.unwrap();
        let err = wallet.mint(Amount::from(100u64), "Q1").await.unwrap_err();
        assert!(matches!(err, Error::OutputsAlreadySigned));
        let after = wallet.seed.counter(fixtures::kid()).await.unwrap();
        assert_eq!(after, before + 10);
    }

    #[tokio::test]
    async fn mint_on_paid_without_ws_enqueues_polling() {
        let mut mocks = Mocks::default();
        expect_keysets(&mut mocks, 0);
        mocks
            .workers
            .expect_enqueue_invoice_check()
            .times(1)
            .with(eq("Q1".to_string()))
            .returning(|_| Ok(()));
        let wallet = mocks.wallet();
        wallet.mint_on_paid("Q1").await.unwrap();
    }
}
