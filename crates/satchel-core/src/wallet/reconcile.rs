// ----- standard library imports
use std::collections::HashSet;
// ----- extra library imports
use cashu::{nut00 as cdk00, nut07 as cdk07};
// ----- local imports
use crate::client::MintConnector as _;
use crate::error::{Error, Result};
use crate::history::HistoryRepository as _;
use crate::proofs::{ProofRepository as _, serialize_proofs, sum_proofs};
use crate::types::{InvoiceEntry, InvoiceStatus};
use crate::wallet::Wallet;
use crate::workers::WorkQueue as _;
use crate::ws;

// ----- end imports

impl Wallet {
    /// Asks the active mint which of `proofs` are spent (by their
    /// `Y = hash_to_curve(secret)` fingerprint), drops the spent ones from
    /// the store and optionally books them into history. Running it twice on
    /// the same inputs leaves the store unchanged the second time.
    pub async fn check_proofs_spendable(
        &self,
        proofs: Vec<cdk00::Proof>,
        update_history: bool,
    ) -> Result<Vec<cdk00::Proof>> {
        if proofs.is_empty() {
            return Ok(Vec::new());
        }
        let mint = self.registry.active_mint();
        let mut ys = Vec::with_capacity(proofs.len());
        for proof in &proofs {
            ys.push(proof.y()?);
        }
        let request = cdk07::CheckStateRequest { ys: ys.clone() };
        let response = self.client.post_check_state(mint.clone(), request).await?;

        let spent_ys: HashSet<String> = response
            .states
            .iter()
            .filter(|s| s.state == cdk07::State::Spent)
            .map(|s| s.y.to_string())
            .collect();
        let spent: Vec<cdk00::Proof> = proofs
            .into_iter()
            .zip(ys)
            .filter(|(_, y)| spent_ys.contains(&y.to_string()))
            .map(|(proof, _)| proof)
            .collect();
        if spent.is_empty() {
            return Ok(spent);
        }

        self.proofs.remove(mint.clone(), spent.clone()).await?;
        if update_history {
            let amount = sum_proofs(&spent);
            self.history
                .append(InvoiceEntry::new_token(
                    -(u64::from(amount) as i64),
                    serialize_proofs(mint.clone(), self.registry.active_unit(), spent.clone()),
                    InvoiceStatus::Paid,
                    mint,
                    self.registry.active_unit(),
                ))
                .await?;
        }
        tracing::info!("{} proofs found spent", spent.len());
        Ok(spent)
    }

    /// Re-checks a previously sent token. Fully spent marks its history
    /// entry paid; partially spent splits the entry into a paid part and a
    /// fresh pending part carrying the unspent remainder, keeping the sign
    /// of the original amount.
    pub async fn check_token_spendable(&self, token: &str) -> Result<bool> {
        let parsed = crate::proofs::deserialize_token(token)?;
        let mint = parsed.mint_url()?;
        self.registry.activate_mint(mint.clone(), None);
        let keysets = self.ensure_keysets(&mint).await?;
        let proofs = crate::proofs::token_proofs(&parsed, &keysets)?;
        let total = sum_proofs(&proofs);
        let proofs_len = proofs.len();

        let spent = self.check_proofs_spendable(proofs.clone(), false).await?;
        if spent.is_empty() {
            return Ok(false);
        }
        let Some(entry) = self.history.by_token(token.to_string()).await? else {
            tracing::warn!("spent token has no history entry");
            return Ok(spent.len() == proofs_len);
        };

        if spent.len() == proofs_len {
            self.history
                .set_status(entry.quote.clone(), InvoiceStatus::Paid)
                .await?;
            return Ok(true);
        }

        // partial spend: the entry splits, the sign survives
        let sign = if entry.amount < 0 { -1i64 } else { 1i64 };
        let spent_amount = u64::from(sum_proofs(&spent)) as i64;
        let unspent: Vec<cdk00::Proof> = {
            let spent_secrets: HashSet<String> =
                spent.iter().map(|p| p.secret.to_string()).collect();
            proofs
                .into_iter()
                .filter(|p| !spent_secrets.contains(&p.secret.to_string()))
                .collect()
        };
        let unspent_amount = u64::from(total) as i64 - spent_amount;

        self.history.remove(entry.quote.clone()).await?;
        let mut paid_part = entry.clone();
        paid_part.amount = sign * spent_amount;
        paid_part.status = InvoiceStatus::Paid;
        self.history.append(paid_part).await?;

        let pending_token = serialize_proofs(mint.clone(), self.registry.active_unit(), unspent);
        let mut pending_part = InvoiceEntry::new_token(
            sign * unspent_amount,
            pending_token,
            InvoiceStatus::Pending,
            mint,
            self.registry.active_unit(),
        );
        pending_part.memo = entry.memo;
        self.history.append(pending_part).await?;
        Ok(false)
    }

    /// Watches a sent token until it is spent. With NUT-17 `proof_state`
    /// support one representative proof is subscribed; otherwise the polling
    /// worker takes over.
    pub async fn on_token_paid(&self, token: &str) -> Result<()> {
        let parsed = crate::proofs::deserialize_token(token)?;
        let mint = parsed.mint_url()?;
        let keysets = self.ensure_keysets(&mint).await?;
        let unit = self.registry.active_unit();
        let info = self.registry.info(&mint);
        if !info.supports_ws("bolt11", &unit, "proof_state") {
            return self.workers.enqueue_token_spend_check(token.to_string()).await;
        }
        let proofs = crate::proofs::token_proofs(&parsed, &keysets)?;
        let Some(first) = proofs.first() else {
            return Err(Error::DecodeFailed("token carries no proofs".into()));
        };
        let y = first.y()?.to_string();
        let subscription = ws::subscribe(&mint, ws::SubscriptionKind::ProofState, vec![y]).await;
        let mut subscription = match subscription {
            Ok(subscription) => subscription,
            Err(err) => {
                tracing::warn!("proof state subscription failed, polling instead: {err}");
                return self.workers.enqueue_token_spend_check(token.to_string()).await;
            }
        };
        while let Some(payload) = subscription.next().await {
            if ws::payload_state(&payload).as_deref() == Some("SPENT") {
                let result = self.check_token_spendable(token).await;
                subscription.unsubscribe().await;
                return result.map(|_| ());
            }
        }
        Ok(())
    }
}
