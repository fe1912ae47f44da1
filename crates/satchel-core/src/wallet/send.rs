// ----- standard library imports
// ----- extra library imports
use cashu::{Amount, MintUrl, amount::SplitTarget, nut00 as cdk00, nut03 as cdk03};
// ----- local imports
use crate::client::MintConnector as _;
use crate::error::{Error, Result};
use crate::history::HistoryRepository as _;
use crate::proofs::{ProofRepository as _, Reservation, sum_proofs};
use crate::select;
use crate::seed::COUNTER_RESYNC_JUMP;
use crate::types::{InvoiceEntry, InvoiceStatus};
use crate::wallet::{Wallet, unblind_proofs};

// ----- end imports

///////////////////////////////////////////// SendResult
#[derive(Debug, Clone)]
pub struct SendResult {
    /// proofs reserved for the recipient (or the melt)
    pub send_proofs: Vec<cdk00::Proof>,
    /// change kept in the store
    pub keep_proofs: Vec<cdk00::Proof>,
    /// input fee budgeted into the send amount
    pub fees: Amount,
}

impl Wallet {
    /// Splits the active-mint balance so that proofs worth `amount` (plus
    /// their own spending fee when `include_fees`) come out reserved for
    /// sending. `invalidate` burns the send proofs immediately, for tokens
    /// that leave the wallet out-of-band.
    pub async fn send(
        &self,
        amount: Amount,
        invalidate: bool,
        include_fees: bool,
    ) -> Result<SendResult> {
        let _guard = self.op_lock.lock().await;
        let mint = self.registry.active_mint();
        self.send_inner(mint, amount, invalidate, include_fees).await
    }

    /// Body of `send`, callable by `melt` which already holds the engine
    /// mutex and may target a non-active mint during MPP.
    pub(crate) async fn send_inner(
        &self,
        mint: MintUrl,
        amount: Amount,
        invalidate: bool,
        include_fees: bool,
    ) -> Result<SendResult> {
        let keysets = self.ensure_keysets(&mint).await?;
        let available = self.proofs.unreserved(mint.clone()).await?;
        let available = select::spendable(available, amount)?;

        let mut candidates = select::select(&available, amount, include_fees, &keysets);
        if candidates.is_empty() {
            // a balance stuck entirely on legacy keysets still gets drained
            candidates = select::select_base64_legacy(&available, amount);
        }
        if candidates.is_empty() {
            return Err(Error::BalanceTooLow {
                have: sum_proofs(&available),
                need: amount,
            });
        }

        let fees = if include_fees {
            select::fee_for_proofs(&candidates, &keysets)
        } else {
            Amount::ZERO
        };
        let send_total = amount + fees;
        let total = sum_proofs(&candidates);

        self.proofs
            .set_reservation(mint.clone(), candidates.clone(), Reservation::Reserved(None))
            .await?;

        let result = self
            .split_candidates(&mint, candidates.clone(), send_total, &keysets)
            .await;
        let (send_proofs, keep_proofs) = match result {
            Ok(split) => split,
            Err(err) => {
                // release the reservation before surfacing anything
                self.proofs
                    .set_reservation(mint, candidates, Reservation::Available)
                    .await?;
                return Err(err);
            }
        };

        if invalidate {
            self.proofs.remove(mint.clone(), send_proofs.clone()).await?;
        } else {
            self.proofs
                .set_reservation(mint, send_proofs.clone(), Reservation::Reserved(None))
                .await?;
        }
        tracing::info!(
            "send split: {} reserved, {} kept, {total} in",
            sum_proofs(&send_proofs),
            sum_proofs(&keep_proofs),
        );
        Ok(SendResult {
            send_proofs,
            keep_proofs,
            fees,
        })
    }

    /// Swaps `candidates` into an exact `send_total` part and change, unless
    /// they already match. Counter discipline: the bump lands before the
    /// swap request so a crash can never reuse a derivation index.
    async fn split_candidates(
        &self,
        mint: &MintUrl,
        candidates: Vec<cdk00::Proof>,
        send_total: Amount,
        keysets: &[cashu::KeySetInfo],
    ) -> Result<(Vec<cdk00::Proof>, Vec<cdk00::Proof>)> {
        let total = sum_proofs(&candidates);
        if total == send_total {
            return Ok((candidates, Vec::new()));
        }

        let swap_fee = select::fee_for_proofs(&candidates, keysets);
        if total < send_total + swap_fee {
            return Err(Error::BalanceTooLow {
                have: total,
                need: send_total + swap_fee,
            });
        }
        let keep_total = total - send_total - swap_fee;
        let (info, keyset) = self.keyset_for(mint).await?;
        let seed = self.seed.seed().await?;
        let counter = self.seed.counter(info.id).await?;

        let mut amounts = select::split_amount(send_total);
        amounts.extend(select::split_amount(keep_total));
        let premint = cdk00::PreMintSecrets::from_seed(
            info.id,
            counter,
            &seed,
            total - swap_fee,
            &SplitTarget::Values(amounts),
        )?;
        let outputs_len = premint.len() as i64;
        self.seed.bump_counter(info.id, outputs_len).await?;

        let request = cdk03::SwapRequest::new(candidates.clone(), premint.blinded_messages());
        let response = match self.client.post_swap(mint.clone(), request).await {
            Ok(response) => response,
            Err(Error::OutputsAlreadySigned) => {
                self.seed
                    .bump_counter(info.id, -outputs_len + COUNTER_RESYNC_JUMP)
                    .await?;
                return Err(Error::OutputsAlreadySigned);
            }
            Err(err) => return Err(err),
        };

        let proofs = unblind_proofs(&keyset, &response.signatures, &premint);
        let (send_proofs, keep_proofs) = partition_at(proofs, send_total);

        self.proofs.add(mint.clone(), keep_proofs.clone()).await?;
        self.proofs.add(mint.clone(), send_proofs.clone()).await?;
        self.proofs.remove(mint.clone(), candidates).await?;
        Ok((send_proofs, keep_proofs))
    }

    /// Receives a pasted token: the foreign proofs are swapped into
    /// deterministically derived ones before anything is stored.
    pub async fn receive(&self, token: &str) -> Result<Amount> {
        let _guard = self.op_lock.lock().await;
        let parsed = crate::proofs::deserialize_token(token)?;
        let mint = parsed.mint_url()?;
        self.registry.activate_mint(mint.clone(), None);
        let keysets = self.ensure_keysets(&mint).await?;
        let inputs = crate::proofs::token_proofs(&parsed, &keysets)?;
        if inputs.is_empty() {
            return Err(Error::DecodeFailed("token carries no proofs".into()));
        }

        let input_total = sum_proofs(&inputs);
        let fee = select::fee_for_proofs(&inputs, &keysets);
        let output_total = input_total - fee;

        let (info, keyset) = self.keyset_for(&mint).await?;
        let seed = self.seed.seed().await?;
        let counter = self.seed.counter(info.id).await?;
        let premint = cdk00::PreMintSecrets::from_seed(
            info.id,
            counter,
            &seed,
            output_total,
            &SplitTarget::None,
        )?;
        let outputs_len = premint.len() as i64;
        self.seed.bump_counter(info.id, outputs_len).await?;

        let request = cdk03::SwapRequest::new(inputs, premint.blinded_messages());
        let response = match self.client.post_swap(mint.clone(), request).await {
            Ok(response) => response,
            Err(Error::OutputsAlreadySigned) => {
                self.seed
                    .bump_counter(info.id, -outputs_len + COUNTER_RESYNC_JUMP)
                    .await?;
                return Err(Error::OutputsAlreadySigned);
            }
            Err(err) => return Err(err),
        };

        let proofs = unblind_proofs(&keyset, &response.signatures, &premint);
        let cashed_in = sum_proofs(&proofs);
        self.proofs.add(mint.clone(), proofs).await?;
        self.history
            .append(InvoiceEntry::new_token(
                u64::from(cashed_in) as i64,
                token.to_string(),
                InvoiceStatus::Paid,
                mint,
                self.registry.active_unit(),
            ))
            .await?;
        tracing::info!("received token worth {cashed_in}");
        Ok(cashed_in)
    }
}

/// Splits swap outputs back into the send prefix and the change suffix; the
/// premint amounts were ordered send-first so the prefix sums exactly.
fn partition_at(
    proofs: Vec<cdk00::Proof>,
    send_total: Amount,
) -> (Vec<cdk00::Proof>, Vec<cdk00::Proof>) {
    let mut send: Vec<cdk00::Proof> = Vec::new();
    let mut keep: Vec<cdk00::Proof> = Vec::new();
    let mut acc = Amount::ZERO;
    for proof in proofs {
        if acc < send_total {
            acc += proof.amount;
            send.push(proof);
        } else {
            keep.push(proof);
        }
    }
    (send, keep)
}
