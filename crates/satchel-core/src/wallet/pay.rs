// ----- standard library imports
use std::str::FromStr;
// ----- extra library imports
use cashu::{
    Amount, MintUrl, nut00 as cdk00, nut05 as cdk05, nut15 as cdk15, nut23 as cdk23,
};
// ----- local imports
use crate::client::MintConnector as _;
use crate::error::{Error, Result};
use crate::history::HistoryRepository as _;
use crate::proofs::{ProofRepository as _, Reservation, sum_proofs};
use crate::types::{DecodedInvoice, InvoiceEntry, InvoiceStatus, MultiMintBalance};
use crate::wallet::{Wallet, unblind_proofs};

// ----- end imports

///////////////////////////////////////////// MeltResult
#[derive(Debug, Clone)]
pub struct MeltResult {
    pub quote_id: String,
    /// what actually left the wallet: inputs minus returned change
    pub amount_paid: Amount,
    pub change: Vec<cdk00::Proof>,
    pub preimage: Option<String>,
}

impl Wallet {
    /// Requests a single-mint melt quote for the invoice. Serialized by the
    /// session latch; the response (or the error message) lands on the
    /// session for the UI.
    pub async fn melt_quote(
        &self,
        invoice: DecodedInvoice,
    ) -> Result<cdk23::MeltQuoteBolt11Response<String>> {
        let latch = self.acquire_latch()?;
        {
            let mut session = self.session.lock().unwrap();
            session.invoice = Some(invoice.clone());
            session.error = None;
        }
        let mint = self.registry.active_mint();
        let request = cdk23::MeltQuoteBolt11Request {
            request: cashu::Bolt11Invoice::from_str(&invoice.bolt11)
                .map_err(|e| Error::DecodeFailed(e.to_string()))?,
            unit: self.registry.active_unit(),
            options: None,
        };
        let result = self.client.post_melt_quote(mint, request).await;
        match result {
            Ok(response) => {
                let mut session = self.session.lock().unwrap();
                session.quote = Some(response.clone());
                drop(latch);
                Ok(response)
            }
            Err(err) => {
                let mut session = self.session.lock().unwrap();
                session.error = Some(err.to_string());
                drop(latch);
                Err(err)
            }
        }
    }

    /// Balance spread over the NUT-15 capable mints for (bolt11, unit).
    pub async fn multi_mint_balance(&self) -> Result<(Vec<MintUrl>, MultiMintBalance)> {
        let unit = self.registry.active_unit();
        let mints = self.registry.multi_mints("bolt11", &unit);
        if mints.is_empty() {
            return Err(Error::NoMintSupportsMpp);
        }
        let mut balances: Vec<u64> = Vec::with_capacity(mints.len());
        for mint in &mints {
            let unreserved = self.proofs.unreserved(mint.clone()).await?;
            balances.push(u64::from(sum_proofs(&unreserved)));
        }
        let overall: u64 = balances.iter().sum();
        let weights = balances
            .iter()
            .map(|b| {
                if overall == 0 {
                    0.0
                } else {
                    *b as f64 / overall as f64
                }
            })
            .collect();
        Ok((
            mints,
            MultiMintBalance {
                overall: Amount::from(overall),
                weights,
            },
        ))
    }

    /// NUT-15 fan-out: one partial melt quote per capable mint, allocated by
    /// balance weight, requested sequentially, aborting on the first mint
    /// error.
    pub async fn multi_path_melt_quotes(
        &self,
    ) -> Result<Vec<(MintUrl, cdk23::MeltQuoteBolt11Response<String>)>> {
        let latch = self.acquire_latch()?;
        let invoice = self
            .session
            .lock()
            .unwrap()
            .invoice
            .clone()
            .filter(|i| i.amount_sat > 0)
            .ok_or(Error::NoPendingInvoice)?;

        let (mints, balance) = self.multi_mint_balance().await?;
        if balance.overall < Amount::from(invoice.amount_sat) {
            return Err(Error::InsufficientMultiMintBalance {
                have: balance.overall,
                need: Amount::from(invoice.amount_sat),
            });
        }
        let mut mint_balances: Vec<u64> = Vec::with_capacity(mints.len());
        for mint in &mints {
            let unreserved = self.proofs.unreserved(mint.clone()).await?;
            mint_balances.push(u64::from(sum_proofs(&unreserved)));
        }
        let partials = allocate_partials(invoice.amount_sat, &mint_balances);

        let unit = self.registry.active_unit();
        let bolt11 = cashu::Bolt11Invoice::from_str(&invoice.bolt11)
            .map_err(|e| Error::DecodeFailed(e.to_string()))?;
        let mut payloads: Vec<(MintUrl, cdk23::MeltQuoteBolt11Request)> = Vec::new();
        let mut quotes: Vec<(MintUrl, cdk23::MeltQuoteBolt11Response<String>)> = Vec::new();
        for (mint, partial_sat) in mints.iter().zip(partials.iter()) {
            if *partial_sat == 0 {
                continue;
            }
            let request = cdk23::MeltQuoteBolt11Request {
                request: bolt11.clone(),
                unit: unit.clone(),
                options: Some(cdk23::MeltOptions::Mpp {
                    mpp: cdk15::Mpp {
                        amount: Amount::from(partial_sat * 1000),
                    },
                }),
            };
            let response = match self
                .client
                .post_melt_quote(mint.clone(), request.clone())
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    self.session.lock().unwrap().error = Some(err.to_string());
                    drop(latch);
                    return Err(err);
                }
            };
            payloads.push((mint.clone(), request));
            quotes.push((mint.clone(), response));
        }
        {
            let mut session = self.session.lock().unwrap();
            session.mpp_payloads = payloads;
            session.mpp_quotes = quotes.clone();
        }
        drop(latch);
        Ok(quotes)
    }

    /// Pays the single-mint quote parked on the session.
    pub async fn melt(&self) -> Result<MeltResult> {
        if self.latch_engaged() {
            return Err(Error::AlreadyProcessingQuote);
        }
        let (invoice, quote) = {
            let session = self.session.lock().unwrap();
            (
                session.invoice.clone().ok_or(Error::NoPendingInvoice)?,
                session.quote.clone().ok_or(Error::NoPendingInvoice)?,
            )
        };
        // an invoice the history already shows paid out must not go out twice
        for entry in self.history.by_bolt11(invoice.bolt11.clone()).await? {
            if entry.status == InvoiceStatus::Paid && entry.is_outgoing() {
                return Err(Error::QuoteAlreadyPaid(entry.quote));
            }
        }
        let _guard = self.op_lock.lock().await;
        let mint = self.registry.active_mint();
        self.execute_melt(mint, &quote, &invoice.bolt11).await
    }

    /// Pays every partial quote of the MPP fan-out, sequentially, against
    /// its own mint.
    pub async fn melt_mpp(&self) -> Result<Vec<MeltResult>> {
        if self.latch_engaged() {
            return Err(Error::AlreadyProcessingQuote);
        }
        let (invoice, quotes) = {
            let session = self.session.lock().unwrap();
            (
                session.invoice.clone().ok_or(Error::NoPendingInvoice)?,
                session.mpp_quotes.clone(),
            )
        };
        if quotes.is_empty() {
            return Err(Error::NoPendingInvoice);
        }
        let _guard = self.op_lock.lock().await;
        let mut results = Vec::with_capacity(quotes.len());
        for (mint, quote) in quotes {
            let result = self.execute_melt(mint, &quote, &invoice.bolt11).await?;
            results.push(result);
        }
        Ok(results)
    }

    /// The melt state machine. Counter and reservation discipline:
    /// reservations and the pending history entry land before the melt
    /// request, the counter bump lands before it too, and rollback happens
    /// only when the mint confirms the quote UNPAID.
    async fn execute_melt(
        &self,
        mint: MintUrl,
        quote: &cdk23::MeltQuoteBolt11Response<String>,
        bolt11: &str,
    ) -> Result<MeltResult> {
        let quote_id = quote.quote.clone();
        let amount = quote.amount + quote.fee_reserve;
        let unit = self.registry.active_unit();

        let send = self
            .send_inner(mint.clone(), amount, false, true)
            .await?;
        let send_proofs = send.send_proofs;

        self.history
            .append(InvoiceEntry::new_outgoing(
                amount,
                bolt11.to_string(),
                quote_id.clone(),
                mint.clone(),
                unit.clone(),
            ))
            .await?;
        self.proofs
            .set_reservation(
                mint.clone(),
                send_proofs.clone(),
                Reservation::Reserved(Some(quote_id.clone())),
            )
            .await?;

        let (info, keyset) = self.keyset_for(&mint).await?;
        let seed = self.seed.seed().await?;
        let counter = self.seed.counter(info.id).await?;
        let change_premint = if quote.fee_reserve > Amount::ZERO {
            Some(cdk00::PreMintSecrets::from_seed_blank(
                info.id,
                counter,
                &seed,
                quote.fee_reserve,
            )?)
        } else {
            None
        };
        let change_outputs = change_premint.as_ref().map(|p| p.len()).unwrap_or(0);
        let delta = (send_proofs.len() + change_outputs) as i64;
        self.seed.bump_counter(info.id, delta).await?;

        let request = cdk05::MeltRequest::new(
            quote_id.clone(),
            send_proofs.clone(),
            change_premint.clone().map(|p| p.blinded_messages()),
        );
        let outcome = self.client.post_melt(mint.clone(), request).await;

        let response = match outcome {
            Ok(response) if response.state == cdk05::QuoteState::Paid => response,
            Ok(response) => {
                return self
                    .melt_failure(
                        mint,
                        info.id,
                        delta,
                        quote_id.clone(),
                        Error::PaymentPossiblyInFlight(quote_id, response.state),
                        Some(response.state),
                    )
                    .await;
            }
            Err(err) => {
                return self
                    .melt_failure(mint, info.id, delta, quote_id, err, None)
                    .await;
            }
        };

        let change = match &change_premint {
            Some(premint) => {
                unblind_proofs(&keyset, &response.change.clone().unwrap_or_default(), premint)
            }
            None => Vec::new(),
        };
        let amount_paid = amount - sum_proofs(&change);
        self.proofs.remove(mint.clone(), send_proofs).await?;
        self.proofs.add(mint.clone(), change.clone()).await?;
        self.history
            .append(InvoiceEntry::new_token(
                -(u64::from(amount_paid) as i64),
                crate::proofs::serialize_proofs(mint.clone(), unit, change.clone()),
                InvoiceStatus::Paid,
                mint,
                self.registry.active_unit(),
            ))
            .await?;
        self.history
            .set_status(quote_id.clone(), InvoiceStatus::Paid)
            .await?;
        self.history
            .set_amount(quote_id.clone(), -(u64::from(amount_paid) as i64))
            .await?;
        tracing::info!("melt {quote_id} paid, {amount_paid} out, {} change", sum_proofs(&change));
        Ok(MeltResult {
            quote_id,
            amount_paid,
            change,
            preimage: response.payment_preimage,
        })
    }

    /// Decides between rollback and leave-in-flight. While the process is
    /// unloading nothing is rolled back; otherwise the quote state is
    /// re-queried and only a confirmed UNPAID releases the reservations,
    /// reverses the counter and drops the pending entry.
    async fn melt_failure(
        &self,
        mint: MintUrl,
        kid: cashu::Id,
        delta: i64,
        quote_id: String,
        original: Error,
        known_state: Option<cdk05::QuoteState>,
    ) -> Result<MeltResult> {
        if self.is_unloading() {
            tracing::warn!("melt {quote_id} failed while unloading, keeping state: {original}");
            return Err(original);
        }
        let state = match known_state {
            Some(state) => state,
            None => {
                match self
                    .client
                    .get_melt_quote_status(mint.clone(), quote_id.clone())
                    .await
                {
                    Ok(status) => status.state,
                    Err(err) => {
                        tracing::warn!(
                            "melt {quote_id} failed and state re-query failed too ({err}), not rolling back"
                        );
                        return Err(original);
                    }
                }
            }
        };
        match state {
            cdk05::QuoteState::Paid | cdk05::QuoteState::Pending => {
                tracing::warn!("melt {quote_id} errored but quote is {state}, not rolling back");
                Err(Error::PaymentPossiblyInFlight(quote_id, state))
            }
            _ => {
                tracing::warn!("melt {quote_id} unpaid, rolling back");
                let reserved = self
                    .proofs
                    .reserved_for_quote(mint.clone(), quote_id.clone())
                    .await?;
                self.proofs
                    .set_reservation(mint, reserved, Reservation::Available)
                    .await?;
                self.seed.bump_counter(kid, -delta).await?;
                self.history.remove(quote_id.clone()).await?;
                Err(Error::PaymentFailed(quote_id))
            }
        }
    }

    /// Polling fallback for an outgoing quote: finalizes on PAID, releases
    /// everything on UNPAID, reports PENDING as still in flight.
    pub async fn check_outgoing_invoice(&self, quote_id: &str) -> Result<()> {
        let mint = self.registry.active_mint();
        let status = self
            .client
            .get_melt_quote_status(mint.clone(), quote_id.to_string())
            .await?;
        match status.state {
            cdk05::QuoteState::Paid => {
                self.history
                    .set_status(quote_id.to_string(), InvoiceStatus::Paid)
                    .await?;
                Ok(())
            }
            cdk05::QuoteState::Pending => Err(Error::InvoiceStillPending(quote_id.to_string())),
            _ => {
                let reserved = self
                    .proofs
                    .reserved_for_quote(mint.clone(), quote_id.to_string())
                    .await?;
                self.proofs
                    .set_reservation(mint, reserved, Reservation::Available)
                    .await?;
                self.history.remove(quote_id.to_string()).await?;
                Err(Error::PaymentFailed(quote_id.to_string()))
            }
        }
    }
}

///////////////////////////////////////////// allocate_partials
/// Splits `invoice_sat` over the mints proportionally to their balances.
/// All arithmetic is integer millisats: the carry is the msat residual of
/// rounding, and the last funded mint absorbs the remainder so the partials
/// always sum to the invoice exactly.
pub(crate) fn allocate_partials(invoice_sat: u64, balances: &[u64]) -> Vec<u64> {
    let total_balance: u128 = balances.iter().map(|b| *b as u128).sum();
    if total_balance == 0 || invoice_sat == 0 {
        return vec![0; balances.len()];
    }
    let invoice_msat = invoice_sat as u128 * 1000;
    let funded = balances.iter().filter(|b| **b > 0).count();
    let mut partials = vec![0u64; balances.len()];
    let mut allocated: u64 = 0;
    let mut carry_msat: i128 = 0;
    let mut seen_funded = 0usize;
    for (i, balance) in balances.iter().enumerate() {
        if *balance == 0 {
            continue;
        }
        seen_funded += 1;
        if seen_funded == funded {
            partials[i] = invoice_sat - allocated;
            break;
        }
        let exact_msat = (invoice_msat * *balance as u128 / total_balance) as i128;
        let rounded_sat = ((exact_msat + carry_msat + 500) / 1000).max(0) as u64;
        let rounded_sat = rounded_sat.min(invoice_sat - allocated);
        carry_msat = exact_msat + carry_msat - rounded_sat as i128 * 1000;
        partials[i] = rounded_sat;
        allocated += rounded_sat;
    }
    partials
}
