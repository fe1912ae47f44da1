// ----- standard library imports
use std::time::{SystemTime, UNIX_EPOCH};
// ----- extra library imports
use cashu::{Amount, CurrencyUnit, MintUrl, nut23 as cdk23};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
// ----- local imports

// ----- end imports

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

///////////////////////////////////////////// InvoiceStatus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Paid,
}

///////////////////////////////////////////// InvoiceEntry
/// One row of the wallet history. Negative amounts are outgoing, positive
/// incoming; the sign is fixed at insertion. `quote` is the uniqueness key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceEntry {
    /// signed sats: +incoming, -outgoing
    pub amount: i64,
    pub bolt11: String,
    pub quote: String,
    pub memo: String,
    pub date: u64,
    pub status: InvoiceStatus,
    pub mint_url: MintUrl,
    pub unit: CurrencyUnit,
    /// serialized proofs for token-shaped entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl InvoiceEntry {
    pub fn new_incoming(
        amount: Amount,
        bolt11: String,
        quote: String,
        mint_url: MintUrl,
        unit: CurrencyUnit,
    ) -> Self {
        Self {
            amount: u64::from(amount) as i64,
            bolt11,
            quote,
            memo: String::from("Lightning invoice"),
            date: unix_now(),
            status: InvoiceStatus::Pending,
            mint_url,
            unit,
            token: None,
        }
    }

    pub fn new_outgoing(
        amount: Amount,
        bolt11: String,
        quote: String,
        mint_url: MintUrl,
        unit: CurrencyUnit,
    ) -> Self {
        Self {
            amount: -(u64::from(amount) as i64),
            bolt11,
            quote,
            memo: String::from("Outgoing invoice"),
            date: unix_now(),
            status: InvoiceStatus::Pending,
            mint_url,
            unit,
            token: None,
        }
    }

    pub fn new_token(
        amount: i64,
        token: String,
        status: InvoiceStatus,
        mint_url: MintUrl,
        unit: CurrencyUnit,
    ) -> Self {
        Self {
            amount,
            bolt11: String::new(),
            quote: Uuid::new_v4().to_string(),
            memo: String::new(),
            date: unix_now(),
            status,
            mint_url,
            unit,
            token: Some(token),
        }
    }

    pub fn is_outgoing(&self) -> bool {
        self.amount < 0
    }
}

///////////////////////////////////////////// DecodedInvoice
/// BOLT-11 fields the engine cares about, in sats and unix seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInvoice {
    pub bolt11: String,
    pub amount_sat: u64,
    pub payment_hash: String,
    pub description: String,
    pub timestamp: u64,
    pub expiry: u64,
}

impl DecodedInvoice {
    pub fn expire_date(&self) -> u64 {
        self.timestamp.saturating_add(self.expiry)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expire_date() < now
    }
}

///////////////////////////////////////////// LnurlPayData
/// State of an LNURL-pay exchange between the first and second request.
#[derive(Debug, Clone)]
pub struct LnurlPayData {
    pub callback: String,
    pub min_sendable_msat: u64,
    pub max_sendable_msat: u64,
    pub metadata: String,
    pub domain: String,
    /// set when min == max forced the amount
    pub fixed_amount_sat: Option<u64>,
}

///////////////////////////////////////////// MultiMintBalance
#[derive(Debug, Clone)]
pub struct MultiMintBalance {
    pub overall: Amount,
    /// per-mint share of `overall`, same order as the mint list it was
    /// computed from; sums to ~1.0
    pub weights: Vec<f64>,
}

///////////////////////////////////////////// PaySession
/// Transient state of the invoice currently being paid. `blocking` serializes
/// quote requests; it is managed through [`crate::wallet::SessionLatch`].
#[derive(Debug, Default)]
pub struct PaySession {
    pub invoice: Option<DecodedInvoice>,
    pub lnurl: Option<LnurlPayData>,
    pub quote: Option<cdk23::MeltQuoteBolt11Response<String>>,
    pub mpp_payloads: Vec<(MintUrl, cdk23::MeltQuoteBolt11Request)>,
    pub mpp_quotes: Vec<(MintUrl, cdk23::MeltQuoteBolt11Response<String>)>,
    pub error: Option<String>,
    pub blocking: bool,
}

impl PaySession {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
