// ----- standard library imports
// ----- extra library imports
use cashu::Amount;
use thiserror::Error;
// ----- local imports

// ----- end imports

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cashu::nut00: {0}")]
    Cdk00(#[from] cashu::nut00::Error),
    #[error("cashu::nut02: {0}")]
    Cdk02(#[from] cashu::nut02::Error),
    #[error("cashu::nut13: {0}")]
    Cdk13(#[from] cashu::nut13::Error),
    #[error("cashu::dhke: {0}")]
    Dhke(#[from] cashu::dhke::Error),
    #[error("cashu::mint_url: {0}")]
    CashuMintUrl(#[from] cashu::mint_url::Error),
    #[error("bip39: {0}")]
    Bip39(#[from] bip39::Error),
    #[error("bitcoin::bip32: {0}")]
    BtcBip32(#[from] bitcoin::bip32::Error),
    #[error("reqwest: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("serde_json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("mint has no keysets")]
    NoKeysets,
    #[error("no active keyset for unit {0}")]
    NoActiveKeysetsForUnit(cashu::CurrencyUnit),
    #[error("balance too low: have {have}, need {need}")]
    BalanceTooLow { have: Amount, need: Amount },
    #[error("invoice not paid yet: {0}")]
    InvoiceNotPaidYet(String),
    #[error("invoice still pending: {0}")]
    InvoiceStillPending(String),
    #[error("already processing a quote request")]
    AlreadyProcessingQuote,
    #[error("multi-mint balance {have} below invoice amount {need}")]
    InsufficientMultiMintBalance { have: Amount, need: Amount },
    #[error("no mint supports multi-path payments for this unit")]
    NoMintSupportsMpp,
    #[error("outputs have already been signed, retry requested")]
    OutputsAlreadySigned,
    #[error("mint error: {0}")]
    Mint(String),
    #[error("payment failed, quote {0} unpaid")]
    PaymentFailed(String),
    #[error("payment possibly in flight, quote {0} is {1}")]
    PaymentPossiblyInFlight(String, cashu::nut05::QuoteState),
    #[error("wallet is unloading")]
    Unloading,
    #[error("could not decode request: {0}")]
    DecodeFailed(String),
    #[error("lnurl: {0}")]
    Lnurl(String),
    #[error("quote {0} already paid")]
    QuoteAlreadyPaid(String),
    #[error("no pending invoice on the session")]
    NoPendingInvoice,
    #[error("websocket: {0}")]
    WebSocket(String),
    #[error("history entry not found: {0}")]
    EntryNotFound(String),
}
