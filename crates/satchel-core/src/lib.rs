//! Core wallet engine for a Cashu ecash client: quote lifecycles, proof
//! bookkeeping, deterministic keyset counters, coin selection, Lightning
//! mint/melt execution and request decoding. Persistence, UI and the
//! background scheduler stay outside, behind the repository traits.

pub mod client;
pub mod decode;
pub mod error;
pub mod history;
pub mod persistence;
pub mod proofs;
pub mod registry;
pub mod seed;
pub mod select;
pub mod types;
pub mod wallet;
pub mod workers;
pub mod ws;

#[cfg(test)]
pub(crate) mod test_utils;

pub use client::{HttpClient, MintConnector, MintInfo};
pub use decode::{IncomingRequest, LnurlConnector, LnurlHttpClient, RequestDecoder};
pub use error::{Error, Result};
pub use history::HistoryRepository;
pub use proofs::{ProofRepository, Reservation};
pub use registry::MintRegistry;
pub use seed::{SeedRepository, SeedStore};
pub use types::{DecodedInvoice, InvoiceEntry, InvoiceStatus, LnurlPayData, MultiMintBalance};
pub use wallet::{MeltResult, SendResult, Wallet};
pub use workers::{NoopWorkQueue, WorkQueue};
pub use ws::{Subscription, SubscriptionKind};
