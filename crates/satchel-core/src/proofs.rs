// ----- standard library imports
use std::str::FromStr;
// ----- extra library imports
use async_trait::async_trait;
use cashu::{Amount, CurrencyUnit, KeySetInfo, MintUrl, nut00 as cdk00};
// ----- local imports
use crate::error::Result;

// ----- end imports

///////////////////////////////////////////// Reservation
/// Reservation state of a stored proof. A reserved proof is excluded from
/// spendable selection; the optional quote id binds the reservation to the
/// melt that caused it so rollback is a single assignment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Reservation {
    #[default]
    Available,
    Reserved(Option<String>),
}

impl Reservation {
    pub fn is_reserved(&self) -> bool {
        matches!(self, Reservation::Reserved(_))
    }
}

///////////////////////////////////////////// ProofRepository
/// Proof bookkeeping per mint. Proof identity is the secret: `add` on a proof
/// whose secret is already present replaces the stored copy (idempotent
/// refresh), it never duplicates.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProofRepository: Send + Sync {
    async fn add(&self, mint: MintUrl, proofs: Vec<cdk00::Proof>) -> Result<()>;
    async fn remove(&self, mint: MintUrl, proofs: Vec<cdk00::Proof>) -> Result<()>;
    async fn set_reservation(
        &self,
        mint: MintUrl,
        proofs: Vec<cdk00::Proof>,
        reservation: Reservation,
    ) -> Result<()>;
    /// proofs of the mint that are not reserved
    async fn unreserved(&self, mint: MintUrl) -> Result<Vec<cdk00::Proof>>;
    /// proofs reserved under the given melt quote
    async fn reserved_for_quote(&self, mint: MintUrl, quote: String) -> Result<Vec<cdk00::Proof>>;
    /// every proof held for the mint, reserved or not
    async fn all(&self, mint: MintUrl) -> Result<Vec<cdk00::Proof>>;
}

///////////////////////////////////////////// sum_proofs
pub fn sum_proofs(proofs: &[cdk00::Proof]) -> Amount {
    proofs.iter().fold(Amount::ZERO, |acc, p| acc + p.amount)
}

///////////////////////////////////////////// serialize_proofs
/// Encodes proofs as a `cashuB…` token string for the given mint/unit.
pub fn serialize_proofs(
    mint_url: MintUrl,
    unit: CurrencyUnit,
    proofs: Vec<cdk00::Proof>,
) -> String {
    cdk00::Token::new(mint_url, proofs, None, unit).to_string()
}

///////////////////////////////////////////// deserialize_token
/// Decodes a `cashuA…`/`cashuB…` string into a token.
pub fn deserialize_token(token: &str) -> Result<cdk00::Token> {
    Ok(cdk00::Token::from_str(token)?)
}

///////////////////////////////////////////// token_proofs
pub fn token_proofs(token: &cdk00::Token, keysets: &[KeySetInfo]) -> Result<Vec<cdk00::Proof>> {
    Ok(token.proofs(keysets)?)
}
