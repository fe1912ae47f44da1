// ----- standard library imports
use std::sync::atomic::{AtomicU64, Ordering};
// ----- extra library imports
use cashu::{KeySetInfo, MintUrl, nut00 as cdk00, nut23 as cdk23};
use serde_json::json;
// ----- local imports

// ----- end imports

// fixtures shared by the module test suites; everything is built through
// serde from wire-shaped JSON so no mint or signing key is needed

pub const HEX_KID: &str = "009a1f293253e41e";
pub const V2_KID: &str = "012e23479a0029432eaad0d2040c09be53bab592d5cbf1d55e0dd26c9495951b30";

// secp256k1 generator point, a valid compressed public key
const POINT: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

static SECRET_SEQ: AtomicU64 = AtomicU64::new(1);

pub fn mint_url() -> MintUrl {
    "https://mint.example.com".parse().unwrap()
}

pub fn other_mint_url() -> MintUrl {
    "https://other.example.com".parse().unwrap()
}

fn proof_with_kid(amount: u64, kid: &str) -> cdk00::Proof {
    let seq = SECRET_SEQ.fetch_add(1, Ordering::Relaxed);
    serde_json::from_value(json!({
        "amount": amount,
        "id": kid,
        "secret": format!("{seq:064x}"),
        "C": POINT,
    }))
    .unwrap()
}

pub fn proof(amount: u64) -> cdk00::Proof {
    proof_with_kid(amount, HEX_KID)
}

pub fn legacy_proof(amount: u64) -> cdk00::Proof {
    proof_with_kid(amount, V2_KID)
}

pub fn kid() -> cashu::Id {
    HEX_KID.parse().unwrap()
}

pub fn keyset_info(input_fee_ppk: u64) -> KeySetInfo {
    serde_json::from_value(json!({
        "id": HEX_KID,
        "unit": "sat",
        "active": true,
        "input_fee_ppk": input_fee_ppk,
    }))
    .unwrap()
}

pub fn inactive_keyset_info() -> KeySetInfo {
    serde_json::from_value(json!({
        "id": HEX_KID,
        "unit": "sat",
        "active": false,
        "input_fee_ppk": 0,
    }))
    .unwrap()
}

pub fn keyset() -> cashu::KeySet {
    let keys: serde_json::Map<String, serde_json::Value> = (0..=12u32)
        .map(|i| (format!("{}", 1u64 << i), json!(POINT)))
        .collect();
    serde_json::from_value(json!({
        "id": HEX_KID,
        "unit": "sat",
        "keys": keys,
    }))
    .unwrap()
}

pub fn blind_sig(amount: u64) -> cdk00::BlindSignature {
    serde_json::from_value(json!({
        "amount": amount,
        "id": HEX_KID,
        "C_": POINT,
    }))
    .unwrap()
}

/// one signature per requested output, echoing its amount
pub fn sigs_for_outputs(outputs: &[cdk00::BlindedMessage]) -> Vec<cdk00::BlindSignature> {
    outputs
        .iter()
        .map(|b| blind_sig(u64::from(b.amount)))
        .collect()
}

pub fn mint_quote_response(
    quote: &str,
    request: &str,
    state: &str,
) -> cdk23::MintQuoteBolt11Response<String> {
    serde_json::from_value(json!({
        "quote": quote,
        "request": request,
        "state": state,
        "expiry": 9_999_999_999u64,
    }))
    .unwrap()
}

pub fn melt_quote_response(
    quote: &str,
    amount: u64,
    fee_reserve: u64,
    state: &str,
    change: Option<Vec<cdk00::BlindSignature>>,
) -> cdk23::MeltQuoteBolt11Response<String> {
    let mut value = json!({
        "quote": quote,
        "amount": amount,
        "fee_reserve": fee_reserve,
        "state": state,
        "expiry": 9_999_999_999u64,
    });
    if let Some(change) = change {
        value["change"] = serde_json::to_value(change).unwrap();
    }
    serde_json::from_value(value).unwrap()
}

/// a mainnet invoice over 10 sats (100n), used where flows need a parsable
/// bolt11 string with an amount
pub const BOLT11_10SAT: &str = "lnbc100n1p5z3a63pp56854ytysg7e5z9fl3w5mgvrlqjfcytnjv8ff5hm5qt6gl6alxesqdqqcqzzsxqyz5vqsp5p0x0dlhn27s63j4emxnk26p7f94u0lyarnfp5yqmac9gzy4ngdss9qxpqysgqne3v0hnzt2lp0hc69xpzckk0cdcar7glvjhq60lsrfe8gejdm8c564prrnsft6ctxxyrewp4jtezrq3gxxqnfjj0f9tw2qs9y0lslmqpfu7et9";
