use std::sync::Arc;

use cashu::{Amount, CurrencyUnit};
use satchel_core::persistence::memory::{
    InMemoryHistoryRepository, InMemoryProofRepository, InMemorySeedRepository,
};
use satchel_core::{
    HistoryRepository, IncomingRequest, InvoiceEntry, InvoiceStatus, LnurlHttpClient,
    ProofRepository, RequestDecoder, Reservation, SeedStore,
};

const BOLT11: &str = "lnbc100n1p5z3a63pp56854ytysg7e5z9fl3w5mgvrlqjfcytnjv8ff5hm5qt6gl6alxesqdqqcqzzsxqyz5vqsp5p0x0dlhn27s63j4emxnk26p7f94u0lyarnfp5yqmac9gzy4ngdss9qxpqysgqne3v0hnzt2lp0hc69xpzckk0cdcar7glvjhq60lsrfe8gejdm8c564prrnsft6ctxxyrewp4jtezrq3gxxqnfjj0f9tw2qs9y0lslmqpfu7et9";

fn mint_url() -> cashu::MintUrl {
    "https://mint.example.com".parse().unwrap()
}

fn proof(amount: u64, tag: u32) -> cashu::Proof {
    serde_json::from_value(serde_json::json!({
        "amount": amount,
        "id": "009a1f293253e41e",
        "secret": format!("{tag:064x}"),
        "C": "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
    }))
    .unwrap()
}

fn decoder() -> RequestDecoder {
    RequestDecoder::new(Arc::new(LnurlHttpClient::default()))
}

#[tokio::test]
async fn decoder_classifies_offline_inputs() {
    let decoder = decoder();

    let decoded = decoder.decode(BOLT11).await.unwrap();
    let IncomingRequest::Bolt11(invoice) = decoded else {
        panic!("expected an invoice");
    };
    assert_eq!(invoice.amount_sat, 10);
    assert!(invoice.expire_date() > invoice.timestamp);

    let decoded = decoder.decode("cashuAeyJwcm9vZnMiOltdfQ==").await.unwrap();
    assert!(matches!(decoded, IncomingRequest::TokenReceive(_)));

    let decoded = decoder.decode("https://mint.example.com").await.unwrap();
    assert!(matches!(decoded, IncomingRequest::MintUrl(_)));

    assert!(decoder.decode("certainly not a payment").await.is_err());
}

#[tokio::test]
async fn seed_store_lifecycle_survives_rotation() {
    let repo = Arc::new(InMemorySeedRepository::default());
    let store = SeedStore::new(repo.clone());

    let first = store.get_or_create_mnemonic().await.unwrap();
    let again = store.get_or_create_mnemonic().await.unwrap();
    assert_eq!(first, again);
    assert_eq!(store.seed().await.unwrap().len(), 64);

    let kid: cashu::Id = "009a1f293253e41e".parse().unwrap();
    assert_eq!(store.counter(kid).await.unwrap(), 1);
    store.bump_counter(kid, 5).await.unwrap();
    assert_eq!(store.counter(kid).await.unwrap(), 6);

    let fresh = store.rotate_mnemonic().await.unwrap();
    assert_ne!(fresh, first);
    assert_eq!(store.counter(kid).await.unwrap(), 1);

    let archived = repo.archived();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].0, first.to_string());
    assert_eq!(archived[0].1.get(&kid), Some(&6));
}

#[tokio::test]
async fn proof_store_reservation_roundtrip() {
    let repo = InMemoryProofRepository::default();
    let a = proof(8, 1);
    let b = proof(4, 2);
    repo.add(mint_url(), vec![a.clone(), b.clone()]).await.unwrap();

    repo.set_reservation(
        mint_url(),
        vec![a.clone()],
        Reservation::Reserved(Some("quote-1".into())),
    )
    .await
    .unwrap();
    assert_eq!(repo.unreserved(mint_url()).await.unwrap(), vec![b]);

    repo.set_reservation(mint_url(), vec![a], Reservation::Available)
        .await
        .unwrap();
    assert_eq!(repo.unreserved(mint_url()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn history_tracks_status_transitions() {
    let repo = InMemoryHistoryRepository::default();
    let entry = InvoiceEntry::new_outgoing(
        Amount::from(205u64),
        BOLT11.to_string(),
        "MQ".into(),
        mint_url(),
        CurrencyUnit::Sat,
    );
    repo.append(entry).await.unwrap();
    assert_eq!(repo.by_bolt11(BOLT11.to_string()).await.unwrap().len(), 1);

    repo.set_status("MQ".into(), InvoiceStatus::Paid).await.unwrap();
    repo.set_amount("MQ".into(), -202).await.unwrap();
    let entry = repo.entry("MQ".into()).await.unwrap().unwrap();
    assert_eq!(entry.amount, -202);
    assert_eq!(entry.status, InvoiceStatus::Paid);
}

#[test]
fn token_roundtrip_through_public_api() {
    let proofs = vec![proof(64, 10), proof(32, 11), proof(4, 12)];
    let token =
        satchel_core::proofs::serialize_proofs(mint_url(), CurrencyUnit::Sat, proofs.clone());
    assert!(token.starts_with("cashuB"));

    let parsed = satchel_core::proofs::deserialize_token(&token).unwrap();
    let keyset: cashu::KeySetInfo = serde_json::from_value(serde_json::json!({
        "id": "009a1f293253e41e",
        "unit": "sat",
        "active": true,
        "input_fee_ppk": 0,
    }))
    .unwrap();
    let mut decoded = satchel_core::proofs::token_proofs(&parsed, &[keyset]).unwrap();
    decoded.sort_by_key(|p| u64::from(p.amount));
    assert_eq!(decoded.len(), 3);
    assert_eq!(
        satchel_core::proofs::sum_proofs(&decoded),
        Amount::from(100u64)
    );
}
