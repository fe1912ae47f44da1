// end-to-end flow tests over the in-memory stores and a mocked mint

// ----- standard library imports
// ----- extra library imports
use cashu::{Amount, nut05 as cdk05};
// ----- local imports
use crate::error::Error;
use crate::proofs::sum_proofs;
use crate::test_utils as fixtures;
use crate::types::{InvoiceEntry, InvoiceStatus};
use crate::wallet::test_support::{Scenario, mint_with_swap, scenario};

// ----- end imports

async fn fund(scenario: &Scenario, amounts: &[u64]) {
    let proofs = amounts.iter().map(|a| fixtures::proof(*a)).collect();
    scenario
        .proofs
        .add(fixtures::mint_url(), proofs)
        .await
        .unwrap();
}

fn park_melt_quote(scenario: &Scenario, quote: cashu::nut23::MeltQuoteBolt11Response<String>) {
    let mut session = scenario.wallet.session.lock().unwrap();
    session.invoice = Some(crate::decode::decode_bolt11(fixtures::BOLT11_10SAT).unwrap());
    session.quote = Some(quote);
}

use crate::history::HistoryRepository;
use crate::proofs::ProofRepository;

#[tokio::test]
async fn send_without_split_reserves_candidates_as_is() {
    let client = mint_with_swap(0);
    let ctx = scenario(client);
    fund(&ctx, &[64, 32, 4]).await;

    let result = ctx
        .wallet
        .send(Amount::from(100u64), false, false)
        .await
        .unwrap();
    assert_eq!(sum_proofs(&result.send_proofs), Amount::from(100u64));
    assert!(result.keep_proofs.is_empty());
    assert_eq!(result.fees, Amount::ZERO);

    // nothing swapped: same proofs, now reserved
    assert!(ctx
        .proofs
        .unreserved(fixtures::mint_url())
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        ctx.proofs.all(fixtures::mint_url()).await.unwrap().len(),
        3
    );
    // no swap means no counter movement
    assert_eq!(
        ctx.wallet.seed.counter(fixtures::kid()).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn send_with_split_swaps_and_keeps_change() {
    let client = mint_with_swap(0);
    let ctx = scenario(client);
    fund(&ctx, &[512]).await;

    let result = ctx
        .wallet
        .send(Amount::from(100u64), false, false)
        .await
        .unwrap();
    assert_eq!(sum_proofs(&result.send_proofs), Amount::from(100u64));
    assert_eq!(sum_proofs(&result.keep_proofs), Amount::from(412u64));

    let unreserved = ctx.proofs.unreserved(fixtures::mint_url()).await.unwrap();
    assert_eq!(sum_proofs(&unreserved), Amount::from(412u64));
    // counter advanced by the 8 swap outputs: split(100)=3, split(412)=5
    assert_eq!(
        ctx.wallet.seed.counter(fixtures::kid()).await.unwrap(),
        9
    );
}

#[tokio::test]
async fn send_with_fees_budgets_the_spending_fee() {
    let client = mint_with_swap(1000);
    let ctx = scenario(client);
    fund(&ctx, &[512]).await;

    let result = ctx
        .wallet
        .send(Amount::from(100u64), false, true)
        .await
        .unwrap();
    // 1 sat input fee budgeted into the send, 1 sat paid for the swap itself
    assert_eq!(result.fees, Amount::from(1u64));
    assert_eq!(sum_proofs(&result.send_proofs), Amount::from(101u64));
    assert_eq!(sum_proofs(&result.keep_proofs), Amount::from(410u64));
}

#[tokio::test]
async fn send_outputs_already_signed_resyncs_counter() {
    let mut client = crate::client::MockMintConnector::new();
    client.expect_get_mint_keysets().returning(|_| {
        Ok(crate::wallet::test_support::keyset_response(vec![
            fixtures::keyset_info(0),
        ]))
    });
    client
        .expect_get_mint_info()
        .returning(|_| Ok(crate::client::MintInfo::default()));
    client
        .expect_get_mint_keyset()
        .returning(|_, _| Ok(fixtures::keyset()));
    client
        .expect_post_swap()
        .times(1)
        .returning(|_, _| Err(Error::OutputsAlreadySigned));
    let ctx = scenario(client);
    fund(&ctx, &[512]).await;

    let before = ctx.wallet.seed.counter(fixtures::kid()).await.unwrap();
    let err = ctx
        .wallet
        .send(Amount::from(100u64), false, false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::OutputsAlreadySigned));
    let after = ctx.wallet.seed.counter(fixtures::kid()).await.unwrap();
    assert_eq!(after, before + 10);

    // no proofs mutated, nothing left reserved
    let unreserved = ctx.proofs.unreserved(fixtures::mint_url()).await.unwrap();
    assert_eq!(sum_proofs(&unreserved), Amount::from(512u64));
}

#[tokio::test]
async fn melt_success_books_amount_minus_change() {
    let mut client = mint_with_swap(0);
    client.expect_post_melt().times(1).returning(|_, request| {
        // inputs cover quote amount plus fee reserve
        assert_eq!(
            request
                .inputs()
                .iter()
                .fold(Amount::ZERO, |acc, p| acc + p.amount),
            Amount::from(205u64)
        );
        Ok(fixtures::melt_quote_response(
            "MQ1",
            200,
            5,
            "PAID",
            Some(vec![fixtures::blind_sig(2), fixtures::blind_sig(1)]),
        ))
    });
    let ctx = scenario(client);
    fund(&ctx, &[256]).await;
    park_melt_quote(
        &ctx,
        fixtures::melt_quote_response("MQ1", 200, 5, "UNPAID", None),
    );

    let result = ctx.wallet.melt().await.unwrap();
    assert_eq!(result.amount_paid, Amount::from(202u64));
    assert_eq!(sum_proofs(&result.change), Amount::from(3u64));

    // inputs gone, change present, nothing reserved under the quote
    let unreserved = ctx.proofs.unreserved(fixtures::mint_url()).await.unwrap();
    assert_eq!(sum_proofs(&unreserved), Amount::from(54u64));
    assert!(ctx
        .proofs
        .reserved_for_quote(fixtures::mint_url(), "MQ1".into())
        .await
        .unwrap()
        .is_empty());

    // exactly one paid invoice entry for the quote, finalized to -202
    let entry = ctx.history.entry("MQ1".into()).await.unwrap().unwrap();
    assert_eq!(entry.status, InvoiceStatus::Paid);
    assert_eq!(entry.amount, -202);

    // counter: 9 swap outputs plus 5 melt inputs and 3 change outputs
    assert_eq!(
        ctx.wallet.seed.counter(fixtures::kid()).await.unwrap(),
        18
    );
}

#[tokio::test]
async fn melt_unpaid_failure_rolls_everything_back() {
    let mut client = mint_with_swap(0);
    client
        .expect_post_melt()
        .times(1)
        .returning(|_, _| Err(Error::Mint("payment failed".into())));
    client
        .expect_get_melt_quote_status()
        .times(1)
        .returning(|_, _| Ok(fixtures::melt_quote_response("MQ1", 200, 5, "UNPAID", None)));
    let ctx = scenario(client);
    fund(&ctx, &[256]).await;
    park_melt_quote(
        &ctx,
        fixtures::melt_quote_response("MQ1", 200, 5, "UNPAID", None),
    );

    let err = ctx.wallet.melt().await.unwrap_err();
    assert!(matches!(err, Error::PaymentFailed(_)));

    // reservations released, pending entry gone, melt counter bump reversed
    let unreserved = ctx.proofs.unreserved(fixtures::mint_url()).await.unwrap();
    assert_eq!(sum_proofs(&unreserved), Amount::from(256u64));
    assert!(ctx
        .proofs
        .reserved_for_quote(fixtures::mint_url(), "MQ1".into())
        .await
        .unwrap()
        .is_empty());
    assert!(ctx.history.entry("MQ1".into()).await.unwrap().is_none());
    assert_eq!(
        ctx.wallet.seed.counter(fixtures::kid()).await.unwrap(),
        10
    );
}

#[tokio::test]
async fn melt_in_flight_failure_keeps_reservations() {
    let mut client = mint_with_swap(0);
    client
        .expect_post_melt()
        .times(1)
        .returning(|_, _| Err(Error::Mint("timeout".into())));
    client
        .expect_get_melt_quote_status()
        .times(1)
        .returning(|_, _| Ok(fixtures::melt_quote_response("MQ1", 200, 5, "PENDING", None)));
    let ctx = scenario(client);
    fund(&ctx, &[256]).await;
    park_melt_quote(
        &ctx,
        fixtures::melt_quote_response("MQ1", 200, 5, "UNPAID", None),
    );

    let err = ctx.wallet.melt().await.unwrap_err();
    assert!(matches!(
        err,
        Error::PaymentPossiblyInFlight(_, cdk05::QuoteState::Pending)
    ));
    let reserved = ctx
        .proofs
        .reserved_for_quote(fixtures::mint_url(), "MQ1".into())
        .await
        .unwrap();
    assert_eq!(sum_proofs(&reserved), Amount::from(205u64));
    assert!(ctx.history.entry("MQ1".into()).await.unwrap().is_some());
}

#[tokio::test]
async fn melt_while_unloading_never_rolls_back() {
    let mut client = mint_with_swap(0);
    client
        .expect_post_melt()
        .times(1)
        .returning(|_, _| Err(Error::Mint("connection reset".into())));
    client.expect_get_melt_quote_status().times(0);
    let ctx = scenario(client);
    fund(&ctx, &[256]).await;
    park_melt_quote(
        &ctx,
        fixtures::melt_quote_response("MQ1", 200, 5, "UNPAID", None),
    );

    ctx.wallet.set_unloading(true);
    let err = ctx.wallet.melt().await.unwrap_err();
    assert!(matches!(err, Error::Mint(_)));

    let reserved = ctx
        .proofs
        .reserved_for_quote(fixtures::mint_url(), "MQ1".into())
        .await
        .unwrap();
    assert_eq!(sum_proofs(&reserved), Amount::from(205u64));
    let entry = ctx.history.entry("MQ1".into()).await.unwrap().unwrap();
    assert_eq!(entry.status, InvoiceStatus::Pending);
    assert_eq!(
        ctx.wallet.seed.counter(fixtures::kid()).await.unwrap(),
        18
    );
}

#[tokio::test]
async fn melt_rejects_an_invoice_already_paid() {
    let client = mint_with_swap(0);
    let ctx = scenario(client);
    park_melt_quote(
        &ctx,
        fixtures::melt_quote_response("MQ2", 200, 5, "UNPAID", None),
    );
    let mut paid = InvoiceEntry::new_outgoing(
        Amount::from(10u64),
        fixtures::BOLT11_10SAT.to_string(),
        "OLD".into(),
        fixtures::mint_url(),
        cashu::CurrencyUnit::Sat,
    );
    paid.status = InvoiceStatus::Paid;
    ctx.history.append(paid).await.unwrap();

    let err = ctx.wallet.melt().await.unwrap_err();
    assert!(matches!(err, Error::QuoteAlreadyPaid(_)));
}

#[tokio::test]
async fn receive_swaps_foreign_proofs_into_own() {
    let client = mint_with_swap(0);
    let ctx = scenario(client);
    let token = crate::proofs::serialize_proofs(
        fixtures::mint_url(),
        cashu::CurrencyUnit::Sat,
        vec![fixtures::proof(16), fixtures::proof(8)],
    );

    let cashed = ctx.wallet.receive(&token).await.unwrap();
    assert_eq!(cashed, Amount::from(24u64));
    let unreserved = ctx.proofs.unreserved(fixtures::mint_url()).await.unwrap();
    assert_eq!(sum_proofs(&unreserved), Amount::from(24u64));
    // the foreign secrets are not the stored ones
    let stored = ctx.proofs.all(fixtures::mint_url()).await.unwrap();
    assert!(stored.iter().all(|p| {
        crate::proofs::deserialize_token(&token)
            .unwrap()
            .proofs(&[fixtures::keyset_info(0)])
            .unwrap()
            .iter()
            .all(|foreign| foreign.secret != p.secret)
    }));
    // history gained a paid incoming token entry
    let entries = ctx.history.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].amount, 24);
    assert_eq!(entries[0].status, InvoiceStatus::Paid);
}

#[tokio::test]
async fn check_token_spendable_splits_partial_spends() {
    let spent_proof = fixtures::proof(8);
    let unspent_proof = fixtures::proof(4);
    let spent_y = spent_proof.y().unwrap();

    let mut client = mint_with_swap(0);
    client
        .expect_post_check_state()
        .returning(move |_, request| {
            Ok(cashu::nut07::CheckStateResponse {
                states: request
                    .ys
                    .iter()
                    .map(|y| cashu::nut07::ProofState {
                        y: *y,
                        state: if *y == spent_y {
                            cashu::nut07::State::Spent
                        } else {
                            cashu::nut07::State::Unspent
                        },
                        witness: None,
                    })
                    .collect(),
            })
        });
    let ctx = scenario(client);
    let token = crate::proofs::serialize_proofs(
        fixtures::mint_url(),
        cashu::CurrencyUnit::Sat,
        vec![spent_proof, unspent_proof],
    );
    ctx.history
        .append(InvoiceEntry::new_token(
            -12,
            token.clone(),
            InvoiceStatus::Pending,
            fixtures::mint_url(),
            cashu::CurrencyUnit::Sat,
        ))
        .await
        .unwrap();

    let fully_spent = ctx.wallet.check_token_spendable(&token).await.unwrap();
    assert!(!fully_spent);

    let entries = ctx.history.entries().await.unwrap();
    assert_eq!(entries.len(), 2);
    let paid = entries
        .iter()
        .find(|e| e.status == InvoiceStatus::Paid)
        .unwrap();
    let pending = entries
        .iter()
        .find(|e| e.status == InvoiceStatus::Pending)
        .unwrap();
    assert_eq!(paid.amount, -8);
    assert_eq!(pending.amount, -4);
    assert!(pending.token.is_some());
}

#[tokio::test]
async fn check_proofs_spendable_is_idempotent() {
    let proof = fixtures::proof(8);
    let y = proof.y().unwrap();
    let mut client = mint_with_swap(0);
    client.expect_post_check_state().returning(move |_, _| {
        Ok(cashu::nut07::CheckStateResponse {
            states: vec![cashu::nut07::ProofState {
                y,
                state: cashu::nut07::State::Spent,
                witness: None,
            }],
        })
    });
    let ctx = scenario(client);
    fund(&ctx, &[]).await;
    ctx.proofs
        .add(fixtures::mint_url(), vec![proof.clone()])
        .await
        .unwrap();

    let first = ctx
        .wallet
        .check_proofs_spendable(vec![proof.clone()], false)
        .await
        .unwrap();
    assert_eq!(first.len(), 1);
    assert!(ctx.proofs.all(fixtures::mint_url()).await.unwrap().is_empty());

    let second = ctx
        .wallet
        .check_proofs_spendable(vec![proof], false)
        .await
        .unwrap();
    assert_eq!(second.len(), 1);
    assert!(ctx.proofs.all(fixtures::mint_url()).await.unwrap().is_empty());
}
