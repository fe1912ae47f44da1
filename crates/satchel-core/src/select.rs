// ----- standard library imports
use std::collections::HashMap;
// ----- extra library imports
use cashu::{Amount, KeySetInfo, nut00 as cdk00};
// ----- local imports
use crate::error::{Error, Result};
use crate::proofs::sum_proofs;

// ----- end imports

///////////////////////////////////////////// fee_for_proofs
/// Input fee for spending a proof set: `ceil(sum(input_fee_ppk) / 1000)`.
/// Keysets the mint no longer lists count as fee-free.
pub fn fee_for_proofs(proofs: &[cdk00::Proof], keysets: &[KeySetInfo]) -> Amount {
    let ppk_by_keyset: HashMap<cashu::Id, u64> =
        keysets.iter().map(|k| (k.id, k.input_fee_ppk)).collect();
    let mut sum_ppk = 0u64;
    for proof in proofs {
        match ppk_by_keyset.get(&proof.keyset_id) {
            Some(ppk) => sum_ppk += ppk,
            None => tracing::warn!("no keyset info for {}, assuming zero fee", proof.keyset_id),
        }
    }
    Amount::from(sum_ppk.div_ceil(1000))
}

///////////////////////////////////////////// select
/// Greedy selection of proofs covering `amount`, plus the input fee of the
/// selected set when `include_fees`. Returns an empty set when the balance
/// cannot cover the target.
pub fn select(
    proofs: &[cdk00::Proof],
    amount: Amount,
    include_fees: bool,
    keysets: &[KeySetInfo],
) -> Vec<cdk00::Proof> {
    let mut sorted: Vec<cdk00::Proof> = proofs.to_vec();
    sorted.sort_by_key(|p| std::cmp::Reverse(p.amount));

    let target = |selected: &[cdk00::Proof]| {
        if include_fees {
            amount + fee_for_proofs(selected, keysets)
        } else {
            amount
        }
    };

    let mut selected: Vec<cdk00::Proof> = Vec::new();
    for proof in sorted {
        if sum_proofs(&selected) >= target(&selected) {
            break;
        }
        selected.push(proof);
    }
    if sum_proofs(&selected) < target(&selected) {
        return Vec::new();
    }
    // drop small proofs made redundant by the big ones picked first
    while let Some(last) = selected.last().cloned() {
        let trimmed = &selected[..selected.len() - 1];
        if sum_proofs(trimmed) >= target(trimmed) {
            selected.pop();
            tracing::debug!("dropped redundant proof of {}", last.amount);
        } else {
            break;
        }
    }
    selected
}

///////////////////////////////////////////// select_base64_legacy
/// Drain strategy for balances stuck on legacy (base64-id) keysets: keep only
/// proofs whose keyset id is not hex-prefixed, largest first, until `amount`
/// is covered. Fee-unaware, used only when the primary selection has nothing
/// to work with.
pub fn select_base64_legacy(proofs: &[cdk00::Proof], amount: Amount) -> Vec<cdk00::Proof> {
    let mut legacy: Vec<cdk00::Proof> = proofs
        .iter()
        .filter(|p| !p.keyset_id.to_string().starts_with("00"))
        .cloned()
        .collect();
    legacy.sort_by_key(|p| std::cmp::Reverse(p.amount));

    let mut selected: Vec<cdk00::Proof> = Vec::new();
    for proof in legacy {
        if sum_proofs(&selected) >= amount {
            break;
        }
        selected.push(proof);
    }
    if sum_proofs(&selected) < amount {
        return Vec::new();
    }
    selected
}

///////////////////////////////////////////// spendable
/// Asserts the unreserved balance covers `amount` and hands the proofs back.
pub fn spendable(proofs: Vec<cdk00::Proof>, amount: Amount) -> Result<Vec<cdk00::Proof>> {
    let have = sum_proofs(&proofs);
    if have < amount {
        return Err(Error::BalanceTooLow { have, need: amount });
    }
    Ok(proofs)
}

///////////////////////////////////////////// split_amount
/// Binary decomposition of `v` into powers of two, ascending.
pub fn split_amount(v: Amount) -> Vec<Amount> {
    v.split()
}
