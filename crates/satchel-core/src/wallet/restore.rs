// ----- standard library imports
// ----- extra library imports
use cashu::{KeySet, MintUrl, nut00 as cdk00, nut07 as cdk07, nut09 as cdk09};
// ----- local imports
use crate::client::MintConnector as _;
use crate::error::Result;
use crate::proofs::{ProofRepository as _, Reservation};
use crate::wallet::Wallet;

// ----- end imports

// as recommended by NUT-13
const EMPTY_BATCHES_BEFORE_ABORT: usize = 3;
const RESTORE_BATCH_SIZE: u32 = 100;

impl Wallet {
    /// Recovers proofs for one keyset from the seed alone: derive premint
    /// batches, replay them against `/v1/restore`, keep what the mint still
    /// considers unspent. Stops after three consecutive empty batches and
    /// leaves the counter past the last restored index.
    pub async fn restore_keyset(&self, kid: cashu::Id) -> Result<usize> {
        let mint = self.registry.active_mint();
        let keyset = self.client.get_mint_keyset(mint.clone(), kid).await?;

        let mut zero_batches = 0usize;
        let mut total_restored = 0usize;
        let mut db_cursor = self.seed.counter(kid).await?;
        let mut cursor = db_cursor;
        while zero_batches < EMPTY_BATCHES_BEFORE_ABORT {
            let restored = self
                .restore_batch(&mint, &keyset, cursor, RESTORE_BATCH_SIZE)
                .await?;
            cursor += RESTORE_BATCH_SIZE;
            if restored == 0 {
                zero_batches += 1;
            } else {
                zero_batches = 0;
                self.seed
                    .bump_counter(kid, (cursor - db_cursor) as i64)
                    .await?;
                db_cursor = cursor;
                total_restored += restored;
            }
        }
        tracing::info!("restored {total_restored} proofs on keyset {kid}");
        Ok(total_restored)
    }

    async fn restore_batch(
        &self,
        mint: &MintUrl,
        keyset: &KeySet,
        counter: u32,
        batch_size: u32,
    ) -> Result<usize> {
        let seed = self.seed.seed().await?;
        let premints = cdk00::PreMintSecrets::restore_batch(
            keyset.id,
            &seed,
            counter,
            counter + batch_size - 1,
        )?;
        let request = cdk09::RestoreRequest {
            outputs: premints.blinded_messages(),
        };
        let cdk09::RestoreResponse {
            outputs,
            signatures,
            ..
        } = self.client.post_restore(mint.clone(), request).await?;

        let mut proofs: Vec<cdk00::Proof> = Vec::new();
        let mut premints_cursor = premints.iter();
        for (output, signature) in outputs.into_iter().zip(signatures.into_iter()) {
            let premint = loop {
                let Some(premint) = premints_cursor.next() else {
                    tracing::error!("restore response outputs do not match the premint batch");
                    return Ok(proofs.len());
                };
                if premint.blinded_message == output {
                    break premint;
                }
            };
            let Some(key) = keyset.keys.get(&signature.amount) else {
                tracing::error!(
                    "no mint key for amount {} in keyset {}",
                    signature.amount,
                    keyset.id,
                );
                continue;
            };
            let Ok(c) = cashu::dhke::unblind_message(&signature.c, &premint.r, key) else {
                tracing::error!(
                    "unblind_message failed: keyset {}, amount {}",
                    keyset.id,
                    signature.amount,
                );
                continue;
            };
            proofs.push(cdk00::Proof::new(
                signature.amount,
                signature.keyset_id,
                premint.secret.clone(),
                c,
            ));
        }
        if proofs.is_empty() {
            return Ok(0);
        }
        let restored = proofs.len();

        let mut ys = Vec::with_capacity(proofs.len());
        for proof in &proofs {
            ys.push(proof.y()?);
        }
        let request = cdk07::CheckStateRequest { ys: ys.clone() };
        let cdk07::CheckStateResponse { states } =
            self.client.post_check_state(mint.clone(), request).await?;
        for state in states {
            let Some(position) = ys.iter().position(|y| *y == state.y) else {
                continue;
            };
            match state.state {
                cdk07::State::Unspent => {
                    self.proofs
                        .add(mint.clone(), vec![proofs[position].clone()])
                        .await?;
                }
                cdk07::State::Pending | cdk07::State::PendingSpent => {
                    self.proofs
                        .add(mint.clone(), vec![proofs[position].clone()])
                        .await?;
                    self.proofs
                        .set_reservation(
                            mint.clone(),
                            vec![proofs[position].clone()],
                            Reservation::Reserved(None),
                        )
                        .await?;
                }
                _ => {}
            }
        }
        Ok(restored)
    }
}
