//! Wraps [`BidClient`] with the durable [`BidStore`] write that spec.md §4.7
//! and §8 (P5) require on every submission attempt: "for every call to
//! `bid_client.submit_bid` that returns, there exists exactly one row in the
//! bid store whose `success` field agrees with the return value."
//!
//! Also implements the fail-closed half of §7's persistence-failure clause:
//! if the store write for a *successful* submission fails, further
//! submissions are refused outright rather than risking an unrecorded,
//! un-recoverable deposit.

use super::{BidClient, BidClientError, BidOutcome};
use crate::store::{BidInsert, BidStore, StoreError};
use crate::strategy::{BidSubmitter, ExecutionOutcome};
use alloy::primitives::{B256, TxHash};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, instrument, warn};

/// The [`BidSubmitter`] actually handed to the execution scheduler. Every
/// strategy that bids goes through this, never [`BidClient`] directly.
pub struct PersistingBidClient {
    inner: BidClient,
    store: BidStore,
    /// Set once a bid store write fails for a submission the coprocessor
    /// accepted — from that point on, this filler can no longer account for
    /// its own deposits, so it refuses to place more (spec.md §7).
    halted: AtomicBool,
}

impl PersistingBidClient {
    pub fn new(inner: BidClient, store: BidStore) -> Self {
        Self { inner, store, halted: AtomicBool::new(false) }
    }

    fn insert_for(commitment: [u8; 32], outcome: &Result<BidOutcome, BidClientError>) -> BidInsert {
        match outcome {
            Ok(bid_outcome) => BidInsert {
                commitment,
                submit_tx_hash: Some(bid_outcome.tx_hash.0),
                submit_block_hash: Some(bid_outcome.block_hash.0),
                success: true,
                error: None,
            },
            Err(error) => BidInsert {
                commitment,
                submit_tx_hash: None,
                submit_block_hash: None,
                success: false,
                error: Some(error.to_string()),
            },
        }
    }
}

#[async_trait]
impl BidSubmitter for PersistingBidClient {
    #[instrument(skip(self, user_op), fields(commitment = %hex::encode(commitment)))]
    async fn submit_bid(&self, commitment: [u8; 32], user_op: Vec<u8>) -> Result<ExecutionOutcome, String> {
        if self.halted.load(Ordering::Acquire) {
            return Err("bid submission halted: a prior successful bid failed to persist".to_string());
        }

        let outcome = self.inner.submit_bid(commitment, user_op).await;
        let insert = Self::insert_for(commitment, &outcome);
        let submission_succeeded = insert.success;

        if let Err(store_error) = self.store.insert(insert).await {
            return self.handle_store_failure(submission_succeeded, store_error, &outcome);
        }

        match outcome {
            Ok(bid_outcome) => Ok(ExecutionOutcome::BidSubmitted {
                tx_hash: TxHash::from(bid_outcome.tx_hash.0),
                block_hash: B256::from(bid_outcome.block_hash.0),
            }),
            Err(error) => Ok(ExecutionOutcome::Failed(error.to_string())),
        }
    }
}

impl PersistingBidClient {
    /// Retract a previously-placed bid and record the outcome in the bid
    /// store (spec.md §4.7 `mark_retracted`, scenario D): submits
    /// `intents.retractBid(commitment)` and, on success, marks the store's
    /// latest row for `commitment` retracted.
    ///
    /// A store-side `mark_retracted` failure does not roll back the
    /// on-chain retraction — the deposit really was released — so it is
    /// surfaced as an error for the caller's own recovery bookkeeping
    /// rather than triggering the submission-side fail-closed halt.
    #[instrument(skip(self), fields(commitment = %hex::encode(commitment)))]
    pub async fn retract_bid(&self, commitment: [u8; 32]) -> Result<BidOutcome, String> {
        let outcome = self.inner.retract_bid(commitment).await.map_err(|error| error.to_string())?;

        match self.store.mark_retracted(commitment, outcome.tx_hash.0).await {
            Ok(true) => {
                info!(commitment = %hex::encode(commitment), "bid_retracted");
                crate::metrics::record_bid_retracted();
            }
            Ok(false) => {
                warn!(commitment = %hex::encode(commitment), "retraction extrinsic succeeded but no bid store row matched");
            }
            Err(store_error) => {
                error!(%store_error, commitment = %hex::encode(commitment), "failed to record bid retraction in the store");
                return Err(format!(
                    "bid retracted on-chain but failed to persist ({store_error})"
                ));
            }
        }

        Ok(outcome)
    }

    fn handle_store_failure(
        &self,
        submission_succeeded: bool,
        store_error: StoreError,
        outcome: &Result<BidOutcome, BidClientError>,
    ) -> Result<ExecutionOutcome, String> {
        if submission_succeeded {
            self.halted.store(true, Ordering::Release);
            crate::metrics::record_bid_store_error("after_success");
            error!(%store_error, "bid store write failed after a successful submission; halting further bids");
            return Err(format!(
                "bid submitted successfully but failed to persist ({store_error}); halting further submissions"
            ));
        }

        crate::metrics::record_bid_store_error("after_failure");
        error!(%store_error, "bid store write failed for an already-failed submission");
        let reason = outcome.as_ref().err().map(|e| e.to_string()).unwrap_or_default();
        Err(format!("bid submission failed ({reason}) and the failure could not be persisted ({store_error})"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_for_success_carries_hashes() {
        let commitment = [1u8; 32];
        let outcome: Result<BidOutcome, BidClientError> = Ok(BidOutcome {
            tx_hash: subxt::utils::H256::repeat_byte(2),
            block_hash: subxt::utils::H256::repeat_byte(3),
        });
        let insert = PersistingBidClient::insert_for(commitment, &outcome);
        assert!(insert.success);
        assert_eq!(insert.submit_tx_hash, Some([2u8; 32]));
        assert_eq!(insert.submit_block_hash, Some([3u8; 32]));
        assert!(insert.error.is_none());
    }

    #[test]
    fn insert_for_failure_carries_error_text() {
        let commitment = [4u8; 32];
        let outcome: Result<BidOutcome, BidClientError> = Err(BidClientError::Decode("boom".to_string()));
        let insert = PersistingBidClient::insert_for(commitment, &outcome);
        assert!(!insert.success);
        assert!(insert.submit_tx_hash.is_none());
        assert!(insert.error.unwrap().contains("boom"));
    }
}
