//! Coprocessor Bid Client (spec.md §4.6): a single persistent WebSocket
//! session to the coprocessor chain, wrapping the `intents.placeBid` /
//! `intents.retractBid` extrinsics and the double-map + off-chain-indexed
//! storage read path.
//!
//! Grounded in the donor's connection-lifecycle shape (one long-lived
//! session, reconnect-with-backoff, `#[instrument]`-logged RPC calls) from
//! `filler_task/initialization.rs`, generalized from an `alloy` EVM provider
//! to a `subxt` Substrate-style session since the coprocessor is not an EVM
//! chain (spec.md §6 "Coprocessor extrinsics... must be encodable by the
//! filler's signing key (Sr25519)").

pub mod codec;
mod persisting;

pub use codec::{Bid, CodecError, Signature, SignatureScheme};
pub use persisting::PersistingBidClient;

use crate::retry::backoff;
use crate::strategy::{BidSubmitter, ExecutionOutcome};
use async_trait::async_trait;
use backon::Retryable;
use subxt::backend::rpc::{RpcClient, rpc_params};
use subxt::dynamic::Value;
use subxt::{OnlineClient, PolkadotConfig};
use subxt_signer::sr25519::Keypair;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

const OFF_CHAIN_KEY_PREFIX: &[u8] = b"intents::bid::";

/// One filler's bid against a commitment, as read back from the coprocessor
/// (spec.md §3 `FillerBid`): the on-chain deposit plus the decoded
/// off-chain payload.
#[derive(Debug, Clone)]
pub struct FillerBid {
    pub filler: [u8; 32],
    pub deposit: u128,
    pub signature: Signature,
    pub bid: Bid,
}

#[derive(Debug, thiserror::Error)]
pub enum BidClientError {
    #[error("coprocessor RPC error: {0}")]
    Rpc(#[from] subxt::Error),
    #[error("extrinsic for commitment {commitment} failed: {reason}")]
    ExtrinsicFailed { commitment: String, reason: String },
    #[error("failed to decode storage value: {0}")]
    Decode(String),
    #[error("failed to decode off-chain bid blob: {0}")]
    Codec(#[from] CodecError),
}

/// Outcome of a successful extrinsic submission (spec.md §4.6
/// `submit_bid`/`retract_bid`).
#[derive(Debug, Clone, Copy)]
pub struct BidOutcome {
    pub tx_hash: subxt::utils::H256,
    pub block_hash: subxt::utils::H256,
}

/// A persistent session against the coprocessor chain.
///
/// `client` is wrapped in an async `RwLock` so a dropped-connection
/// reconnect can swap it out from under in-flight callers without requiring
/// `&mut self` at every call site — callers only ever hold the read guard
/// for the duration of one RPC.
pub struct BidClient {
    url: String,
    signer: Keypair,
    client: RwLock<OnlineClient<PolkadotConfig>>,
}

impl BidClient {
    /// Connect to the coprocessor chain's WebSocket endpoint, retrying
    /// transient connection failures with the crate's shared backoff
    /// policy (spec.md §4.6 "disconnects trigger reconnect").
    #[instrument(skip(signer), fields(%url))]
    pub async fn connect(url: String, signer: Keypair) -> eyre::Result<Self> {
        let client = Self::connect_inner(&url).await?;
        Ok(Self { url, signer, client: RwLock::new(client) })
    }

    async fn connect_inner(url: &str) -> eyre::Result<OnlineClient<PolkadotConfig>> {
        let rpc_client = RpcClient::from_url(url).await?;
        let client = (|| OnlineClient::<PolkadotConfig>::from_rpc_client(rpc_client.clone()))
            .retry(backoff())
            .notify(|error, duration| {
                crate::metrics::record_connection_attempt(crate::metrics::ConnectionTarget::BidClient);
                warn!(error = ?error, retry_in_ms = duration.as_millis(), "transient error connecting to coprocessor");
            })
            .await?;
        info!("connected to coprocessor");
        Ok(client)
    }

    async fn reconnect(&self) -> Result<(), BidClientError> {
        let fresh = Self::connect_inner(&self.url).await.map_err(|e| BidClientError::Rpc(subxt::Error::Other(e.to_string())))?;
        *self.client.write().await = fresh;
        Ok(())
    }

    /// Sign and submit `intents.placeBid(commitment, user_op)`, resolving
    /// once the extrinsic reaches `InBlock` (spec.md §4.6: "resolve when it
    /// is `InBlock` or `Finalized`").
    #[instrument(skip(self, user_op), fields(commitment = %hex::encode(commitment)))]
    pub async fn submit_bid(&self, commitment: [u8; 32], user_op: Vec<u8>) -> Result<BidOutcome, BidClientError> {
        self.submit_extrinsic("placeBid", commitment, vec![
            Value::from_bytes(commitment),
            Value::from_bytes(user_op),
        ])
        .await
    }

    /// Sign and submit `intents.retractBid(commitment)`, releasing the
    /// filler's deposit.
    #[instrument(skip(self), fields(commitment = %hex::encode(commitment)))]
    pub async fn retract_bid(&self, commitment: [u8; 32]) -> Result<BidOutcome, BidClientError> {
        self.submit_extrinsic("retractBid", commitment, vec![Value::from_bytes(commitment)]).await
    }

    async fn submit_extrinsic(
        &self,
        call_name: &'static str,
        commitment: [u8; 32],
        args: Vec<Value>,
    ) -> Result<BidOutcome, BidClientError> {
        let call = subxt::dynamic::tx("Intents", call_name, args);

        let submit = || async {
            let client = self.client.read().await;
            let progress =
                client.tx().sign_and_submit_then_watch_default(&call, &self.signer).await?;
            progress.wait_for_in_block().await
        };

        let in_block = match submit.retry(backoff()).await {
            Ok(block) => block,
            Err(error) => {
                debug!(%error, "retrying bid extrinsic submission after reconnect");
                self.reconnect().await?;
                return Err(BidClientError::Rpc(error));
            }
        };

        let events = in_block.wait_for_success().await.map_err(|error| BidClientError::ExtrinsicFailed {
            commitment: hex::encode(commitment),
            reason: error.to_string(),
        })?;
        let _ = events;

        Ok(BidOutcome { tx_hash: in_block.extrinsic_hash(), block_hash: in_block.block_hash() })
    }

    /// Two-step read of every filler's bid against `commitment` (spec.md
    /// §4.6 `bids_for`): enumerate the on-chain double map, then fetch and
    /// decode each filler's off-chain payload.
    #[instrument(skip(self), fields(commitment = %hex::encode(commitment)))]
    pub async fn bids_for(&self, commitment: [u8; 32]) -> Result<Vec<FillerBid>, BidClientError> {
        let deposits = self.enumerate_deposits(commitment).await?;
        let mut bids = Vec::with_capacity(deposits.len());

        for (filler, deposit) in deposits {
            let key = Self::off_chain_key(commitment, filler);
            match self.fetch_off_chain(&key).await? {
                Some(blob) => match codec::decode_off_chain_blob(&blob) {
                    Ok((signature, bid)) => bids.push(FillerBid { filler, deposit, signature, bid }),
                    Err(error) => warn!(%error, filler = %hex::encode(filler), "failed to decode off-chain bid blob, skipping"),
                },
                None => debug!(filler = %hex::encode(filler), "no off-chain bid payload found, skipping"),
            }
        }

        Ok(bids)
    }

    async fn enumerate_deposits(&self, commitment: [u8; 32]) -> Result<Vec<([u8; 32], u128)>, BidClientError> {
        let query = subxt::dynamic::storage("Intents", "Bids", vec![Value::from_bytes(commitment)]);
        let client = self.client.read().await;
        let storage = client.storage().at_latest().await?;

        let mut results = Vec::new();
        let mut iter = storage.iter(query).await?;
        while let Some(entry) = iter.next().await {
            let entry = entry?;
            let filler = Self::decode_filler_key(entry.key_bytes())?;
            let deposit = entry
                .value
                .as_u128()
                .ok_or_else(|| BidClientError::Decode("deposit value was not an integer".to_string()))?;
            results.push((filler, deposit));
        }
        Ok(results)
    }

    fn decode_filler_key(raw_key: &[u8]) -> Result<[u8; 32], BidClientError> {
        if raw_key.len() < 32 {
            return Err(BidClientError::Decode("storage key shorter than an AccountId32".to_string()));
        }
        let tail = &raw_key[raw_key.len() - 32..];
        Ok(tail.try_into().expect("length checked above"))
    }

    fn off_chain_key(commitment: [u8; 32], filler: [u8; 32]) -> Vec<u8> {
        let mut key = Vec::with_capacity(OFF_CHAIN_KEY_PREFIX.len() + 64);
        key.extend_from_slice(OFF_CHAIN_KEY_PREFIX);
        key.extend_from_slice(&commitment);
        key.extend_from_slice(&filler);
        key
    }

    /// Fetch a raw off-chain-indexed storage value. A `None` result is
    /// logged by the caller and skipped, not treated as an error (spec.md
    /// §4.6 "Off-chain fetches that return `None` are logged and skipped,
    /// not fatal").
    async fn fetch_off_chain(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BidClientError> {
        let client = self.client.read().await;
        let hex_key = format!("0x{}", hex::encode(key));
        let response: Option<String> =
            client.rpc().request("state_getStorage", rpc_params![hex_key]).await?;
        response
            .map(|hex_value| {
                let trimmed = hex_value.strip_prefix("0x").unwrap_or(&hex_value);
                hex::decode(trimmed).map_err(|e| BidClientError::Decode(e.to_string()))
            })
            .transpose()
    }
}

/// Adapts [`BidClient`] to the strategy layer's narrow, storage-blind
/// [`BidSubmitter`] seam — strategies only ever see `submit_bid`, never the
/// read path or the raw `subxt` session.
#[async_trait]
impl BidSubmitter for BidClient {
    async fn submit_bid(&self, commitment: [u8; 32], user_op: Vec<u8>) -> Result<ExecutionOutcome, String> {
        match BidClient::submit_bid(self, commitment, user_op).await {
            Ok(outcome) => Ok(ExecutionOutcome::BidSubmitted {
                tx_hash: alloy::primitives::TxHash::from(outcome.tx_hash.0),
                block_hash: alloy::primitives::B256::from(outcome.block_hash.0),
            }),
            Err(error) => Ok(ExecutionOutcome::Failed(error.to_string())),
        }
    }
}
