//! The `Order` value (spec.md §3) and its supporting newtypes.
//!
//! An [`Order`] is immutable once decoded by order ingestion and is keyed
//! everywhere by its [`OrderId`], a commitment hash that is a pure function
//! of the order's other fields (P1 in spec.md §8).

use alloy::primitives::{U256, keccak256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte commitment hash identifying an order. Pure function of the
/// order's other fields — see [`Order::commitment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderId(pub [u8; 32]);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Opaque 32-byte originator identifier, or token identifier, or
/// beneficiary address. Chain families encode their native address/ID
/// representation into this fixed-width slot (e.g. an EVM address is
/// left-padded with zero bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opaque32(pub [u8; 32]);

impl fmt::Display for Opaque32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Serializes to the same `0x`-prefixed hex string its [`fmt::Display`] impl
/// produces.
impl serde::Serialize for Opaque32 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Deserializes from the same `0x`-prefixed hex string its [`fmt::Display`]
/// impl produces, matching the convention price-table and config JSON use
/// for every other fixed-width id in this crate.
impl<'de> serde::Deserialize<'de> for Opaque32 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = <String as serde::Deserialize>::deserialize(deserializer)?;
        let trimmed = raw.strip_prefix("0x").unwrap_or(&raw);
        let bytes = hex::decode(trimmed).map_err(serde::de::Error::custom)?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| serde::de::Error::custom(format!("expected 32 bytes, got {}", v.len())))?;
        Ok(Opaque32(array))
    }
}

/// An input escrowed by the user on the source chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub token_id: Opaque32,
    pub amount: U256,
}

/// An output the filler must deliver on the destination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub token_id: Opaque32,
    pub amount: U256,
    pub beneficiary: Opaque32,
}

/// Errors that can occur while decoding or validating an [`Order`].
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("order has no inputs")]
    NoInputs,
    #[error("order has no outputs")]
    NoOutputs,
    #[error("same-chain order inputs/outputs length mismatch: {inputs} inputs, {outputs} outputs")]
    SameChainLengthMismatch { inputs: usize, outputs: usize },
    #[error("chain identifier '{0}' is not in canonical <FAMILY>-<id> form")]
    InvalidChainId(String),
}

/// The central value of the intent-filler core (spec.md §3).
///
/// Immutable once constructed by order ingestion. `id` is always the
/// recomputed commitment of the other fields — see [`Order::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    pub user: Opaque32,
    pub source_chain: String,
    pub dest_chain: String,
    pub deadline: u64,
    pub nonce: u64,
    pub fees: U256,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub call_data: Option<Vec<u8>>,
    pub source_tx: Opaque32,
}

/// Wire form of an [`Order`]: every field but `id`. `id` is never trusted
/// off the wire — deserializing an `Order` always recomputes it through
/// [`Order::new`], the same path construction takes, so P1 (spec.md §8:
/// `commitment(o) == commitment(deserialize(serialize(o)))`) holds even if
/// a tampered or stale `id` were ever present on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OrderWire {
    user: Opaque32,
    source_chain: String,
    dest_chain: String,
    deadline: u64,
    nonce: u64,
    fees: U256,
    inputs: Vec<Input>,
    outputs: Vec<Output>,
    call_data: Option<Vec<u8>>,
    source_tx: Opaque32,
}

impl From<&Order> for OrderWire {
    fn from(order: &Order) -> Self {
        OrderWire {
            user: order.user,
            source_chain: order.source_chain.clone(),
            dest_chain: order.dest_chain.clone(),
            deadline: order.deadline,
            nonce: order.nonce,
            fees: order.fees,
            inputs: order.inputs.clone(),
            outputs: order.outputs.clone(),
            call_data: order.call_data.clone(),
            source_tx: order.source_tx,
        }
    }
}

impl Serialize for Order {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        OrderWire::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Order {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let wire = OrderWire::deserialize(deserializer)?;
        Order::new(
            wire.user,
            wire.source_chain,
            wire.dest_chain,
            wire.deadline,
            wire.nonce,
            wire.fees,
            wire.inputs,
            wire.outputs,
            wire.call_data,
            wire.source_tx,
        )
        .map_err(serde::de::Error::custom)
    }
}

impl Order {
    /// Construct an order, validating its invariants and computing its
    /// commitment id.
    ///
    /// Invariants enforced (spec.md §3):
    /// - `inputs` and `outputs` are each non-empty.
    /// - if `source_chain == dest_chain`, `inputs` and `outputs` match
    ///   element-wise in length.
    /// - both chain identifiers are in canonical `<FAMILY>-<id>` form.
    pub fn new(
        user: Opaque32,
        source_chain: String,
        dest_chain: String,
        deadline: u64,
        nonce: u64,
        fees: U256,
        inputs: Vec<Input>,
        outputs: Vec<Output>,
        call_data: Option<Vec<u8>>,
        source_tx: Opaque32,
    ) -> Result<Self, OrderError> {
        if inputs.is_empty() {
            return Err(OrderError::NoInputs);
        }
        if outputs.is_empty() {
            return Err(OrderError::NoOutputs);
        }
        if source_chain == dest_chain && inputs.len() != outputs.len() {
            return Err(OrderError::SameChainLengthMismatch {
                inputs: inputs.len(),
                outputs: outputs.len(),
            });
        }
        validate_chain_id(&source_chain)?;
        validate_chain_id(&dest_chain)?;

        let mut order = Order {
            id: OrderId([0u8; 32]),
            user,
            source_chain,
            dest_chain,
            deadline,
            nonce,
            fees,
            inputs,
            outputs,
            call_data,
            source_tx,
        };
        order.id = order.commitment();
        Ok(order)
    }

    /// The order's commitment hash. Pure function of every field except
    /// `id` itself and `source_tx` (the source transaction hash is a
    /// side-effect of *when* the order was placed, not part of what the
    /// user committed to).
    pub fn commitment(&self) -> OrderId {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.user.0);
        buf.extend_from_slice(self.source_chain.as_bytes());
        buf.push(0); // separator: chain identifiers are not length-prefixed elsewhere
        buf.extend_from_slice(self.dest_chain.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&self.deadline.to_be_bytes());
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        buf.extend_from_slice(&self.fees.to_be_bytes::<32>());
        for input in &self.inputs {
            buf.extend_from_slice(&input.token_id.0);
            buf.extend_from_slice(&input.amount.to_be_bytes::<32>());
        }
        for output in &self.outputs {
            buf.extend_from_slice(&output.token_id.0);
            buf.extend_from_slice(&output.amount.to_be_bytes::<32>());
            buf.extend_from_slice(&output.beneficiary.0);
        }
        if let Some(call_data) = &self.call_data {
            buf.extend_from_slice(call_data);
        }
        OrderId(keccak256(&buf).0)
    }

    pub const fn id(&self) -> OrderId {
        self.id
    }

    /// Sum of `amount` over every input. Does not convert to USD — see
    /// [`crate::pending::policy`] for value-weighted confirmation
    /// requirements.
    pub fn total_input_amount(&self) -> U256 {
        self.inputs.iter().fold(U256::ZERO, |acc, input| acc + input.amount)
    }
}

/// Parse and validate a chain identifier is in canonical `<FAMILY>-<id>`
/// form (e.g. `EVM-97`, `SUBSTRATE-1000`).
fn validate_chain_id(chain: &str) -> Result<(), OrderError> {
    let Some((family, id)) = chain.split_once('-') else {
        return Err(OrderError::InvalidChainId(chain.to_string()));
    };
    if family.is_empty() || id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(OrderError::InvalidChainId(chain.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order(source: &str, dest: &str) -> Result<Order, OrderError> {
        Order::new(
            Opaque32([1; 32]),
            source.to_string(),
            dest.to_string(),
            1_000,
            0,
            U256::from(5u64),
            vec![Input { token_id: Opaque32([2; 32]), amount: U256::from(100u64) }],
            vec![Output {
                token_id: Opaque32([3; 32]),
                amount: U256::from(100u64),
                beneficiary: Opaque32([4; 32]),
            }],
            None,
            Opaque32([9; 32]),
        )
    }

    #[test]
    fn commitment_is_pure() {
        let order = sample_order("EVM-97", "EVM-10200").unwrap();
        assert_eq!(order.id(), order.commitment());
    }

    #[test]
    fn commitment_is_deterministic_across_construction() {
        let a = sample_order("EVM-97", "EVM-10200").unwrap();
        let b = sample_order("EVM-97", "EVM-10200").unwrap();
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn commitment_survives_serialize_deserialize_round_trip() {
        let order = sample_order("EVM-97", "EVM-10200").unwrap();
        let json = serde_json::to_string(&order).unwrap();
        let round_tripped: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order.id(), round_tripped.commitment());
        assert_eq!(order, round_tripped);
    }

    #[test]
    fn differing_nonce_changes_commitment() {
        let a = sample_order("EVM-97", "EVM-10200").unwrap();
        let mut inputs = a.inputs.clone();
        inputs[0].amount = U256::from(101u64);
        let b = Order::new(
            a.user,
            a.source_chain.clone(),
            a.dest_chain.clone(),
            a.deadline,
            a.nonce,
            a.fees,
            inputs,
            a.outputs.clone(),
            None,
            a.source_tx,
        )
        .unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn empty_inputs_rejected() {
        let err = Order::new(
            Opaque32([1; 32]),
            "EVM-97".into(),
            "EVM-10200".into(),
            1_000,
            0,
            U256::ZERO,
            vec![],
            vec![Output {
                token_id: Opaque32([3; 32]),
                amount: U256::from(1u64),
                beneficiary: Opaque32([4; 32]),
            }],
            None,
            Opaque32([9; 32]),
        )
        .unwrap_err();
        assert!(matches!(err, OrderError::NoInputs));
    }

    #[test]
    fn same_chain_length_mismatch_rejected() {
        let err = Order::new(
            Opaque32([1; 32]),
            "EVM-97".into(),
            "EVM-97".into(),
            1_000,
            0,
            U256::ZERO,
            vec![Input { token_id: Opaque32([2; 32]), amount: U256::from(1u64) }],
            vec![
                Output { token_id: Opaque32([3; 32]), amount: U256::from(1u64), beneficiary: Opaque32([4; 32]) },
                Output { token_id: Opaque32([3; 32]), amount: U256::from(1u64), beneficiary: Opaque32([4; 32]) },
            ],
            None,
            Opaque32([9; 32]),
        )
        .unwrap_err();
        assert!(matches!(err, OrderError::SameChainLengthMismatch { .. }));
    }

    #[test]
    fn invalid_chain_id_rejected() {
        let err = sample_order("notcanonical", "EVM-10200").unwrap_err();
        assert!(matches!(err, OrderError::InvalidChainId(_)));
    }
}
