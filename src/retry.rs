//! A single consolidated retry/backoff policy (spec.md §9 design notes:
//! "Retries scattered across helpers... consolidate. Every RPC call goes
//! through one retry/backoff policy; strategies never implement their own
//! retry loops.").
//!
//! Every transient-I/O call site in this crate — chain client connects,
//! order ingestion reconnects, and the coprocessor bid client's WebSocket
//! session — retries through [`backoff`] and classifies errors with
//! [`is_transient_transport_error`]/[`is_transient_reqwest_error`]. This
//! mirrors `filler_task/initialization.rs`'s `backoff()`/
//! `is_transient_transport_error` in the donor codebase, generalized so it
//! is no longer private to one module.

use alloy::transports::{RpcError, TransportErrorKind};
use backon::ExponentialBuilder;
use std::time::Duration;

/// The one retry/backoff policy shape used throughout this crate.
pub fn backoff() -> ExponentialBuilder {
    ExponentialBuilder::new()
        .with_factor(1.5)
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(10))
        .without_max_times()
}

/// Whether an alloy transport error is transient (worth retrying) as
/// opposed to a permanent local usage / serialization error.
pub fn is_transient_transport_error(err: &RpcError<TransportErrorKind>) -> bool {
    match err {
        RpcError::ErrorResp(error) => error.is_retry_err(),
        RpcError::NullResp
        | RpcError::UnsupportedFeature(_)
        | RpcError::LocalUsageError(_)
        | RpcError::SerError(_)
        | RpcError::DeserError { .. } => false,
        RpcError::Transport(error_kind) => error_kind.is_retry_err(),
    }
}

/// Whether a reqwest error is transient (timeout, connect failure, 5xx, or
/// 429) as opposed to a permanent client error.
pub fn is_transient_reqwest_error(err: &reqwest::Error) -> bool {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        return true;
    }
    if let Some(status) = err.status() {
        return status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS;
    }
    false
}

/// Whether an order ingestion (re)connect failure wraps a transient `alloy`
/// transport error, as opposed to a permanent misconfiguration (e.g.
/// subscribing over a non-pubsub transport). A non-downcastable error — the
/// registry reporting an unknown chain, say — is treated as permanent too,
/// so a structural failure fails closed instead of retrying forever.
pub fn is_transient_ingestion_error(err: &eyre::Report) -> bool {
    err.downcast_ref::<RpcError<TransportErrorKind>>()
        .map(is_transient_transport_error)
        .unwrap_or(false)
}
