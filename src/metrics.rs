//! Metric descriptions and recorders for the intent-filler core (spec.md
//! §6 "Outputs: ... Structured log events"). Registered once through a
//! `LazyLock<()>` description block, matching `init4`-style services in the
//! retrieved pack.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::LazyLock;
use std::time::Duration;

const UPTIME_SECONDS: &str = "filler.uptime_seconds";
const ORDERS_RECEIVED: &str = "filler.orders_received";
const ORDERS_DROPPED: &str = "filler.orders_dropped";
const ORDERS_FILLED: &str = "filler.orders_filled";
const PENDING_EXHAUSTED: &str = "filler.pending_exhausted";
const STRATEGY_ERRORS: &str = "filler.strategy_errors";
const BIDS_SUBMITTED: &str = "filler.bids_submitted";
const BIDS_RETRACTED: &str = "filler.bids_retracted";
const BID_STORE_ERRORS: &str = "filler.bid_store_errors";
const CONNECTION_RETRY_ATTEMPTS: &str = "filler.connection_retry_attempts";
const EVALUATION_DURATION_SECONDS: &str = "filler.evaluation_duration_seconds";
const PENDING_QUEUE_DEPTH: &str = "filler.pending_queue_depth";

/// Register every metric description with the exporter. Called once from
/// [`crate::FillerTask::initialize`]; harmless to call more than once since
/// [`LazyLock`] only runs the initializer the first time.
pub(crate) fn init() {
    LazyLock::force(&DESCRIPTIONS);
}

static DESCRIPTIONS: LazyLock<()> = LazyLock::new(|| {
    describe_gauge!(UPTIME_SECONDS, "Seconds since the filler started");
    describe_counter!(ORDERS_RECEIVED, "Orders decoded from OrderPlaced events (label: chain)");
    describe_counter!(
        ORDERS_DROPPED,
        "Orders dropped before execution (label: reason = no_viable_strategy / \
        below_threshold / pending_exhausted)"
    );
    describe_counter!(ORDERS_FILLED, "Orders successfully filled (label: chain, strategy)");
    describe_counter!(
        PENDING_EXHAUSTED,
        "Orders that exhausted their recheck budget in the pending-confirmation queue"
    );
    describe_counter!(STRATEGY_ERRORS, "Strategy execute() failures (label: strategy)");
    describe_counter!(BIDS_SUBMITTED, "Coprocessor bid submissions (label: result = success / failure)");
    describe_counter!(BIDS_RETRACTED, "Coprocessor bid retractions");
    describe_counter!(BID_STORE_ERRORS, "Bid store write failures (label: kind)");
    describe_counter!(
        CONNECTION_RETRY_ATTEMPTS,
        "Connection retry attempts during initialization (label: target)"
    );
    describe_histogram!(EVALUATION_DURATION_SECONDS, "Duration of one strategy evaluation pass");
    describe_gauge!(PENDING_QUEUE_DEPTH, "Orders currently held in the pending-confirmation queue");
});

#[derive(Clone, Copy)]
pub(crate) enum ConnectionTarget {
    ChainClient,
    BidClient,
    StatusClient,
}

impl ConnectionTarget {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            ConnectionTarget::ChainClient => "chain-client",
            ConnectionTarget::BidClient => "bid-client",
            ConnectionTarget::StatusClient => "status-client",
        }
    }
}

/// Record uptime gauge.
pub(crate) fn record_uptime(elapsed: Duration) {
    gauge!(UPTIME_SECONDS).set(elapsed.as_secs_f64());
}

/// Record an order decoded by ingestion on `chain`.
pub(crate) fn record_order_received(chain: &str) {
    counter!(ORDERS_RECEIVED, "chain" => chain.to_string()).increment(1);
}

/// Record an order dropped for `reason` (spec.md §7 "Bounded domain failure").
pub(crate) fn record_order_dropped(reason: &str) {
    counter!(ORDERS_DROPPED, "reason" => reason.to_string()).increment(1);
}

/// Record an order successfully filled.
pub(crate) fn record_order_filled(chain: &str, strategy: &str) {
    counter!(ORDERS_FILLED, "chain" => chain.to_string(), "strategy" => strategy.to_string()).increment(1);
}

/// Record an order exhausting its recheck budget in the pending queue.
pub(crate) fn record_pending_exhausted() {
    counter!(PENDING_EXHAUSTED).increment(1);
}

/// Record a strategy `execute` failure.
pub(crate) fn record_strategy_error(strategy: &str) {
    counter!(STRATEGY_ERRORS, "strategy" => strategy.to_string()).increment(1);
}

/// Record a coprocessor bid submission outcome.
pub(crate) fn record_bid_submitted(success: bool) {
    counter!(BIDS_SUBMITTED, "result" => if success { "success" } else { "failure" }).increment(1);
}

/// Record a coprocessor bid retraction.
pub(crate) fn record_bid_retracted() {
    counter!(BIDS_RETRACTED).increment(1);
}

/// Record a bid store write failure. `kind` distinguishes an ordinary
/// insert failure from the fund-loss-risk case of a failed insert for a
/// *successful* submission (spec.md §7 "Persistence failure").
pub(crate) fn record_bid_store_error(kind: &str) {
    counter!(BID_STORE_ERRORS, "kind" => kind.to_string()).increment(1);
}

/// Record a connection retry attempt for the given target.
pub(crate) fn record_connection_attempt(target: ConnectionTarget) {
    counter!(CONNECTION_RETRY_ATTEMPTS, "target" => target.as_str()).increment(1);
}

/// Record the duration of one strategy evaluation pass.
pub(crate) fn record_evaluation_duration(elapsed: Duration) {
    histogram!(EVALUATION_DURATION_SECONDS).record(elapsed.as_secs_f64());
}

/// Record the current depth of the pending-confirmation queue.
pub(crate) fn record_pending_queue_depth(depth: usize) {
    gauge!(PENDING_QUEUE_DEPTH).set(depth as f64);
}
