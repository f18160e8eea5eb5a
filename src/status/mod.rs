//! Order-Status Client (spec.md §6): a thin read-only adapter to an
//! external status indexer. Out of scope is the indexer itself (spec.md
//! §1 "the secondary indexer that mirrors chain state for status
//! streaming (consumed only as a read-only service)") — this module is
//! only the client side.
//!
//! Grounded in the donor's `pricing::radius_client::RadiusPricingClient`
//! shape (bearer-auth `reqwest::Client`, typed JSON response, typed error
//! enum), repointed from a quoting endpoint to a status lookup.

use crate::order::OrderId;
use crate::retry::{backoff, is_transient_reqwest_error};
use backon::Retryable;
use serde::Deserialize;
use tracing::{debug, instrument};

/// An order's last-known status as reported by the external indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Filled,
    Expired,
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    status: OrderStatus,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StatusClientError {
    #[error("status API request failed: {0}")]
    RequestFailed(#[source] reqwest::Error),
    #[error("order {0} is not known to the status indexer")]
    NotFound(OrderId),
    #[error("status API error ({status}, {error_code}): {message}")]
    ApiError { status: u16, error_code: String, message: String },
    #[error("invalid status response: {0}")]
    InvalidResponse(#[source] reqwest::Error),
}

/// Read-only adapter to the external order-status indexer. Consumed by
/// strategies (to avoid double-filling an order someone else already
/// filled) and by tests; never mutates anything.
#[derive(Debug, Clone)]
pub struct StatusClient {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl StatusClient {
    pub fn new(base_url: String, bearer_token: Option<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url, bearer_token }
    }

    /// The indexer's last-known status for `order_id`. A 404 is surfaced as
    /// [`StatusClientError::NotFound`], not as a retryable condition.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn status_of(&self, order_id: OrderId) -> Result<OrderStatus, StatusClientError> {
        let url = format!("{}/api/orders/{}", self.base_url, order_id);

        let send_request = || async {
            let mut request = self.client.get(&url);
            if let Some(token) = &self.bearer_token {
                request = request.bearer_auth(token);
            }
            request.send().await
        };

        debug!(%order_id, "querying order status");
        let response = send_request
            .retry(backoff())
            .when(is_transient_reqwest_error)
            .notify(|error, duration| {
                crate::metrics::record_connection_attempt(crate::metrics::ConnectionTarget::StatusClient);
                debug!(%error, retry_in_ms = duration.as_millis(), "retrying status API request");
            })
            .await
            .map_err(StatusClientError::RequestFailed)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StatusClientError::NotFound(order_id));
        }
        if !status.is_success() {
            let status_code = status.as_u16();
            return Err(match response.json::<ErrorResponse>().await {
                Ok(body) => StatusClientError::ApiError {
                    status: status_code,
                    error_code: body.error,
                    message: body.message,
                },
                Err(_) => StatusClientError::ApiError {
                    status: status_code,
                    error_code: "UNKNOWN".to_string(),
                    message: format!("HTTP {status_code}"),
                },
            });
        }

        let body: StatusResponse =
            response.json().await.map_err(StatusClientError::InvalidResponse)?;
        Ok(body.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_deserializes_from_snake_case() {
        let status: OrderStatus = serde_json::from_str("\"filled\"").unwrap();
        assert_eq!(status, OrderStatus::Filled);
    }
}
