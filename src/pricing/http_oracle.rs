//! An HTTP-backed [`PriceOracle`]: queries an external quote API for the
//! USD-equivalent value of a token amount.
//!
//! Grounded in the donor's `pricing::radius_client::RadiusPricingClient`
//! (bearer-auth `reqwest::Client`, typed JSON response, typed error enum) —
//! the donor's version did two-round DEX-output-split quoting, which is
//! strategy-internal math out of this core's scope (spec.md §1); this
//! keeps only the part the core actually needs, a single USD-value lookup
//! per `(chain, token, amount)`.

use crate::order::Opaque32;
use crate::pending::PriceOracle;
use crate::retry::{backoff, is_transient_reqwest_error};
use alloy::primitives::U256;
use backon::Retryable;
use serde::Deserialize;
use tracing::{debug, trace};

/// Price response from the external quote API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    usd_value: String,
}

/// Error response body from the quote API.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum HttpPriceOracleError {
    #[error("price API request failed: {0}")]
    RequestFailed(#[source] reqwest::Error),
    #[error("price API error ({status}, {error_code}): {message}")]
    ApiError { status: u16, error_code: String, message: String },
    #[error("invalid price response: {0}")]
    InvalidResponse(#[source] Box<dyn core::error::Error + Send + Sync>),
}

/// Queries `{base_url}/api/price` for the USD value of `amount` units of
/// `token` on `chain`, with bearer auth and the crate's shared retry policy.
#[derive(Debug, Clone)]
pub struct HttpPriceOracle {
    client: reqwest::Client,
    base_url: String,
    bearer_token: String,
}

impl HttpPriceOracle {
    pub fn new(base_url: String, bearer_token: String) -> Self {
        Self { client: reqwest::Client::new(), base_url, bearer_token }
    }

    async fn request_quote(
        &self,
        chain: &str,
        token: Opaque32,
        amount: U256,
    ) -> Result<U256, HttpPriceOracleError> {
        let url = format!("{}/api/price", self.base_url);

        let send_request = || async {
            self.client
                .get(&url)
                .bearer_auth(&self.bearer_token)
                .query(&[
                    ("chain", chain.to_string()),
                    ("token", token.to_string()),
                    ("amount", amount.to_string()),
                ])
                .send()
                .await
        };

        debug!(%chain, %token, %amount, "requesting price quote");
        let response = send_request
            .retry(backoff())
            .when(is_transient_reqwest_error)
            .await
            .map_err(HttpPriceOracleError::RequestFailed)?;

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            return Err(match response.json::<ErrorResponse>().await {
                Ok(body) => HttpPriceOracleError::ApiError {
                    status: status_code,
                    error_code: body.error,
                    message: body.message,
                },
                Err(_) => HttpPriceOracleError::ApiError {
                    status: status_code,
                    error_code: "UNKNOWN".to_string(),
                    message: format!("HTTP {status_code}"),
                },
            });
        }

        let quote: QuoteResponse = response
            .json()
            .await
            .map_err(|error| HttpPriceOracleError::InvalidResponse(Box::new(error)))?;
        let value = quote
            .usd_value
            .parse::<U256>()
            .map_err(|error| HttpPriceOracleError::InvalidResponse(Box::new(error)))?;
        trace!(%chain, %token, usd_value = %value, "price quote resolved");
        Ok(value)
    }
}

impl PriceOracle for HttpPriceOracle {
    type Error = HttpPriceOracleError;

    async fn usd_value(&self, chain: &str, token: Opaque32, amount: U256) -> Result<U256, Self::Error> {
        self.request_quote(chain, token, amount).await
    }
}
