//! HTTP client for the x402 payment gateway.
//!
//! Every request carries the `X-Network-ID` header and runs behind a
//! consecutive-failures circuit breaker so a dead gateway fails fast
//! instead of queueing thirty-second timeouts.

use chrono::Utc;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::domain::{NetworkStats, NewPaymentRequest, PaymentMethod, PaymentOutcome, PaymentRequest};

pub const PAYMENT_REQUIRED_STATUS: u16 = 402;
pub const CHALLENGE_SCHEME: &str = "x402";

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid response from gateway: {0}")]
    InvalidResponse(String),

    #[error("gateway circuit breaker is open")]
    CircuitOpen,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitPaymentBody<'a> {
    request_id: &'a str,
    transaction_hash: &'a str,
    chain_id: u64,
    timestamp: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyBody<'a> {
    request_id: &'a str,
    transaction_hash: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    verified: bool,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    payments: Vec<PaymentOutcome>,
}

/// Challenge payload carried by a 402 response. The gateway names the id
/// field `requestId` and defaults currency/method/chain when omitted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChallengePayload {
    request_id: String,
    amount: bigdecimal::BigDecimal,
    #[serde(default)]
    currency: Option<String>,
    recipient: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    method: PaymentMethod,
    #[serde(default)]
    chain_id: Option<u64>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    expires_at: Option<chrono::DateTime<Utc>>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

/// Builds a [`PaymentRequest`] from a "payment required" response. Returns
/// `None` for anything that is not a well-formed x402 challenge — absence
/// of a challenge is a normal outcome, not an error.
pub fn parse_payment_request(
    status: u16,
    challenge_header: Option<&str>,
    body: &str,
) -> Option<PaymentRequest> {
    if status != PAYMENT_REQUIRED_STATUS {
        return None;
    }

    let header = challenge_header?;
    if !header.starts_with(CHALLENGE_SCHEME) {
        return None;
    }

    let payload: ChallengePayload = serde_json::from_str(body).ok()?;

    Some(PaymentRequest {
        id: payload.request_id,
        amount: payload.amount,
        currency: payload.currency.unwrap_or_else(|| "ETH".to_string()),
        recipient: payload.recipient,
        description: payload.description,
        method: payload.method,
        chain_id: payload.chain_id.unwrap_or(1),
        expires_at: payload.expires_at,
        metadata: payload.metadata,
    })
}

/// HTTP client for the payment gateway.
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl GatewayClient {
    pub fn new(base_url: String, network_id: &str, timeout: Duration) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(network_id) {
            headers.insert("X-Network-ID", value);
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(Duration::from_secs(60), Duration::from_secs(120));
        let policy = failure_policy::consecutive_failures(3, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Self {
            client,
            base_url,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker.
    pub fn circuit_state(&self) -> &'static str {
        if self.circuit_breaker.is_call_permitted() {
            "closed"
        } else {
            "open"
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn guarded<T, F>(&self, fut: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        match self.circuit_breaker.call(fut).await {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitOpen),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }

    /// Sends the caller's intent; the server assigns the request id.
    pub async fn create_payment(
        &self,
        intent: &NewPaymentRequest,
    ) -> Result<PaymentRequest, GatewayError> {
        let client = self.client.clone();
        let url = self.url("/payments/create");
        let body = intent.clone();

        self.guarded(async move {
            let response = client.post(&url).json(&body).send().await?;
            Self::read_json(response).await
        })
        .await
    }

    /// Submits proof of an on-chain transfer for a payment request.
    pub async fn submit_payment(
        &self,
        request_id: &str,
        transaction_hash: &str,
        chain_id: u64,
    ) -> Result<PaymentOutcome, GatewayError> {
        let client = self.client.clone();
        let url = self.url("/payments/submit");
        let body = serde_json::to_value(SubmitPaymentBody {
            request_id,
            transaction_hash,
            chain_id,
            timestamp: Utc::now().timestamp_millis(),
        })
        .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        self.guarded(async move {
            let response = client.post(&url).json(&body).send().await?;
            Self::read_json(response).await
        })
        .await
    }

    pub async fn payment_status(&self, request_id: &str) -> Result<PaymentOutcome, GatewayError> {
        let client = self.client.clone();
        let url = self.url(&format!("/payments/{}/status", request_id));

        self.guarded(async move {
            let response = client.get(&url).send().await?;
            Self::read_json(response).await
        })
        .await
    }

    /// Advisory confirmation check; the caller decides what a transport
    /// failure means.
    pub async fn verify_payment(
        &self,
        request_id: &str,
        transaction_hash: &str,
    ) -> Result<bool, GatewayError> {
        let client = self.client.clone();
        let url = self.url("/payments/verify");
        let body = serde_json::to_value(VerifyBody {
            request_id,
            transaction_hash,
        })
        .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        self.guarded(async move {
            let response = client.post(&url).json(&body).send().await?;
            let parsed: VerifyResponse = Self::read_json(response).await?;
            Ok(parsed.verified)
        })
        .await
    }

    pub async fn payment_history(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<PaymentOutcome>, GatewayError> {
        let client = self.client.clone();
        let url = self.url("/payments/history");
        let address = address.to_string();

        self.guarded(async move {
            let response = client
                .get(&url)
                .query(&[("address", address.as_str()), ("limit", &limit.to_string())])
                .send()
                .await?;
            let parsed: HistoryResponse = Self::read_json(response).await?;
            Ok(parsed.payments)
        })
        .await
    }

    pub async fn network_stats(&self) -> Result<NetworkStats, GatewayError> {
        let client = self.client.clone();
        let url = self.url("/network/stats");

        self.guarded(async move {
            let response = client.get(&url).send().await?;
            Self::read_json(response).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PaymentStatus;
    use std::str::FromStr;

    const CHALLENGE_BODY: &str = r#"{
        "requestId": "req-42",
        "amount": "0.002",
        "currency": "ETH",
        "recipient": "0x2222222222222222222222222222222222222222",
        "method": "direct",
        "chainId": 8453,
        "expiresAt": 1893456000000
    }"#;

    fn gateway(url: String) -> GatewayClient {
        GatewayClient::new(url, "x402-testnet", Duration::from_secs(5))
    }

    #[test]
    fn parses_402_challenge_round_trip() {
        let request =
            parse_payment_request(402, Some("x402 realm=\"payment\""), CHALLENGE_BODY).unwrap();
        assert_eq!(request.id, "req-42");
        assert_eq!(
            request.amount,
            bigdecimal::BigDecimal::from_str("0.002").unwrap()
        );
        assert_eq!(
            request.recipient,
            "0x2222222222222222222222222222222222222222"
        );
        assert_eq!(request.chain_id, 8453);
    }

    #[test]
    fn non_402_is_not_a_challenge() {
        assert!(parse_payment_request(200, Some("x402"), CHALLENGE_BODY).is_none());
        assert!(parse_payment_request(404, Some("x402"), CHALLENGE_BODY).is_none());
    }

    #[test]
    fn wrong_or_missing_header_is_not_a_challenge() {
        assert!(parse_payment_request(402, None, CHALLENGE_BODY).is_none());
        assert!(parse_payment_request(402, Some("Bearer abc"), CHALLENGE_BODY).is_none());
    }

    #[test]
    fn challenge_defaults_currency_and_chain() {
        let body = r#"{
            "requestId": "req-7",
            "amount": "1",
            "recipient": "0x2222222222222222222222222222222222222222"
        }"#;
        let request = parse_payment_request(402, Some("x402"), body).unwrap();
        assert_eq!(request.currency, "ETH");
        assert_eq!(request.chain_id, 1);
        assert_eq!(request.method, PaymentMethod::Direct);
        assert!(request.expires_at.is_none());
    }

    #[tokio::test]
    async fn submit_payment_parses_outcome() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/payments/submit")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"requestId":"req-42","status":"pending"}"#)
            .create_async()
            .await;

        let outcome = gateway(server.url())
            .submit_payment("req-42", "0xfeed", 8453)
            .await
            .unwrap();
        assert_eq!(outcome.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn gateway_error_status_propagates() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/payments/req-42/status")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let err = gateway(server.url())
            .payment_status("req-42")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn verify_reads_boolean() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/payments/verify")
            .with_status(200)
            .with_body(r#"{"verified":true}"#)
            .create_async()
            .await;

        assert!(gateway(server.url())
            .verify_payment("req-42", "0xfeed")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn circuit_breaker_opens_after_consecutive_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/network/stats")
            .with_status(500)
            .expect_at_least(3)
            .create_async()
            .await;

        let client = gateway(server.url());
        for _ in 0..3 {
            let _ = client.network_stats().await;
        }

        let err = client.network_stats().await.unwrap_err();
        assert!(matches!(err, GatewayError::CircuitOpen));
        assert_eq!(client.circuit_state(), "open");
    }
}
