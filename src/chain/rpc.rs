//! HTTP implementation of the chain facade against the node's REST RPC.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use super::{ChainClient, ChainError, ConfirmationOutcome, TransferParams, TransferSummary};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// The confirmation wait is a long poll; give the node more headroom than a
/// plain request gets.
const WAIT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
struct BroadcastResponse {
    hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EstimateResponse {
    units: BigDecimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeeResponse {
    fee_level: Option<BigDecimal>,
}

#[derive(Debug, Deserialize)]
struct NodeErrorBody {
    error: String,
}

/// HTTP client for the node RPC.
#[derive(Clone)]
pub struct RpcChainClient {
    client: Client,
    wait_client: Client,
    base_url: String,
}

impl RpcChainClient {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_default();
        let wait_client = Client::builder()
            .timeout(WAIT_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            wait_client,
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn rejection(response: reqwest::Response) -> ChainError {
        let status = response.status();
        match response.json::<NodeErrorBody>().await {
            Ok(body) => ChainError::Rejected(body.error),
            Err(_) => ChainError::Rejected(format!("node returned status {}", status)),
        }
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn broadcast_transfer(&self, params: &TransferParams) -> Result<String, ChainError> {
        let response = self
            .client
            .post(self.url("/transfers"))
            .json(params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let body = response
            .json::<BroadcastResponse>()
            .await
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;
        Ok(body.hash)
    }

    async fn await_confirmations(
        &self,
        hash: &str,
        confirmations: u32,
    ) -> Result<ConfirmationOutcome, ChainError> {
        let response = self
            .wait_client
            .get(self.url(&format!("/transfers/{}/wait", hash)))
            .query(&[("confirmations", confirmations)])
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ChainError::NotFound(hash.to_string())),
            status if !status.is_success() => Err(Self::rejection(response).await),
            _ => response
                .json::<ConfirmationOutcome>()
                .await
                .map_err(|e| ChainError::InvalidResponse(e.to_string())),
        }
    }

    async fn estimate_cost(
        &self,
        sender: &str,
        recipient: &str,
        amount: &BigDecimal,
        payload: Option<&str>,
    ) -> Result<BigDecimal, ChainError> {
        let params = TransferParams {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            amount: amount.clone(),
            payload: payload.map(str::to_string),
            fee_level: None,
            nonce: None,
        };

        let response = self
            .client
            .post(self.url("/transfers/estimate"))
            .json(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let body = response
            .json::<EstimateResponse>()
            .await
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;
        Ok(body.units)
    }

    async fn current_fee_level(&self) -> Result<Option<BigDecimal>, ChainError> {
        let response = self.client.get(self.url("/fees")).send().await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let body = response
            .json::<FeeResponse>()
            .await
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;
        Ok(body.fee_level)
    }

    async fn get_transfer(&self, hash: &str) -> Result<TransferSummary, ChainError> {
        let response = self
            .client
            .get(self.url(&format!("/transfers/{}", hash)))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ChainError::NotFound(hash.to_string())),
            status if !status.is_success() => Err(Self::rejection(response).await),
            _ => response
                .json::<TransferSummary>()
                .await
                .map_err(|e| ChainError::InvalidResponse(e.to_string())),
        }
    }

    async fn get_receipt(&self, hash: &str) -> Result<Option<ConfirmationOutcome>, ChainError> {
        let response = self
            .client
            .get(self.url(&format!("/transfers/{}/receipt", hash)))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if !status.is_success() => Err(Self::rejection(response).await),
            _ => response
                .json::<ConfirmationOutcome>()
                .await
                .map(Some)
                .map_err(|e| ChainError::InvalidResponse(e.to_string())),
        }
    }
}
