//! Payment orchestrator: drives the x402 handshake from challenge to
//! terminal outcome and reconciles every gateway answer into the ledger.

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::domain::{NewPaymentRequest, PaymentOutcome, PaymentRequest};
use crate::error::WalletError;
use crate::gateway::GatewayClient;
use crate::ledger::LedgerStore;

/// Wall-clock budget and spacing for the automatic-payment poll.
pub const AUTO_PAY_TIMEOUT_MS: u64 = 30_000;
pub const AUTO_PAY_INTERVAL_MS: u64 = 2_000;

pub struct PaymentOrchestrator {
    gateway: GatewayClient,
    ledger: LedgerStore,
}

impl PaymentOrchestrator {
    pub fn new(gateway: GatewayClient, ledger: LedgerStore) -> Self {
        Self { gateway, ledger }
    }

    /// Sends the caller's intent to the gateway; the server assigns the id.
    /// Gateway errors propagate unchanged.
    pub async fn create_payment_request(
        &self,
        intent: &NewPaymentRequest,
    ) -> Result<PaymentRequest, WalletError> {
        let request = self.gateway.create_payment(intent).await?;
        info!(id = %request.id, "payment request created");
        Ok(request)
    }

    /// Submits proof of an on-chain transfer and reconciles the reported
    /// outcome into the ledger.
    pub async fn submit_payment(
        &self,
        request_id: &str,
        proof_hash: &str,
        chain_id: u64,
    ) -> Result<PaymentOutcome, WalletError> {
        let outcome = self
            .gateway
            .submit_payment(request_id, proof_hash, chain_id)
            .await?;
        Ok(self.ledger.upsert_outcome(outcome).await)
    }

    /// Polls the outcome at `interval_ms` spacing until it is terminal or
    /// the wall-clock budget `timeout_ms` runs out, whichever comes first.
    ///
    /// A transport error mid-poll is treated as a retryable non-terminal
    /// result: the loop keeps going until the budget expires. A
    /// non-terminal outcome is never returned as if it were final.
    pub async fn poll_status(
        &self,
        request_id: &str,
        timeout_ms: u64,
        interval_ms: u64,
    ) -> Result<PaymentOutcome, WalletError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let interval = Duration::from_millis(interval_ms.max(1));

        loop {
            match self.gateway.payment_status(request_id).await {
                Ok(outcome) => {
                    let applied = self.ledger.upsert_outcome(outcome).await;
                    if applied.status.is_terminal() {
                        return Ok(applied);
                    }
                    debug!(request_id, status = ?applied.status, "payment not terminal yet");
                }
                Err(e) => {
                    warn!(request_id, "status poll failed, retrying until budget: {e}");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            // Never sleep past the deadline; the budget is a hard cap.
            sleep(interval.min(deadline - now)).await;
            if Instant::now() >= deadline {
                break;
            }
        }

        Err(WalletError::Timeout {
            waited_ms: timeout_ms,
        })
    }

    /// Composes submit → poll-until-terminal under the fixed automatic
    /// budget. Submit and poll failures propagate unchanged.
    pub async fn handle_automatic_payment(
        &self,
        request: &PaymentRequest,
        proof_hash: &str,
    ) -> Result<PaymentOutcome, WalletError> {
        if request.is_expired() {
            return Err(WalletError::Validation(
                "payment request expired".to_string(),
            ));
        }

        let outcome = self
            .submit_payment(&request.id, proof_hash, request.chain_id)
            .await?;

        if outcome.status.is_terminal() {
            return Ok(outcome);
        }

        self.poll_status(&request.id, AUTO_PAY_TIMEOUT_MS, AUTO_PAY_INTERVAL_MS)
            .await
    }

    /// Advisory confirmation check. Verification is best-effort, so any
    /// transport failure degrades to "not verified" instead of propagating.
    pub async fn verify_payment(&self, request_id: &str, proof_hash: &str) -> bool {
        match self.gateway.verify_payment(request_id, proof_hash).await {
            Ok(verified) => verified,
            Err(e) => {
                warn!(request_id, "verification degraded to false: {e}");
                false
            }
        }
    }

    pub async fn payment_history(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<PaymentOutcome>, WalletError> {
        Ok(self.gateway.payment_history(address, limit).await?)
    }

    pub async fn outcome(&self, request_id: &str) -> Option<PaymentOutcome> {
        self.ledger.outcome(request_id).await
    }
}
