pub mod chain;
pub mod config;
pub mod domain;
pub mod error;
pub mod facilitator;
pub mod gateway;
pub mod ledger;
pub mod orchestrator;
pub mod tracker;
pub mod validation;

use std::sync::Arc;
use tokio_stream::Stream;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chain::{ChainClient, ChainError, RpcChainClient};
pub use config::Config;
use domain::{
    Facilitator, NetworkStats, NewPaymentRequest, PaymentOutcome, PaymentRequest,
    TransactionRecord,
};
pub use error::WalletError;
use facilitator::{FacilitatorRegistry, ProbeLoopHandle};
use gateway::GatewayClient;
use ledger::LedgerStore;
use orchestrator::PaymentOrchestrator;
use tracker::{CostEstimate, Submission, SubmitParams, TransactionTracker};

/// Installs the default log subscriber. Embedding applications that bring
/// their own subscriber skip this.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// The assembled client: chain facade, ledger, tracker, gateway,
/// orchestrator and facilitator registry wired together from one config.
pub struct WalletCore {
    config: Config,
    ledger: LedgerStore,
    tracker: TransactionTracker,
    orchestrator: PaymentOrchestrator,
    gateway: GatewayClient,
    registry: FacilitatorRegistry,
    probe_loop: Option<ProbeLoopHandle>,
}

impl WalletCore {
    pub async fn new(config: Config) -> Self {
        let ledger = match config.ledger_path.clone() {
            Some(path) => LedgerStore::open(path, config.persist_outcomes).await,
            None => LedgerStore::in_memory(),
        };

        let chain: Arc<dyn ChainClient> = Arc::new(RpcChainClient::new(config.rpc_url.clone()));
        let tracker = TransactionTracker::new(chain, ledger.clone(), config.confirmations);

        let gateway = GatewayClient::new(
            config.gateway_url.clone(),
            &config.network_id,
            config.request_timeout,
        );
        let orchestrator = PaymentOrchestrator::new(gateway.clone(), ledger.clone());
        let registry = FacilitatorRegistry::new(&config.facilitator_endpoints);

        Self {
            config,
            ledger,
            tracker,
            orchestrator,
            gateway,
            registry,
            probe_loop: None,
        }
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    // --- on-chain transfers ---

    pub async fn submit_transfer(&self, params: SubmitParams) -> Result<Submission, WalletError> {
        self.tracker.submit(params, self.config.chain_id).await
    }

    pub fn track_status(&self, key: impl Into<String>) -> impl Stream<Item = TransactionRecord> {
        self.tracker.track_status(key)
    }

    /// Waits inline for the transfer to finalize. Cancel the submission's
    /// confirmation handle first when using this after `submit_transfer`.
    pub async fn await_transfer(&self, hash: &str) -> Result<TransactionRecord, WalletError> {
        self.tracker.await_completion(hash).await
    }

    pub async fn transfer_receipt(
        &self,
        hash: &str,
    ) -> Result<Option<chain::ConfirmationOutcome>, ChainError> {
        self.tracker.receipt(hash).await
    }

    pub async fn estimate_cost(
        &self,
        sender: &str,
        recipient: &str,
        amount: &bigdecimal::BigDecimal,
        payload: Option<&str>,
    ) -> Result<CostEstimate, ChainError> {
        self.tracker
            .estimate_cost(sender, recipient, amount, payload)
            .await
    }

    pub async fn speed_up(
        &self,
        original_hash: &str,
        multiplier: Option<f64>,
    ) -> Result<String, WalletError> {
        self.tracker.speed_up(original_hash, multiplier).await
    }

    // --- x402 payments ---

    pub async fn request_payment(
        &self,
        intent: &NewPaymentRequest,
    ) -> Result<PaymentRequest, WalletError> {
        self.orchestrator.create_payment_request(intent).await
    }

    /// Submits payment proof and waits for a terminal outcome under the
    /// automatic budget.
    pub async fn pay_and_confirm(
        &self,
        request: &PaymentRequest,
        proof_hash: &str,
    ) -> Result<PaymentOutcome, WalletError> {
        self.orchestrator
            .handle_automatic_payment(request, proof_hash)
            .await
    }

    pub async fn verify_payment(&self, request_id: &str, proof_hash: &str) -> bool {
        self.orchestrator.verify_payment(request_id, proof_hash).await
    }

    pub async fn payment_history(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<PaymentOutcome>, WalletError> {
        self.orchestrator.payment_history(address, limit).await
    }

    // --- facilitator network ---

    pub async fn list_active_facilitators(&self) -> Vec<Facilitator> {
        self.registry.active_facilitators().await
    }

    /// Network stats from the gateway, degrading to the locally observed
    /// facilitator view when the gateway cannot answer.
    pub async fn network_stats(&self) -> NetworkStats {
        match self.gateway.network_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                debug!("gateway stats unavailable, using local view: {e}");
                self.registry.local_stats().await
            }
        }
    }

    /// Starts the periodic facilitator probe loop. Idempotent while a loop
    /// is already running.
    pub fn start_probes(&mut self) {
        if self.probe_loop.is_none() {
            self.probe_loop = Some(self.registry.spawn_probe_loop(self.config.probe_interval));
        }
    }

    /// Stops background work and flushes the ledger snapshot.
    pub async fn shutdown(&mut self) {
        if let Some(probe_loop) = self.probe_loop.take() {
            probe_loop.cancel();
            probe_loop.join().await;
        }
        self.ledger.persist().await;
    }
}
