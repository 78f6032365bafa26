//! Facilitator registry: liveness probing and ranking of the payment
//! facilitation endpoints.
//!
//! Probes run concurrently with an independent per-probe timeout so one
//! slow or dead facilitator cannot block or fail the sweep for the rest.

use futures::future::join_all;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{Facilitator, FacilitatorStatus, NetworkStats, NetworkStatus};

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the periodic probe loop.
pub struct ProbeLoopHandle {
    handle: JoinHandle<()>,
    token: CancellationToken,
}

impl ProbeLoopHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

/// Owns the facilitator set. Entries are created once from configuration
/// and are only ever marked Active/Inactive afterwards, never removed.
#[derive(Clone)]
pub struct FacilitatorRegistry {
    facilitators: Arc<RwLock<Vec<Facilitator>>>,
    client: Client,
}

impl FacilitatorRegistry {
    pub fn new(endpoints: &[String]) -> Self {
        let facilitators = endpoints
            .iter()
            .enumerate()
            .map(|(i, endpoint)| Facilitator::new(i, endpoint.clone()))
            .collect();

        Self {
            facilitators: Arc::new(RwLock::new(facilitators)),
            client: Client::new(),
        }
    }

    pub async fn all(&self) -> Vec<Facilitator> {
        self.facilitators.read().await.clone()
    }

    pub async fn active_facilitators(&self) -> Vec<Facilitator> {
        self.facilitators
            .read()
            .await
            .iter()
            .filter(|f| f.is_active())
            .cloned()
            .collect()
    }

    /// Probes every facilitator concurrently and folds the results back into
    /// the registry entry by entry, keyed by id. Each probe fails
    /// independently; a timeout or error marks that facilitator Inactive and
    /// leaves its last observed latency untouched. Per-entry merging keeps
    /// overlapping sweeps from clobbering each other's results wholesale.
    pub async fn probe_all(&self) -> Vec<Facilitator> {
        let snapshot = self.all().await;
        let probes = snapshot
            .into_iter()
            .map(|f| probe_one(self.client.clone(), f));
        let refreshed = join_all(probes).await;

        let view = {
            let mut facilitators = self.facilitators.write().await;
            merge_probe_results(&mut facilitators, &refreshed);
            facilitators.clone()
        };

        let active = view.iter().filter(|f| f.is_active()).count();
        debug!(active, total = view.len(), "facilitator probe sweep finished");
        view
    }

    /// Local approximation of the network stats when the gateway's stats
    /// endpoint is unreachable.
    pub async fn local_stats(&self) -> NetworkStats {
        let active = self.active_facilitators().await;
        let avg_response_time = if active.is_empty() {
            0
        } else {
            active.iter().map(|f| f.response_time_ms).sum::<u64>() / active.len() as u64
        };

        NetworkStats {
            active_facilitators: active.len(),
            avg_response_time,
            total_transactions: 0,
            network_status: if active.is_empty() {
                NetworkStatus::Offline
            } else {
                NetworkStatus::Online
            },
        }
    }

    /// Spawns the periodic probe loop. Cancelling the handle stops the loop
    /// at the next suspension point.
    pub fn spawn_probe_loop(&self, interval: Duration) -> ProbeLoopHandle {
        let registry = self.clone();
        let token = CancellationToken::new();
        let loop_token = token.clone();

        let handle = tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "facilitator probe loop started");
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => {
                        info!("facilitator probe loop stopped");
                        return;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
                registry.probe_all().await;
            }
        });

        ProbeLoopHandle { handle, token }
    }
}

/// A sweep owns only the fields a probe observes; everything else on the
/// live entry is left alone.
fn merge_probe_results(facilitators: &mut [Facilitator], refreshed: &[Facilitator]) {
    for probed in refreshed {
        if let Some(entry) = facilitators.iter_mut().find(|f| f.id == probed.id) {
            entry.status = probed.status;
            entry.response_time_ms = probed.response_time_ms;
        }
    }
}

async fn probe_one(client: Client, mut facilitator: Facilitator) -> Facilitator {
    let url = format!("{}/health", facilitator.endpoint.trim_end_matches('/'));
    let start = Instant::now();

    match timeout(PROBE_TIMEOUT, client.get(&url).send()).await {
        Ok(Ok(response)) if response.status().is_success() => {
            facilitator.status = FacilitatorStatus::Active;
            facilitator.response_time_ms = start.elapsed().as_millis() as u64;
        }
        outcome => {
            if let Ok(Err(e)) = &outcome {
                warn!(id = %facilitator.id, "facilitator probe failed: {e}");
            }
            // Timeout or error: degrade this facilitator only, keep its
            // previous latency reading.
            facilitator.status = FacilitatorStatus::Inactive;
        }
    }

    facilitator
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn initializes_all_active_with_zero_latency() {
        let registry = FacilitatorRegistry::new(&[
            "http://localhost:4021".to_string(),
            "http://localhost:4022".to_string(),
        ]);

        let all = registry.all().await;
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|f| f.is_active()));
        assert!(all.iter().all(|f| f.response_time_ms == 0));
        assert_eq!(all[0].id, "facilitator-1");
        assert_eq!(all[1].id, "facilitator-2");
    }

    #[tokio::test]
    async fn probe_marks_responders_active_and_failures_inactive() {
        let mut healthy = mockito::Server::new_async().await;
        let _mock = healthy
            .mock("GET", "/health")
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let mut broken = mockito::Server::new_async().await;
        let _broken_mock = broken
            .mock("GET", "/health")
            .with_status(500)
            .create_async()
            .await;

        let registry = FacilitatorRegistry::new(&[healthy.url(), broken.url()]);
        let refreshed = registry.probe_all().await;

        assert_eq!(refreshed[0].status, FacilitatorStatus::Active);
        assert_eq!(refreshed[1].status, FacilitatorStatus::Inactive);

        let active = registry.active_facilitators().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].endpoint, healthy.url());
    }

    #[tokio::test]
    async fn one_unreachable_facilitator_does_not_poison_the_sweep() {
        let mut healthy_a = mockito::Server::new_async().await;
        let _a = healthy_a
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;
        let mut healthy_b = mockito::Server::new_async().await;
        let _b = healthy_b
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;

        // Nothing listens on this port; the connection is refused outright.
        let registry = FacilitatorRegistry::new(&[
            healthy_a.url(),
            "http://127.0.0.1:1".to_string(),
            healthy_b.url(),
        ]);
        let refreshed = registry.probe_all().await;

        assert_eq!(refreshed[0].status, FacilitatorStatus::Active);
        assert_eq!(refreshed[1].status, FacilitatorStatus::Inactive);
        assert_eq!(refreshed[2].status, FacilitatorStatus::Active);
    }

    #[tokio::test]
    async fn failed_probe_keeps_previous_latency() {
        let registry = FacilitatorRegistry::new(&["http://127.0.0.1:1".to_string()]);
        {
            let mut facilitators = registry.facilitators.write().await;
            facilitators[0].response_time_ms = 42;
        }

        let refreshed = registry.probe_all().await;
        assert_eq!(refreshed[0].status, FacilitatorStatus::Inactive);
        assert_eq!(refreshed[0].response_time_ms, 42);
    }

    #[tokio::test]
    async fn stale_sweep_only_touches_the_entries_it_probed() {
        let registry = FacilitatorRegistry::new(&[
            "http://localhost:4021".to_string(),
            "http://localhost:4022".to_string(),
        ]);

        // A concurrent sweep updated the second entry after this sweep took
        // its snapshot.
        {
            let mut facilitators = registry.facilitators.write().await;
            facilitators[1].status = FacilitatorStatus::Inactive;
            facilitators[1].response_time_ms = 77;
        }

        // This sweep's results only cover the first entry.
        let stale = vec![Facilitator {
            status: FacilitatorStatus::Active,
            response_time_ms: 5,
            ..Facilitator::new(0, "http://localhost:4021".to_string())
        }];
        {
            let mut facilitators = registry.facilitators.write().await;
            merge_probe_results(&mut facilitators, &stale);
        }

        let all = registry.all().await;
        assert_eq!(all[0].response_time_ms, 5);
        assert_eq!(all[1].status, FacilitatorStatus::Inactive);
        assert_eq!(all[1].response_time_ms, 77);
    }

    #[tokio::test]
    async fn local_stats_reflect_active_set() {
        let registry = FacilitatorRegistry::new(&[
            "http://localhost:4021".to_string(),
            "http://localhost:4022".to_string(),
        ]);
        {
            let mut facilitators = registry.facilitators.write().await;
            facilitators[0].response_time_ms = 10;
            facilitators[1].response_time_ms = 30;
        }

        let stats = registry.local_stats().await;
        assert_eq!(stats.active_facilitators, 2);
        assert_eq!(stats.avg_response_time, 20);
        assert_eq!(stats.network_status, NetworkStatus::Online);
    }

    #[tokio::test]
    async fn local_stats_offline_when_nothing_active() {
        let registry = FacilitatorRegistry::new(&["http://127.0.0.1:1".to_string()]);
        registry.probe_all().await;

        let stats = registry.local_stats().await;
        assert_eq!(stats.active_facilitators, 0);
        assert_eq!(stats.network_status, NetworkStatus::Offline);
    }

    #[tokio::test]
    async fn probe_loop_stops_on_cancel() {
        let registry = FacilitatorRegistry::new(&[]);
        let handle = registry.spawn_probe_loop(Duration::from_secs(3600));
        handle.cancel();
        handle.join().await;
    }
}
