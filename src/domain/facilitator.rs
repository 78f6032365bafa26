//! Facilitator entities. Facilitators are independently operated nodes that
//! settle off-protocol payments; the registry owns the set and only ever
//! flips status, never deletes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacilitatorStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Facilitator {
    pub id: String,
    pub name: String,
    pub endpoint: String,
    pub status: FacilitatorStatus,
    pub response_time_ms: u64,
    /// Percentage in 0..=100.
    pub success_rate: f64,
}

impl Facilitator {
    pub fn new(index: usize, endpoint: String) -> Self {
        Self {
            id: format!("facilitator-{}", index + 1),
            name: format!("Facilitator {}", index + 1),
            endpoint,
            status: FacilitatorStatus::Active,
            response_time_ms: 0,
            success_rate: 100.0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == FacilitatorStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    Online,
    Degraded,
    Offline,
}

/// Aggregate counters, either reported by the gateway's stats endpoint or
/// approximated locally from the active facilitator set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    pub active_facilitators: usize,
    pub avg_response_time: u64,
    pub total_transactions: u64,
    pub network_status: NetworkStatus,
}
