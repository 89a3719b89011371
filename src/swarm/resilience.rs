// Resilience Monitor - battery drain and the irreversible active -> failed transition

use serde::{Deserialize, Serialize};

use super::registry::SwarmSnapshot;
use super::types::{AgentId, AgentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResilienceParams {
    pub battery_drain_per_tick: f64,
}

impl Default for ResilienceParams {
    fn default() -> Self {
        Self {
            battery_drain_per_tick: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResilienceUpdate {
    pub agent: AgentId,
    pub battery: f64,
    pub status: AgentStatus,
}

impl ResilienceUpdate {
    pub fn failed(&self) -> bool {
        self.status == AgentStatus::Failed
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResilienceMonitor {
    params: ResilienceParams,
}

impl ResilienceMonitor {
    pub fn new(params: ResilienceParams) -> Self {
        Self { params }
    }

    /// Proposed battery and status for every active agent in `snapshot`
    pub fn evaluate(&self, snapshot: &SwarmSnapshot) -> Vec<ResilienceUpdate> {
        snapshot
            .active()
            .map(|agent| {
                let battery = (agent.battery - self.params.battery_drain_per_tick).max(0.0);
                let status = if battery == 0.0 {
                    tracing::warn!(agent = agent.id, "Battery depleted, agent failed");
                    AgentStatus::Failed
                } else {
                    AgentStatus::Active
                };
                ResilienceUpdate {
                    agent: agent.id,
                    battery,
                    status,
                }
            })
            .collect()
    }
}
