// Motion Model - flocking rule evaluated against a single tick snapshot
//
// velocity delta = separation * separation_gain + cohesion + alignment + target seek
// new velocity   = clamp(old velocity + delta, max_speed)

use serde::{Deserialize, Serialize};

use super::registry::SwarmSnapshot;
use super::types::{Agent, AgentId, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlockingParams {
    pub max_speed: f64,
    pub separation_distance: f64,
    pub cohesion_distance: f64,
    pub separation_gain: f64,
    pub cohesion_gain: f64,
    pub alignment_gain: f64,
    pub seek_gain: f64,
}

impl Default for FlockingParams {
    fn default() -> Self {
        Self {
            max_speed: 2.0,
            separation_distance: 100.0,
            cohesion_distance: 200.0,
            separation_gain: 0.1,
            cohesion_gain: 0.01,
            alignment_gain: 0.05,
            seek_gain: 0.02,
        }
    }
}

/// Proposed velocity change for one agent. Applied by the registry commit, never here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionProposal {
    pub agent: AgentId,
    pub delta: Vec2,
    /// `old velocity + delta`, clamped to max speed
    pub velocity: Vec2,
}

/// Individual flocking terms, already scaled by their gains
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FlockingTerms {
    pub separation: Vec2,
    pub cohesion: Vec2,
    pub alignment: Vec2,
    pub seek: Vec2,
}

impl FlockingTerms {
    pub fn total(&self) -> Vec2 {
        self.separation + self.cohesion + self.alignment + self.seek
    }
}

#[derive(Debug, Clone, Default)]
pub struct MotionModel {
    params: FlockingParams,
}

impl MotionModel {
    pub fn new(params: FlockingParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &FlockingParams {
        &self.params
    }

    /// One proposal per active agent, ascending id. Pure function of `snapshot`.
    pub fn compute(&self, snapshot: &SwarmSnapshot) -> Vec<MotionProposal> {
        let seek_target = if snapshot.any_detected() {
            snapshot.target.map(|t| t.position)
        } else {
            None
        };

        snapshot
            .active()
            .map(|agent| {
                let delta = self.terms(agent, snapshot, seek_target).total();
                MotionProposal {
                    agent: agent.id,
                    delta,
                    velocity: (agent.velocity + delta).clamp_length(self.params.max_speed),
                }
            })
            .collect()
    }

    /// Flocking terms for `agent` against every other active agent in `snapshot`
    pub fn terms(
        &self,
        agent: &Agent,
        snapshot: &SwarmSnapshot,
        seek_target: Option<Vec2>,
    ) -> FlockingTerms {
        let p = &self.params;
        let mut separation = Vec2::ZERO;
        let mut position_sum = Vec2::ZERO;
        let mut velocity_sum = Vec2::ZERO;
        let mut neighbors = 0usize;

        for other in snapshot.active().filter(|o| o.id != agent.id) {
            let dist = agent.distance_to(other);

            if dist > 0.0 && dist < p.separation_distance {
                separation += (agent.position - other.position) / dist;
            }

            if dist < p.cohesion_distance {
                position_sum += other.position;
                velocity_sum += other.velocity;
                neighbors += 1;
            }
        }

        let (cohesion, alignment) = if neighbors > 0 {
            let n = neighbors as f64;
            (
                (position_sum / n - agent.position) * p.cohesion_gain,
                velocity_sum / n * p.alignment_gain,
            )
        } else {
            (Vec2::ZERO, Vec2::ZERO)
        };

        let seek = seek_target
            .map(|target| (target - agent.position) * p.seek_gain)
            .unwrap_or(Vec2::ZERO);

        FlockingTerms {
            separation: separation * p.separation_gain,
            cohesion,
            alignment,
            seek,
        }
    }
}
