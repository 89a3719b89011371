// Detection & Consensus Tracker
//
// Agents are evaluated in ascending id order against the snapshot's live target.
// The first agent inside the capture threshold captures it; evaluation stops there,
// so at most one target is replaced per tick and the lowest id wins ties.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::registry::SwarmSnapshot;
use super::types::{AgentId, Target, Vec2, WorldBounds};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionParams {
    pub detection_range: f64,
    pub capture_threshold: f64,
    /// Replacement targets spawn at least this far from the world edge
    pub spawn_margin: f64,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            detection_range: 150.0,
            capture_threshold: 30.0,
            spawn_margin: 100.0,
        }
    }
}

/// One detection credited to every agent active at the snapshot.
///
/// Recipients are not filtered by connectivity-graph reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastEvent {
    pub detector: AgentId,
    pub recipients: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capture {
    pub agent: AgentId,
    pub captured: Target,
    pub replacement: Target,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionOutcome {
    /// Final detection flag per touched agent
    pub flags: Vec<(AgentId, bool)>,
    pub broadcasts: Vec<BroadcastEvent>,
    pub capture: Option<Capture>,
}

impl DetectionOutcome {
    pub fn detections(&self) -> u64 {
        self.broadcasts.len() as u64
    }

    pub fn broadcast_credits(&self) -> u64 {
        self.broadcasts.iter().map(|b| b.recipients as u64).sum()
    }

    fn set_flag(&mut self, agent: AgentId, detected: bool) {
        match self.flags.iter_mut().find(|(id, _)| *id == agent) {
            Some(entry) => entry.1 = detected,
            None => self.flags.push((agent, detected)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DetectionTracker {
    params: DetectionParams,
    bounds: WorldBounds,
    next_target_id: u64,
}

impl DetectionTracker {
    pub fn new(params: DetectionParams, bounds: WorldBounds) -> Self {
        Self {
            params,
            bounds,
            next_target_id: 1,
        }
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    pub fn evaluate<R: Rng + ?Sized>(
        &mut self,
        snapshot: &SwarmSnapshot,
        rng: &mut R,
    ) -> DetectionOutcome {
        let mut outcome = DetectionOutcome::default();
        let Some(target) = snapshot.target else {
            return outcome;
        };
        let recipients = snapshot.active_count();

        for agent in snapshot.active() {
            let dist = agent.position.distance_to(target.position);
            if dist >= self.params.detection_range {
                continue;
            }

            if !agent.target_detected {
                outcome.set_flag(agent.id, true);
                outcome.broadcasts.push(BroadcastEvent {
                    detector: agent.id,
                    recipients,
                });
                tracing::info!(
                    agent = agent.id,
                    target = target.id,
                    distance = dist,
                    "Target detected"
                );
            }

            if dist < self.params.capture_threshold {
                let replacement = self.spawn_target(rng, Some(target.position));
                outcome.set_flag(agent.id, false);
                outcome.capture = Some(Capture {
                    agent: agent.id,
                    captured: target,
                    replacement,
                });
                tracing::info!(
                    agent = agent.id,
                    captured = target.id,
                    replacement = replacement.id,
                    x = replacement.position.x,
                    y = replacement.position.y,
                    "Target captured, replacement spawned"
                );
                break;
            }
        }

        outcome
    }

    /// Register a target at a fixed position
    pub fn place_target(&mut self, position: Vec2) -> Target {
        let id = self.next_target_id;
        self.next_target_id += 1;
        Target { id, position }
    }

    /// Forget issued target ids, used on swarm reset
    pub fn reset(&mut self) {
        self.next_target_id = 1;
    }

    /// Uniform integer position inside the margin; never equal to `avoid` when the area allows it.
    pub fn spawn_target<R: Rng + ?Sized>(&mut self, rng: &mut R, avoid: Option<Vec2>) -> Target {
        let (x_lo, x_hi) = spawn_span(self.bounds.width, self.params.spawn_margin);
        let (y_lo, y_hi) = spawn_span(self.bounds.height, self.params.spawn_margin);

        let mut position = Vec2::ZERO;
        for _ in 0..16 {
            position = Vec2::new(
                rng.random_range(x_lo..=x_hi) as f64,
                rng.random_range(y_lo..=y_hi) as f64,
            );
            if Some(position) != avoid {
                break;
            }
        }
        self.place_target(position)
    }
}

fn spawn_span(extent: f64, margin: f64) -> (i64, i64) {
    let extent = extent.floor() as i64;
    let margin = margin.max(0.0).floor() as i64;
    if extent - margin > margin {
        (margin, extent - margin)
    } else {
        (0, (extent - 1).max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::types::{Agent, AgentStatus};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn target_at(x: f64, y: f64) -> Target {
        Target {
            id: 99,
            position: Vec2::new(x, y),
        }
    }

    fn tracker() -> DetectionTracker {
        DetectionTracker::new(DetectionParams::default(), WorldBounds::default())
    }

    #[test]
    fn test_no_target_means_no_outcome() {
        let snap = SwarmSnapshot {
            agents: vec![Agent::new(1, Vec2::ZERO, Vec2::ZERO)],
            target: None,
        };
        let outcome = tracker().evaluate(&snap, &mut StdRng::seed_from_u64(1));
        assert_eq!(outcome, DetectionOutcome::default());
    }

    #[test]
    fn test_detection_only_counts_rising_edge() {
        let mut agent = Agent::new(1, Vec2::new(100.0, 0.0), Vec2::ZERO);
        let snap = SwarmSnapshot {
            agents: vec![agent.clone()],
            target: Some(target_at(0.0, 0.0)),
        };
        let mut rng = StdRng::seed_from_u64(1);
        let first = tracker().evaluate(&snap, &mut rng);
        assert_eq!(first.detections(), 1);
        assert_eq!(first.flags, vec![(1, true)]);

        agent.target_detected = true;
        let snap = SwarmSnapshot {
            agents: vec![agent],
            target: Some(target_at(0.0, 0.0)),
        };
        let second = tracker().evaluate(&snap, &mut rng);
        assert_eq!(second.detections(), 0);
        assert!(second.flags.is_empty());
    }

    #[test]
    fn test_capture_tie_goes_to_lowest_id() {
        let snap = SwarmSnapshot {
            agents: vec![
                Agent::new(2, Vec2::new(5.0, 0.0), Vec2::ZERO),
                Agent::new(4, Vec2::new(1.0, 0.0), Vec2::ZERO),
            ],
            target: Some(target_at(0.0, 0.0)),
        };
        let outcome = tracker().evaluate(&snap, &mut StdRng::seed_from_u64(3));
        let capture = outcome.capture.expect("capture");
        assert_eq!(capture.agent, 2);
        assert_eq!(outcome.flags, vec![(2, false)]);
        // agent 4 is not evaluated once the target is gone
        assert_eq!(outcome.detections(), 1);
    }

    #[test]
    fn test_failed_agents_neither_detect_nor_receive() {
        let mut failed = Agent::new(1, Vec2::new(10.0, 0.0), Vec2::ZERO);
        failed.status = AgentStatus::Failed;
        let snap = SwarmSnapshot {
            agents: vec![failed, Agent::new(2, Vec2::new(100.0, 0.0), Vec2::ZERO)],
            target: Some(target_at(0.0, 0.0)),
        };
        let outcome = tracker().evaluate(&snap, &mut StdRng::seed_from_u64(3));
        assert!(outcome.capture.is_none());
        assert_eq!(outcome.broadcasts, vec![BroadcastEvent { detector: 2, recipients: 1 }]);
    }

    #[test]
    fn test_spawn_stays_inside_margin() {
        let mut tracker = tracker();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let t = tracker.spawn_target(&mut rng, None);
            assert!((100.0..=1100.0).contains(&t.position.x));
            assert!((100.0..=700.0).contains(&t.position.y));
        }
    }

    #[test]
    fn test_spawn_ids_are_unique_and_increasing() {
        let mut tracker = tracker();
        let mut rng = StdRng::seed_from_u64(7);
        let a = tracker.spawn_target(&mut rng, None);
        let b = tracker.spawn_target(&mut rng, None);
        assert!(b.id > a.id);
    }

    #[test]
    fn test_spawn_span_handles_tiny_worlds() {
        assert_eq!(spawn_span(1200.0, 100.0), (100, 1100));
        assert_eq!(spawn_span(150.0, 100.0), (0, 149));
    }
}
