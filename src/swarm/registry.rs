// Agent Registry - the only owner of agent and target state
//
// Readers get an immutable SwarmSnapshot; the only write path is `commit`,
// which applies a whole tick's proposals at once.

use super::detection::DetectionOutcome;
use super::motion::MotionProposal;
use super::resilience::ResilienceUpdate;
use super::types::{Agent, AgentId, AgentStatus, Target, WorldBounds};

/// Read-only view of the swarm taken at the start of a tick
#[derive(Debug, Clone, PartialEq)]
pub struct SwarmSnapshot {
    /// All agents, ascending id
    pub agents: Vec<Agent>,
    /// The live target (at most one at steady state)
    pub target: Option<Target>,
}

impl SwarmSnapshot {
    pub fn active(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter().filter(|a| a.is_active())
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    /// True when any active agent currently sees the target
    pub fn any_detected(&self) -> bool {
        self.active().any(|a| a.target_detected)
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }
}

/// Everything one tick wants to write, gathered before any write happens
#[derive(Debug, Clone, Default)]
pub struct TickCommit {
    pub motion: Vec<MotionProposal>,
    pub detection: DetectionOutcome,
    pub resilience: Vec<ResilienceUpdate>,
}

#[derive(Debug, Clone)]
pub struct AgentRegistry {
    agents: Vec<Agent>,
    targets: Vec<Target>,
}

impl AgentRegistry {
    pub fn new(mut agents: Vec<Agent>, initial_target: Target) -> Self {
        agents.sort_by_key(|a| a.id);
        agents.dedup_by_key(|a| a.id);
        Self {
            agents,
            targets: vec![initial_target],
        }
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn live_target(&self) -> Option<&Target> {
        self.targets.first()
    }

    pub fn active_ids(&self) -> Vec<AgentId> {
        self.agents
            .iter()
            .filter(|a| a.is_active())
            .map(|a| a.id)
            .collect()
    }

    pub fn snapshot(&self) -> SwarmSnapshot {
        SwarmSnapshot {
            agents: self.agents.clone(),
            target: self.targets.first().copied(),
        }
    }

    /// Apply one tick's proposals as a single state transition.
    ///
    /// Positions integrate with the committed velocity and wrap toroidally.
    /// Agents already failed are never touched, so `Failed` stays terminal.
    pub fn commit(&mut self, commit: TickCommit, bounds: &WorldBounds) {
        for proposal in &commit.motion {
            if let Some(agent) = self.active_agent_mut(proposal.agent) {
                agent.velocity = proposal.velocity;
                agent.position = (agent.position + proposal.velocity).wrap(bounds);
            }
        }

        for (id, detected) in &commit.detection.flags {
            if let Some(agent) = self.active_agent_mut(*id) {
                agent.target_detected = *detected;
            }
        }

        for update in &commit.resilience {
            if let Some(agent) = self.active_agent_mut(update.agent) {
                agent.battery = update.battery;
                agent.status = update.status;
            }
        }

        if let Some(capture) = commit.detection.capture {
            // Swap in place: the sequence never holds zero or two live targets
            match self.targets.first_mut() {
                Some(slot) if slot.id == capture.captured.id => *slot = capture.replacement,
                _ => {
                    tracing::warn!(
                        captured = capture.captured.id,
                        "Captured target is no longer live, keeping current target"
                    );
                }
            }
        }
    }

    /// Operator failure injection. Returns false when the agent is unknown or already failed.
    pub fn mark_failed(&mut self, id: AgentId) -> bool {
        match self.active_agent_mut(id) {
            Some(agent) => {
                agent.status = AgentStatus::Failed;
                agent.target_detected = false;
                true
            }
            None => false,
        }
    }

    fn active_agent_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents
            .iter_mut()
            .find(|a| a.id == id && a.status == AgentStatus::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::detection::Capture;
    use crate::swarm::types::{reference_formation, Vec2};

    fn target(id: u64, x: f64, y: f64) -> Target {
        Target {
            id,
            position: Vec2::new(x, y),
        }
    }

    #[test]
    fn test_registry_sorts_and_dedups_agents() {
        let agents = vec![
            Agent::new(3, Vec2::ZERO, Vec2::ZERO),
            Agent::new(1, Vec2::ZERO, Vec2::ZERO),
            Agent::new(3, Vec2::new(9.0, 9.0), Vec2::ZERO),
        ];
        let registry = AgentRegistry::new(agents, target(1, 0.0, 0.0));
        let ids: Vec<_> = registry.agents().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_commit_integrates_and_wraps() {
        let mut registry = AgentRegistry::new(
            vec![Agent::new(1, Vec2::new(1199.0, 1.0), Vec2::ZERO)],
            target(1, 600.0, 400.0),
        );
        let commit = TickCommit {
            motion: vec![MotionProposal {
                agent: 1,
                delta: Vec2::new(2.0, -2.0),
                velocity: Vec2::new(2.0, -2.0),
            }],
            ..Default::default()
        };
        registry.commit(commit, &WorldBounds::default());

        let agent = registry.agent(1).unwrap();
        assert!((agent.position.x - 1.0).abs() < 1e-9);
        assert!((agent.position.y - 799.0).abs() < 1e-9);
        assert_eq!(agent.velocity, Vec2::new(2.0, -2.0));
    }

    #[test]
    fn test_commit_never_touches_failed_agents() {
        let mut registry = AgentRegistry::new(reference_formation(), target(1, 0.0, 0.0));
        assert!(registry.mark_failed(2));
        assert!(!registry.mark_failed(2));

        let before = registry.agent(2).unwrap().clone();
        let commit = TickCommit {
            motion: vec![MotionProposal {
                agent: 2,
                delta: Vec2::new(1.0, 1.0),
                velocity: Vec2::new(1.0, 1.0),
            }],
            resilience: vec![ResilienceUpdate {
                agent: 2,
                battery: 50.0,
                status: AgentStatus::Active,
            }],
            ..Default::default()
        };
        registry.commit(commit, &WorldBounds::default());
        assert_eq!(registry.agent(2).unwrap(), &before);
    }

    #[test]
    fn test_capture_swaps_target_in_place() {
        let mut registry = AgentRegistry::new(reference_formation(), target(1, 10.0, 10.0));
        let commit = TickCommit {
            detection: DetectionOutcome {
                capture: Some(Capture {
                    agent: 1,
                    captured: target(1, 10.0, 10.0),
                    replacement: target(2, 300.0, 200.0),
                }),
                ..Default::default()
            },
            ..Default::default()
        };
        registry.commit(commit, &WorldBounds::default());
        assert_eq!(registry.targets().len(), 1);
        assert_eq!(registry.live_target().unwrap().id, 2);
    }

    #[test]
    fn test_snapshot_is_detached_from_registry() {
        let mut registry = AgentRegistry::new(reference_formation(), target(1, 0.0, 0.0));
        let snapshot = registry.snapshot();
        registry.mark_failed(1);
        assert!(snapshot.agent(1).unwrap().is_active());
        assert_eq!(snapshot.active_count(), 5);
    }
}
