// Connectivity Graph - range-limited links between active agents, rebuilt every tick

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::registry::SwarmSnapshot;
use super::types::AgentId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityParams {
    /// Edges exist strictly below this distance
    pub communication_range: f64,
}

impl Default for ConnectivityParams {
    fn default() -> Self {
        Self {
            communication_range: 300.0,
        }
    }
}

/// An in-range pair, stored with `a < b`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectivityEdge {
    pub a: AgentId,
    pub b: AgentId,
    pub distance: f64,
}

impl ConnectivityEdge {
    /// Link quality in (0, 1]: 1 at zero distance, approaching 0 at the range limit
    pub fn strength(&self, range: f64) -> f64 {
        1.0 - self.distance / range
    }

    pub fn touches(&self, id: AgentId) -> bool {
        self.a == id || self.b == id
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectivityGraph {
    edges: Vec<ConnectivityEdge>,
    adjacency: BTreeMap<AgentId, BTreeSet<AgentId>>,
}

impl ConnectivityGraph {
    /// Pairwise O(n^2) build over the active agents of `snapshot`
    pub fn build(snapshot: &SwarmSnapshot, params: &ConnectivityParams) -> Self {
        let active: Vec<_> = snapshot.active().collect();
        let mut graph = Self::default();

        for agent in &active {
            graph.adjacency.entry(agent.id).or_default();
        }

        for (i, agent) in active.iter().enumerate() {
            for other in &active[i + 1..] {
                let distance = agent.distance_to(other);
                if distance < params.communication_range {
                    let (a, b) = if agent.id < other.id {
                        (agent.id, other.id)
                    } else {
                        (other.id, agent.id)
                    };
                    graph.edges.push(ConnectivityEdge { a, b, distance });
                    graph.adjacency.entry(a).or_default().insert(b);
                    graph.adjacency.entry(b).or_default().insert(a);
                }
            }
        }

        graph
    }

    pub fn edges(&self) -> &[ConnectivityEdge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Symmetric membership test; self-pairs are never connected
    pub fn connected(&self, a: AgentId, b: AgentId) -> bool {
        a != b
            && self
                .adjacency
                .get(&a)
                .is_some_and(|peers| peers.contains(&b))
    }

    pub fn neighbors(&self, id: AgentId) -> Vec<AgentId> {
        self.adjacency
            .get(&id)
            .map(|peers| peers.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn degree(&self, id: AgentId) -> usize {
        self.adjacency.get(&id).map_or(0, |peers| peers.len())
    }

    /// Agents reachable over one or more hops, including `from` itself
    pub fn reachable_from(&self, from: AgentId) -> BTreeSet<AgentId> {
        let mut seen = BTreeSet::new();
        if !self.adjacency.contains_key(&from) {
            return seen;
        }

        let mut queue = VecDeque::from([from]);
        seen.insert(from);
        while let Some(current) = queue.pop_front() {
            for peer in self.adjacency.get(&current).into_iter().flatten() {
                if seen.insert(*peer) {
                    queue.push_back(*peer);
                }
            }
        }
        seen
    }
}
