// Core value types shared by every stage of the coordination tick

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul, Sub};

/// Stable agent identifier. Iteration order over agents is ascending id.
pub type AgentId = u32;

/// Planar vector used for positions and velocities
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance_to(self, other: Vec2) -> f64 {
        (self - other).length()
    }

    /// Rescale to `max` if longer than `max`, keeping direction.
    pub fn clamp_length(self, max: f64) -> Vec2 {
        let len = self.length();
        if len > max {
            self * (max / len)
        } else {
            self
        }
    }

    /// Toroidal wrap into `[0, width) x [0, height)`
    pub fn wrap(self, bounds: &WorldBounds) -> Vec2 {
        Vec2 {
            x: wrap_axis(self.x, bounds.width),
            y: wrap_axis(self.y, bounds.height),
        }
    }
}

fn wrap_axis(value: f64, extent: f64) -> f64 {
    let wrapped = value.rem_euclid(extent);
    // rem_euclid of a tiny negative value can round up to `extent`
    if wrapped >= extent {
        0.0
    } else {
        wrapped
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f64> for Vec2 {
    type Output = Vec2;
    fn div(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x / rhs, self.y / rhs)
    }
}

/// World extent; positions wrap modulo these bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub width: f64,
    pub height: f64,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            width: 1200.0,
            height: 800.0,
        }
    }
}

/// Agent lifecycle status. `Active -> Failed` is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Failed,
}

/// A single swarm member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub position: Vec2,
    pub velocity: Vec2,
    /// 0..=100, non-increasing while active
    pub battery: f64,
    pub status: AgentStatus,
    /// Currently sees the live target
    pub target_detected: bool,
}

impl Agent {
    pub fn new(id: AgentId, position: Vec2, velocity: Vec2) -> Self {
        Self {
            id,
            position,
            velocity,
            battery: 100.0,
            status: AgentStatus::Active,
            target_detected: false,
        }
    }

    pub fn with_battery(mut self, battery: f64) -> Self {
        self.battery = battery.clamp(0.0, 100.0);
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }

    pub fn distance_to(&self, other: &Agent) -> f64 {
        self.position.distance_to(other.position)
    }
}

/// Something for the swarm to find. Captured targets are replaced, not flagged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: u64,
    pub position: Vec2,
}

/// The reference five-agent formation used at swarm initialization
pub fn reference_formation() -> Vec<Agent> {
    vec![
        Agent::new(1, Vec2::new(600.0, 400.0), Vec2::new(1.0, 0.0)),
        Agent::new(2, Vec2::new(500.0, 300.0), Vec2::new(0.5, 0.5)),
        Agent::new(3, Vec2::new(700.0, 300.0), Vec2::new(-0.5, 0.5)),
        Agent::new(4, Vec2::new(500.0, 500.0), Vec2::new(0.5, -0.5)),
        Agent::new(5, Vec2::new(700.0, 500.0), Vec2::new(-0.5, -0.5)),
    ]
}
