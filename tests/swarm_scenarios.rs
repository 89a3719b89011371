// Reference scenarios for the coordination tick
// Each test builds an explicit formation, runs one tick and checks the committed state

use gem_swarm::swarm::{
    Agent, AgentStatus, ConnectivityGraph, MotionModel, SwarmContext, SwarmParams, Vec2,
};
use gem_swarm::SwarmMetrics;
use std::sync::Arc;

const TOLERANCE: f64 = 1e-6;

fn params() -> SwarmParams {
    SwarmParams {
        tick_hz: 60.0,
        ..Default::default()
    }
}

fn agent(id: u32, x: f64, y: f64) -> Agent {
    Agent::new(id, Vec2::new(x, y), Vec2::ZERO)
}

fn assert_vec_close(actual: Vec2, expected: Vec2) {
    assert!(
        (actual.x - expected.x).abs() < TOLERANCE && (actual.y - expected.y).abs() < TOLERANCE,
        "expected {expected:?}, got {actual:?}"
    );
}

#[test]
fn test_two_close_agents_separation_and_cohesion_balance() {
    // A at (0,0), B at (10,0): both inside separation (100) and cohesion (200) range.
    // Separation on A: (A-B)/|A-B| * 0.1 = (-0.1, 0)
    // Cohesion on A:   (B - A) * 0.01     = ( 0.1, 0)
    // Alignment: neighbour velocity is zero. Seek: nobody has detected the target.
    let mut ctx = SwarmContext::with_agents(
        params(),
        vec![agent(1, 0.0, 0.0), agent(2, 10.0, 0.0)],
        Some(Vec2::new(600.0, 400.0)),
        Some(1),
    );

    let snapshot = ctx.registry().snapshot();
    let model = MotionModel::new(ctx.params().flocking);
    let a = model.terms(&snapshot.agents[0], &snapshot, None);
    assert_vec_close(a.separation, Vec2::new(-0.1, 0.0));
    assert_vec_close(a.cohesion, Vec2::new(0.1, 0.0));
    assert_vec_close(a.alignment, Vec2::ZERO);

    let b = model.terms(&snapshot.agents[1], &snapshot, None);
    assert_vec_close(b.separation, Vec2::new(0.1, 0.0));
    assert_vec_close(b.cohesion, Vec2::new(-0.1, 0.0));

    let proposals = model.compute(&snapshot);
    assert_eq!(proposals.len(), 2);
    for proposal in &proposals {
        assert_vec_close(proposal.delta, Vec2::ZERO);
        assert_vec_close(proposal.velocity, Vec2::ZERO);
    }

    ctx.tick();
    assert_vec_close(ctx.registry().agent(1).unwrap().position, Vec2::new(0.0, 0.0));
    assert_vec_close(ctx.registry().agent(2).unwrap().position, Vec2::new(10.0, 0.0));
}

#[test]
fn test_detection_credits_every_active_agent_regardless_of_reachability() {
    let metrics = Arc::new(SwarmMetrics::new());
    let mut ctx = SwarmContext::with_agents(
        params(),
        vec![
            agent(1, 100.0, 100.0),
            agent(2, 900.0, 600.0),
            agent(3, 1000.0, 700.0),
            agent(4, 1100.0, 100.0),
            agent(5, 500.0, 700.0),
        ],
        Some(Vec2::new(150.0, 100.0)),
        Some(2),
    )
    .with_metrics(metrics.clone());

    let pre_tick = ConnectivityGraph::build(&ctx.registry().snapshot(), &ctx.params().connectivity);
    assert_eq!(pre_tick.reachable_from(1).len(), 1, "detector is isolated");

    let report = ctx.tick();
    assert_eq!(report.detections, 1);
    assert_eq!(report.broadcast_credits, 5);
    assert!(report.capture.is_none());
    assert!(ctx.registry().agent(1).unwrap().target_detected);

    let stats = metrics.get_stats();
    assert_eq!(stats.detections, 1);
    assert_eq!(stats.messages_sent, 5);

    // Still in range next tick: no new rising edge
    let report = ctx.tick();
    assert_eq!(report.detections, 0);
    assert_eq!(metrics.get_stats().detections, 1);
}

#[test]
fn test_last_battery_step_fails_the_agent() {
    let drain = params().resilience.battery_drain_per_tick;
    let mut ctx = SwarmContext::with_agents(
        params(),
        vec![
            agent(1, 300.0, 300.0).with_battery(drain),
            agent(2, 400.0, 300.0),
        ],
        Some(Vec2::new(1000.0, 700.0)),
        Some(3),
    );

    let report = ctx.tick();
    assert_eq!(report.failed, vec![1]);

    let failed = ctx.registry().agent(1).unwrap().clone();
    assert_eq!(failed.battery, 0.0);
    assert_eq!(failed.status, AgentStatus::Failed);

    for _ in 0..10 {
        ctx.tick();
    }
    let later = ctx.registry().agent(1).unwrap();
    assert_eq!(later.status, AgentStatus::Failed);
    assert_eq!(later.position, failed.position);
    assert_eq!(ctx.graph().degree(1), 0);
    assert_eq!(ctx.stats().active_agents, 1);
}

#[test]
fn test_capture_replaces_target_in_the_same_tick() {
    let captured_at = Vec2::new(310.0, 300.0);
    let mut ctx = SwarmContext::with_agents(
        params(),
        vec![agent(1, 300.0, 300.0), agent(2, 320.0, 300.0), agent(3, 900.0, 600.0)],
        Some(captured_at),
        Some(4),
    );
    let first_target = *ctx.registry().live_target().unwrap();

    let report = ctx.tick();
    let capture = report.capture.expect("target should be captured");
    assert_eq!(capture.agent, 1, "lowest id wins the capture");
    assert_eq!(capture.captured, first_target);

    let targets = ctx.registry().targets();
    assert_eq!(targets.len(), 1);
    assert_ne!(targets[0].position, captured_at);
    assert_ne!(targets[0].id, first_target.id);
    assert!((100.0..=1100.0).contains(&targets[0].position.x));
    assert!((100.0..=700.0).contains(&targets[0].position.y));

    assert!(!ctx.registry().agent(1).unwrap().target_detected);
    assert_eq!(ctx.stats().captures, 1);
}

#[test]
fn test_operator_failure_applies_between_ticks() {
    let mut ctx = SwarmContext::init(params(), Some(5));
    ctx.tick();

    assert!(ctx.fail_agent(2));
    assert!(!ctx.fail_agent(2), "already failed");
    assert!(!ctx.fail_agent(42), "unknown agent");

    let report = ctx.tick();
    assert_eq!(report.active_agents, 4);
    assert!(ctx.graph().neighbors(2).is_empty());

    let random = ctx.fail_random_agent().expect("active agents remain");
    assert_ne!(random, 2);
    assert_eq!(ctx.stats().active_agents, 3);
}
