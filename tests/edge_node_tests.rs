// Edge node integration tests
// Nodes run against the in-process loopback bus on a paused tokio clock

use gem_swarm::edge::{
    command_topic, telemetry_topic, Command, EdgeNode, EdgeNodeSettings, EdgeStatus, LoopbackBus,
    MessageBus, SimulatedDetector, SimulatedFlightController, TelemetryMessage,
    BROADCAST_COMMAND_TOPIC,
};
use gem_swarm::shutdown::{ShutdownCoordinator, ShutdownSignal};
use std::sync::Arc;
use std::time::Duration;

fn node(bus: Arc<LoopbackBus>, detection_probability: f64) -> EdgeNode {
    EdgeNode::new(
        "drone-7",
        EdgeNodeSettings::default(),
        bus,
        Box::new(SimulatedFlightController::new(Some(7))),
        Box::new(SimulatedDetector::new(detection_probability, 0.5, Some(7))),
    )
}

#[tokio::test(start_paused = true)]
async fn test_telemetry_is_published_once_per_second() {
    let bus = Arc::new(LoopbackBus::new());
    let mut telemetry = bus.subscribe(&telemetry_topic("drone-7")).await.unwrap();
    let coordinator = ShutdownCoordinator::new();

    let stopper = async {
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        coordinator.trigger();
    };
    let (report, ()) = tokio::join!(node(bus.clone(), 0.0).run(coordinator.signal()), stopper);

    let mut received = Vec::new();
    while let Ok(message) = telemetry.try_recv() {
        received.push(serde_json::from_slice::<TelemetryMessage>(&message.payload).unwrap());
    }
    assert_eq!(received.len(), 3);
    assert!(received.iter().all(|t| t.agent_id == "drone-7"));
    assert!(received.iter().all(|t| t.status == EdgeStatus::Active));
    assert!(received
        .windows(2)
        .all(|pair| pair[1].battery < pair[0].battery));
    assert!((received[0].latitude - 59.9139).abs() <= 0.01 + 1e-9);

    assert_eq!(report.status, EdgeStatus::Active);
    assert_eq!(report.messages_sent, 3);
    assert_eq!(report.detections, 0);
    assert!(!bus.is_connected(), "node closes its bus on exit");
}

#[tokio::test(start_paused = true)]
async fn test_commands_arrive_out_of_band() {
    let bus = Arc::new(LoopbackBus::new());
    let coordinator = ShutdownCoordinator::new();

    let commander = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        bus.publish(&command_topic("drone-7"), b"{broken")
            .await
            .unwrap();
        bus.publish(
            BROADCAST_COMMAND_TOPIC,
            &Command::FormationChange {
                formation: Some("wedge".to_string()),
            }
            .to_payload(),
        )
        .await
        .unwrap();
        bus.publish(&command_topic("drone-7"), &Command::Loiter.to_payload())
            .await
            .unwrap();
        // Addressed to someone else
        bus.publish(&command_topic("drone-8"), &Command::EmergencyLand.to_payload())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        coordinator.trigger();
    };
    let (report, ()) = tokio::join!(node(bus.clone(), 1.0).run(coordinator.signal()), commander);

    assert_eq!(report.status, EdgeStatus::Loitering);
    // Loitering from 50 ms on, before the first detection cycle at 100 ms
    assert_eq!(report.detections, 0);
}

#[tokio::test(start_paused = true)]
async fn test_depleted_battery_stops_the_node() {
    let bus = Arc::new(LoopbackBus::new());
    let started = tokio::time::Instant::now();
    let report = node(bus, 0.0)
        .with_battery(0.05)
        .run(ShutdownSignal::never())
        .await;

    assert_eq!(report.status, EdgeStatus::Emergency);
    assert_eq!(report.battery, 0.0);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_low_battery_returns_and_stops_detecting() {
    let bus = Arc::new(LoopbackBus::new());
    let coordinator = ShutdownCoordinator::new();

    let stopper = async {
        tokio::time::sleep(Duration::from_secs(2)).await;
        coordinator.trigger();
    };
    let (report, ()) = tokio::join!(
        node(bus, 1.0).with_battery(20.5).run(coordinator.signal()),
        stopper
    );

    assert_eq!(report.status, EdgeStatus::Returning);
    // Detection ticks every 100 ms; the battery crosses 20% after ~500 ms
    assert!(
        (4..=5).contains(&report.detections),
        "detections = {}",
        report.detections
    );
    assert!(report.battery > 0.0);
}
