use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Swarm-wide counters shared by the coordination loop and edge nodes
#[derive(Debug, Default)]
pub struct SwarmMetrics {
    pub ticks: AtomicU64,
    pub detections: AtomicU64,
    /// Consensus broadcast credits (one per active agent per detection)
    pub messages_sent: AtomicU64,
    pub captures: AtomicU64,
    pub agent_failures: AtomicU64,
    /// Edge-node bus publishes that went through
    pub publishes: AtomicU64,
    pub publish_failures: AtomicU64,
}

impl SwarmMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detections(&self, detections: u64, credits: u64) {
        self.detections.fetch_add(detections, Ordering::Relaxed);
        self.messages_sent.fetch_add(credits, Ordering::Relaxed);
    }

    pub fn record_capture(&self) {
        self.captures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_agent_failures(&self, count: u64) {
        if count > 0 {
            self.agent_failures.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn record_publish(&self) {
        self.publishes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        for counter in [
            &self.ticks,
            &self.detections,
            &self.messages_sent,
            &self.captures,
            &self.agent_failures,
            &self.publishes,
            &self.publish_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn get_stats(&self) -> SwarmMetricsStats {
        SwarmMetricsStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            detections: self.detections.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            captures: self.captures.load(Ordering::Relaxed),
            agent_failures: self.agent_failures.load(Ordering::Relaxed),
            publishes: self.publishes.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Swarm metrics: ticks={}, detections={}, messages={}, captures={}, failures={}, publishes={}, publish_failures={}",
            stats.ticks,
            stats.detections,
            stats.messages_sent,
            stats.captures,
            stats.agent_failures,
            stats.publishes,
            stats.publish_failures
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwarmMetricsStats {
    pub ticks: u64,
    pub detections: u64,
    pub messages_sent: u64,
    pub captures: u64,
    pub agent_failures: u64,
    pub publishes: u64,
    pub publish_failures: u64,
}

/// Time an operation and log its duration on finish
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate_and_reset() {
        let metrics = SwarmMetrics::new();
        metrics.record_tick();
        metrics.record_tick();
        metrics.record_detections(1, 5);
        metrics.record_capture();
        metrics.record_agent_failures(0);
        metrics.record_agent_failures(2);

        let stats = metrics.get_stats();
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.detections, 1);
        assert_eq!(stats.messages_sent, 5);
        assert_eq!(stats.captures, 1);
        assert_eq!(stats.agent_failures, 2);
        assert_eq!(stats.publishes, 0);

        metrics.reset();
        assert_eq!(metrics.get_stats(), SwarmMetricsStats::default());
    }

    #[test]
    fn test_publishes_do_not_count_as_broadcast_credits() {
        let metrics = SwarmMetrics::new();
        metrics.record_detections(1, 4);
        metrics.record_publish();
        metrics.record_publish();
        metrics.record_publish_failure();

        let stats = metrics.get_stats();
        assert_eq!(stats.messages_sent, 4);
        assert_eq!(stats.publishes, 2);
        assert_eq!(stats.publish_failures, 1);
    }
}
