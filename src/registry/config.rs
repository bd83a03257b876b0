//! Relay configuration
//!
//! Buffer capacities, poll timeouts and delivery pacing. The poll timeouts
//! bound shutdown latency: after a stop request the processing worker exits
//! within `ingest_poll_timeout`, and delivery tasks within
//! `delivery_poll_timeout` plus one `delivery_interval`.

use std::time::Duration;

/// Relay configuration options
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Capacity of each session's ingest buffer (chunks)
    pub ingest_capacity: usize,

    /// Capacity of each subscriber's processed buffer (chunks)
    pub processed_capacity: usize,

    /// How long the processing worker waits for a chunk before re-checking
    /// the session's active flag
    pub ingest_poll_timeout: Duration,

    /// How long a delivery task waits for a processed chunk before
    /// re-checking liveness
    pub delivery_poll_timeout: Duration,

    /// Minimum spacing between chunks delivered to one subscriber
    pub delivery_interval: Duration,

    /// Send keepalives to subscribers on delivery poll timeouts
    pub keepalive: bool,

    /// Undelivered events retained per event listener
    pub event_capacity: usize,

    /// Capacity of the channel between a delivery task and its transport
    pub delivery_channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ingest_capacity: 100,
            processed_capacity: 100,
            ingest_poll_timeout: Duration::from_secs(1),
            delivery_poll_timeout: Duration::from_secs(1),
            delivery_interval: Duration::from_millis(200), // 5 fps capture rate
            keepalive: false,
            event_capacity: 1024,
            delivery_channel_capacity: 16,
        }
    }
}

impl RelayConfig {
    /// Set the ingest buffer capacity (minimum 1)
    pub fn ingest_capacity(mut self, capacity: usize) -> Self {
        self.ingest_capacity = capacity.max(1);
        self
    }

    /// Set the per-subscriber processed buffer capacity (minimum 1)
    pub fn processed_capacity(mut self, capacity: usize) -> Self {
        self.processed_capacity = capacity.max(1);
        self
    }

    /// Set the processing worker's poll timeout
    pub fn ingest_poll_timeout(mut self, timeout: Duration) -> Self {
        self.ingest_poll_timeout = timeout;
        self
    }

    /// Set the delivery task's poll timeout
    pub fn delivery_poll_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_poll_timeout = timeout;
        self
    }

    /// Set the delivery pacing interval
    pub fn delivery_interval(mut self, interval: Duration) -> Self {
        self.delivery_interval = interval;
        self
    }

    /// Enable keepalives on delivery poll timeouts
    pub fn enable_keepalive(mut self) -> Self {
        self.keepalive = true;
        self
    }

    /// Set the event channel capacity (minimum 1)
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Set the transport channel capacity (minimum 1)
    pub fn delivery_channel_capacity(mut self, capacity: usize) -> Self {
        self.delivery_channel_capacity = capacity.max(1);
        self
    }

    /// Upper bound on how long after a stop request session tasks keep running
    pub fn shutdown_latency(&self) -> Duration {
        self.ingest_poll_timeout
            .max(self.delivery_poll_timeout + self.delivery_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();

        assert_eq!(config.ingest_capacity, 100);
        assert_eq!(config.processed_capacity, 100);
        assert_eq!(config.ingest_poll_timeout, Duration::from_secs(1));
        assert_eq!(config.delivery_poll_timeout, Duration::from_secs(1));
        assert_eq!(config.delivery_interval, Duration::from_millis(200));
        assert!(!config.keepalive);
    }

    #[test]
    fn test_builder_capacities_clamped() {
        let config = RelayConfig::default()
            .ingest_capacity(0)
            .processed_capacity(0)
            .event_capacity(0)
            .delivery_channel_capacity(0);

        assert_eq!(config.ingest_capacity, 1);
        assert_eq!(config.processed_capacity, 1);
        assert_eq!(config.event_capacity, 1);
        assert_eq!(config.delivery_channel_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = RelayConfig::default()
            .ingest_capacity(10)
            .processed_capacity(20)
            .ingest_poll_timeout(Duration::from_millis(100))
            .delivery_poll_timeout(Duration::from_millis(300))
            .delivery_interval(Duration::from_millis(40))
            .enable_keepalive();

        assert_eq!(config.ingest_capacity, 10);
        assert_eq!(config.processed_capacity, 20);
        assert_eq!(config.ingest_poll_timeout, Duration::from_millis(100));
        assert_eq!(config.delivery_poll_timeout, Duration::from_millis(300));
        assert_eq!(config.delivery_interval, Duration::from_millis(40));
        assert!(config.keepalive);
    }

    #[test]
    fn test_shutdown_latency() {
        let config = RelayConfig::default()
            .ingest_poll_timeout(Duration::from_secs(2))
            .delivery_poll_timeout(Duration::from_millis(500))
            .delivery_interval(Duration::from_millis(200));
        assert_eq!(config.shutdown_latency(), Duration::from_secs(2));

        let config = config.ingest_poll_timeout(Duration::from_millis(100));
        assert_eq!(config.shutdown_latency(), Duration::from_millis(700));
    }
}
