//! Bridge metrics for monitoring and observability.
//!
//! Counters cover every step of the routing pipeline: inbound messages,
//! dispatched and completed invocations, delivered replies, and requests
//! dropped along the way (keyed by reason).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Point-in-time snapshot of a bridge's counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStats {
    /// Messages received from the channel
    pub messages_received: u64,

    /// Invocations handed to a worker
    pub invocations_dispatched: u64,

    /// Invocations whose handler returned successfully
    pub invocations_completed: u64,

    /// Invocations whose handler failed or panicked
    pub invocations_failed: u64,

    /// Replies handed back to the channel-owning thread
    pub replies_delivered: u64,

    /// Average handler time in microseconds
    pub avg_handler_time_us: f64,

    /// Dropped requests by reason
    pub drops: HashMap<String, u64>,
}

/// Metrics collector shared by a bridge and its workers
pub struct BridgeMetrics {
    messages_received: AtomicU64,
    invocations_dispatched: AtomicU64,
    invocations_completed: AtomicU64,
    invocations_failed: AtomicU64,
    replies_delivered: AtomicU64,
    total_handler_time_us: AtomicU64,
    drops: parking_lot::Mutex<HashMap<String, u64>>,
}

impl BridgeMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            invocations_dispatched: AtomicU64::new(0),
            invocations_completed: AtomicU64::new(0),
            invocations_failed: AtomicU64::new(0),
            replies_delivered: AtomicU64::new(0),
            total_handler_time_us: AtomicU64::new(0),
            drops: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Record an inbound message
    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an invocation handed to a worker
    pub fn record_dispatch(&self) {
        self.invocations_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished handler run
    pub fn record_completion(&self, elapsed: Duration, success: bool) {
        if success {
            self.invocations_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.invocations_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_handler_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record a reply sent back to the channel-owning thread
    pub fn record_reply(&self) {
        self.replies_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dropped request
    pub fn record_drop(&self, reason: &str) {
        let mut drops = self.drops.lock();
        *drops.entry(reason.to_string()).or_insert(0) += 1;
    }

    /// Get messages received
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Get invocations dispatched
    pub fn invocations_dispatched(&self) -> u64 {
        self.invocations_dispatched.load(Ordering::Relaxed)
    }

    /// Get invocations completed
    pub fn invocations_completed(&self) -> u64 {
        self.invocations_completed.load(Ordering::Relaxed)
    }

    /// Get invocations failed
    pub fn invocations_failed(&self) -> u64 {
        self.invocations_failed.load(Ordering::Relaxed)
    }

    /// Get replies delivered
    pub fn replies_delivered(&self) -> u64 {
        self.replies_delivered.load(Ordering::Relaxed)
    }

    /// Get average handler time in microseconds
    pub fn avg_handler_time_us(&self) -> f64 {
        let finished = self.invocations_completed() + self.invocations_failed();
        if finished == 0 {
            0.0
        } else {
            self.total_handler_time_us.load(Ordering::Relaxed) as f64 / finished as f64
        }
    }

    /// Get drop counts by reason
    pub fn drops(&self) -> HashMap<String, u64> {
        self.drops.lock().clone()
    }

    /// Take a snapshot of every counter
    pub fn snapshot(&self) -> BridgeStats {
        BridgeStats {
            messages_received: self.messages_received(),
            invocations_dispatched: self.invocations_dispatched(),
            invocations_completed: self.invocations_completed(),
            invocations_failed: self.invocations_failed(),
            replies_delivered: self.replies_delivered(),
            avg_handler_time_us: self.avg_handler_time_us(),
            drops: self.drops(),
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.messages_received.store(0, Ordering::Relaxed);
        self.invocations_dispatched.store(0, Ordering::Relaxed);
        self.invocations_completed.store(0, Ordering::Relaxed);
        self.invocations_failed.store(0, Ordering::Relaxed);
        self.replies_delivered.store(0, Ordering::Relaxed);
        self.total_handler_time_us.store(0, Ordering::Relaxed);
        self.drops.lock().clear();
    }

    /// Export Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP script_bridge_messages_total Messages received from scripts\n");
        output.push_str("# TYPE script_bridge_messages_total counter\n");
        output.push_str(&format!(
            "script_bridge_messages_total {}\n",
            self.messages_received()
        ));

        output.push_str("\n# HELP script_bridge_invocations_total Handler invocations\n");
        output.push_str("# TYPE script_bridge_invocations_total counter\n");
        output.push_str(&format!(
            "script_bridge_invocations_total{{status=\"success\"}} {}\n",
            self.invocations_completed()
        ));
        output.push_str(&format!(
            "script_bridge_invocations_total{{status=\"error\"}} {}\n",
            self.invocations_failed()
        ));

        output.push_str("\n# HELP script_bridge_replies_total Replies delivered to scripts\n");
        output.push_str("# TYPE script_bridge_replies_total counter\n");
        output.push_str(&format!(
            "script_bridge_replies_total {}\n",
            self.replies_delivered()
        ));

        output.push_str("\n# HELP script_bridge_handler_time_us Average handler time\n");
        output.push_str("# TYPE script_bridge_handler_time_us gauge\n");
        output.push_str(&format!(
            "script_bridge_handler_time_us {:.2}\n",
            self.avg_handler_time_us()
        ));

        output.push_str("\n# HELP script_bridge_drops_total Dropped requests by reason\n");
        output.push_str("# TYPE script_bridge_drops_total counter\n");
        let mut drops: Vec<_> = self.drops().into_iter().collect();
        drops.sort();
        for (reason, count) in drops {
            output.push_str(&format!(
                "script_bridge_drops_total{{reason=\"{}\"}} {}\n",
                reason, count
            ));
        }

        output
    }
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer for measuring handler duration
pub struct HandlerTimer {
    start: Instant,
}

impl HandlerTimer {
    /// Start a new timer
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
