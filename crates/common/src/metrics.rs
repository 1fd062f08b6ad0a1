//! Delivery metrics for courier.
//!
//! Counters are updated by the queue store and the delivery workers so that
//! operators can see how much work is pending, how much succeeded, and how
//! much was given up on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Global metrics instance.
static METRICS: std::sync::OnceLock<Arc<DeliveryMetrics>> = std::sync::OnceLock::new();

/// Get the global metrics instance.
pub fn get_metrics() -> &'static Arc<DeliveryMetrics> {
    METRICS.get_or_init(|| Arc::new(DeliveryMetrics::new()))
}

/// Initialize global metrics with custom instance.
pub fn init_metrics(metrics: Arc<DeliveryMetrics>) -> Result<(), Arc<DeliveryMetrics>> {
    METRICS.set(metrics)
}

/// Delivery metrics collector.
#[derive(Debug)]
pub struct DeliveryMetrics {
    // === Queue Metrics ===
    /// Jobs written to the queue by enqueue calls
    pub jobs_enqueued: AtomicU64,
    /// Jobs that could not be persisted during a batch enqueue
    pub enqueue_failures: AtomicU64,
    /// Jobs reinserted at the tail after a transient failure
    pub jobs_requeued: AtomicU64,
    /// Jobs dropped because they reached the configured attempt ceiling
    pub jobs_dead_lettered: AtomicU64,

    // === Delivery Metrics ===
    /// Attempts that ended with a 2xx/3xx response
    pub deliveries_succeeded: AtomicU64,
    /// Attempts that ended with a 4xx response or an unusable key
    pub deliveries_failed_permanent: AtomicU64,
    /// Attempts that ended with a 5xx response or no response
    pub deliveries_failed_transient: AtomicU64,
    /// Total attempt latency in microseconds
    pub delivery_latency_us_total: AtomicU64,
    /// Attempt count for average calculation
    pub delivery_latency_count: AtomicU64,
}

impl DeliveryMetrics {
    /// Create a new metrics instance with all counters at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            jobs_enqueued: AtomicU64::new(0),
            enqueue_failures: AtomicU64::new(0),
            jobs_requeued: AtomicU64::new(0),
            jobs_dead_lettered: AtomicU64::new(0),

            deliveries_succeeded: AtomicU64::new(0),
            deliveries_failed_permanent: AtomicU64::new(0),
            deliveries_failed_transient: AtomicU64::new(0),
            delivery_latency_us_total: AtomicU64::new(0),
            delivery_latency_count: AtomicU64::new(0),
        }
    }

    /// Record the result of a batch enqueue.
    pub fn record_enqueue(&self, persisted: u64, failed: u64) {
        self.jobs_enqueued.fetch_add(persisted, Ordering::Relaxed);
        self.enqueue_failures.fetch_add(failed, Ordering::Relaxed);
    }

    /// Record a job reinserted at the tail.
    pub fn record_requeue(&self) {
        self.jobs_requeued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a job dropped at the attempt ceiling.
    pub fn record_dead_letter(&self) {
        self.jobs_dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful delivery attempt.
    pub fn record_success(&self, latency: Duration) {
        self.deliveries_succeeded.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    /// Record a permanently failed delivery attempt.
    pub fn record_permanent_failure(&self, latency: Duration) {
        self.deliveries_failed_permanent
            .fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    /// Record a transiently failed delivery attempt.
    pub fn record_transient_failure(&self, latency: Duration) {
        self.deliveries_failed_transient
            .fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    fn record_latency(&self, latency: Duration) {
        self.delivery_latency_us_total
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        self.delivery_latency_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_enqueued: self.jobs_enqueued.load(Ordering::Relaxed),
            enqueue_failures: self.enqueue_failures.load(Ordering::Relaxed),
            jobs_requeued: self.jobs_requeued.load(Ordering::Relaxed),
            jobs_dead_lettered: self.jobs_dead_lettered.load(Ordering::Relaxed),

            deliveries_succeeded: self.deliveries_succeeded.load(Ordering::Relaxed),
            deliveries_failed_permanent: self
                .deliveries_failed_permanent
                .load(Ordering::Relaxed),
            deliveries_failed_transient: self
                .deliveries_failed_transient
                .load(Ordering::Relaxed),
            delivery_latency_avg_us: self.average_latency_us(),
        }
    }

    /// Calculate average delivery attempt latency.
    fn average_latency_us(&self) -> u64 {
        let total = self.delivery_latency_us_total.load(Ordering::Relaxed);
        let count = self.delivery_latency_count.load(Ordering::Relaxed);
        if count > 0 {
            total / count
        } else {
            0
        }
    }

    /// Export metrics in Prometheus format.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut output = String::new();

        let counters = [
            ("courier_jobs_enqueued", "Jobs written to the delivery queue", snapshot.jobs_enqueued),
            ("courier_enqueue_failures", "Jobs lost during batch enqueue", snapshot.enqueue_failures),
            ("courier_jobs_requeued", "Jobs requeued after transient failure", snapshot.jobs_requeued),
            ("courier_jobs_dead_lettered", "Jobs dropped at the attempt ceiling", snapshot.jobs_dead_lettered),
        ];
        for (name, help, value) in counters {
            output.push_str(&format!("# HELP {name} {help}\n"));
            output.push_str(&format!("# TYPE {name} counter\n"));
            output.push_str(&format!("{name} {value}\n"));
        }

        output.push_str("# HELP courier_deliveries_total Delivery attempts by outcome\n");
        output.push_str("# TYPE courier_deliveries_total counter\n");
        output.push_str(&format!(
            "courier_deliveries_total{{outcome=\"success\"}} {}\n",
            snapshot.deliveries_succeeded
        ));
        output.push_str(&format!(
            "courier_deliveries_total{{outcome=\"permanent\"}} {}\n",
            snapshot.deliveries_failed_permanent
        ));
        output.push_str(&format!(
            "courier_deliveries_total{{outcome=\"transient\"}} {}\n",
            snapshot.deliveries_failed_transient
        ));

        output.push_str("# HELP courier_delivery_latency_avg_us Average delivery attempt latency\n");
        output.push_str("# TYPE courier_delivery_latency_avg_us gauge\n");
        output.push_str(&format!(
            "courier_delivery_latency_avg_us {}\n",
            snapshot.delivery_latency_avg_us
        ));

        output
    }
}

impl Default for DeliveryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of all metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    // Queue
    pub jobs_enqueued: u64,
    pub enqueue_failures: u64,
    pub jobs_requeued: u64,
    pub jobs_dead_lettered: u64,

    // Delivery
    pub deliveries_succeeded: u64,
    pub deliveries_failed_permanent: u64,
    pub deliveries_failed_transient: u64,
    pub delivery_latency_avg_us: u64,
}

/// Timer guard for measuring operation duration.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
