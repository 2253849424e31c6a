use chrono::Utc;
use hdrhistogram::Histogram;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Running totals of a load run, shared by every worker.
pub struct Stats {
    // Pipeline round latency per batch (nanosecond precision)
    batch_latency_hist: Mutex<Histogram<u64>>,

    metric_count: AtomicU64,
    row_count: AtomicU64,
    batch_count: AtomicU64,

    start_time: Instant,
    last_snapshot: Mutex<Checkpoint>,
}

#[derive(Clone, Copy)]
struct Checkpoint {
    at: Instant,
    metrics: u64,
    rows: u64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            // 1ns to 1h range, 3 significant digits
            batch_latency_hist: Mutex::new(
                Histogram::new_with_bounds(1, 3_600_000_000_000, 3).expect("histogram bounds"),
            ),
            metric_count: AtomicU64::new(0),
            row_count: AtomicU64::new(0),
            batch_count: AtomicU64::new(0),
            start_time: now,
            last_snapshot: Mutex::new(Checkpoint {
                at: now,
                metrics: 0,
                rows: 0,
            }),
        }
    }

    /// Folds a metric count into the running total.
    pub fn add(&self, metrics: u64) {
        self.metric_count.fetch_add(metrics, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.metric_count.load(Ordering::Relaxed)
    }

    pub fn rows(&self) -> u64 {
        self.row_count.load(Ordering::Relaxed)
    }

    pub fn batches(&self) -> u64 {
        self.batch_count.load(Ordering::Relaxed)
    }

    /// Records one completed pipeline round.
    pub fn record_batch(&self, rows: u64, metrics: u64, latency: Duration) {
        self.add(metrics);
        self.row_count.fetch_add(rows, Ordering::Relaxed);
        self.batch_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut hist) = self.batch_latency_hist.lock() {
            let _ = hist.record((latency.as_nanos() as u64).max(1));
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let now = Instant::now();
        let metrics = self.total();
        let rows = self.rows();
        let batches = self.batches();

        let (p50, p95, p99, min, max, mean) = match self.batch_latency_hist.lock() {
            Ok(hist) if !hist.is_empty() => (
                hist.value_at_quantile(0.5),
                hist.value_at_quantile(0.95),
                hist.value_at_quantile(0.99),
                hist.min(),
                hist.max(),
                hist.mean(),
            ),
            _ => (0, 0, 0, 0, 0, 0.0),
        };

        let since_last = {
            let mut last = self
                .last_snapshot
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            let prev = *last;
            *last = Checkpoint { at: now, metrics, rows };
            prev
        };

        StatsSnapshot {
            timestamp: Utc::now().timestamp().max(0) as u64,
            metric_count: metrics,
            row_count: rows,
            batch_count: batches,
            interval_metric_count: metrics.saturating_sub(since_last.metrics),
            interval_row_count: rows.saturating_sub(since_last.rows),
            total_duration: now.duration_since(self.start_time),
            interval_duration: now.duration_since(since_last.at),
            batch_ns_p50: p50,
            batch_ns_p95: p95,
            batch_ns_p99: p99,
            batch_ns_min: min,
            batch_ns_max: max,
            batch_ns_mean: mean,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub timestamp: u64,
    pub metric_count: u64,
    pub row_count: u64,
    pub batch_count: u64,
    pub interval_metric_count: u64,
    pub interval_row_count: u64,
    pub total_duration: Duration,
    pub interval_duration: Duration,
    pub batch_ns_p50: u64,
    pub batch_ns_p95: u64,
    pub batch_ns_p99: u64,
    pub batch_ns_min: u64,
    pub batch_ns_max: u64,
    pub batch_ns_mean: f64,
}

fn per_sec(count: u64, d: Duration) -> f64 {
    let secs = d.as_secs_f64();
    if secs > 0.0 { count as f64 / secs } else { 0.0 }
}

impl StatsSnapshot {
    /// Metrics per second over the whole run
    pub fn total_metric_rate(&self) -> f64 {
        per_sec(self.metric_count, self.total_duration)
    }

    /// Metrics per second since the previous snapshot
    pub fn interval_metric_rate(&self) -> f64 {
        per_sec(self.interval_metric_count, self.interval_duration)
    }

    pub fn total_row_rate(&self) -> f64 {
        per_sec(self.row_count, self.total_duration)
    }

    pub fn interval_row_rate(&self) -> f64 {
        per_sec(self.interval_row_count, self.interval_duration)
    }

    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{:.2},{:.2},{:.2},{:.2},{},{},{},{},{},{:.2}",
            self.timestamp,
            self.metric_count,
            self.row_count,
            self.batch_count,
            self.total_metric_rate(),
            self.interval_metric_rate(),
            self.total_row_rate(),
            self.interval_row_rate(),
            self.batch_ns_p50,
            self.batch_ns_p95,
            self.batch_ns_p99,
            self.batch_ns_min,
            self.batch_ns_max,
            self.batch_ns_mean
        )
    }

    pub fn csv_header() -> &'static str {
        "timestamp,metric_count,row_count,batch_count,total_metric_rate,interval_metric_rate,total_row_rate,interval_row_rate,batch_ns_p50,batch_ns_p95,batch_ns_p99,batch_ns_min,batch_ns_max,batch_ns_mean"
    }
}
