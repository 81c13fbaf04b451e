use dashmap::DashMap;
use hdrhistogram::Histogram;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::HttpTransportErrorKind;

use super::config::ScenarioExecutorKind;

/// Outcome of a single HTTP request, as recorded by the workload.
#[derive(Debug, Clone, Copy)]
pub struct HttpRequestMeta {
    pub status: Option<u16>,
    /// If set, the request failed before a response was received.
    pub transport_error_kind: Option<HttpTransportErrorKind>,
    pub elapsed: Duration,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

impl HttpRequestMeta {
    /// Transport errors and 4xx/5xx responses count as failed requests.
    pub fn is_failed(&self) -> bool {
        self.transport_error_kind.is_some() || self.status.is_some_and(|s| s >= 400)
    }
}

/// Distribution summary, values in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub count: u64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub stdev_ms: f64,
    pub p50_ms: f64,
    pub p75_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencySummary {
    fn from_histogram_us(h: &Histogram<u64>) -> Option<Self> {
        #[allow(clippy::len_zero)]
        if h.len() == 0 {
            return None;
        }

        let ms = |us: u64| us as f64 / 1000.0;
        Some(Self {
            count: h.len(),
            min_ms: ms(h.min()),
            max_ms: ms(h.max()),
            mean_ms: h.mean() / 1000.0,
            stdev_ms: h.stdev() / 1000.0,
            p50_ms: ms(h.value_at_quantile(0.50)),
            p75_ms: ms(h.value_at_quantile(0.75)),
            p90_ms: ms(h.value_at_quantile(0.90)),
            p95_ms: ms(h.value_at_quantile(0.95)),
            p99_ms: ms(h.value_at_quantile(0.99)),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioSummary {
    pub name: String,
    pub executor: ScenarioExecutorKind,

    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub iterations_total: u64,
    pub dropped_iterations_total: u64,
    pub bytes_received_total: u64,
    pub bytes_sent_total: u64,

    /// Requests per second over the whole run.
    pub rps: f64,
    pub req_per_sec_avg: f64,
    pub req_per_sec_stdev: f64,
    pub req_per_sec_max: f64,
    pub req_per_sec_stdev_pct: f64,

    pub status_counts: BTreeMap<u16, u64>,
    pub transport_errors: BTreeMap<String, u64>,

    pub latency: Option<LatencySummary>,
    pub iteration_duration: Option<LatencySummary>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub scenarios: Vec<ScenarioSummary>,
    pub run_duration: Duration,
}

impl RunSummary {
    pub fn requests_total(&self) -> u64 {
        self.scenarios.iter().map(|s| s.requests_total).sum()
    }

    pub fn failed_requests_total(&self) -> u64 {
        self.scenarios.iter().map(|s| s.failed_requests_total).sum()
    }

    pub fn iterations_total(&self) -> u64 {
        self.scenarios.iter().map(|s| s.iterations_total).sum()
    }

    pub fn dropped_iterations_total(&self) -> u64 {
        self.scenarios
            .iter()
            .map(|s| s.dropped_iterations_total)
            .sum()
    }

    pub fn bytes_received_total(&self) -> u64 {
        self.scenarios.iter().map(|s| s.bytes_received_total).sum()
    }

    pub fn bytes_sent_total(&self) -> u64 {
        self.scenarios.iter().map(|s| s.bytes_sent_total).sum()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct RpsAgg {
    count: u64,
    mean: f64,
    m2: f64,
    max: f64,
}

impl RpsAgg {
    fn record(&mut self, sample: f64) {
        if !sample.is_finite() {
            return;
        }

        self.count = self.count.saturating_add(1);
        let delta = sample - self.mean;
        self.mean += delta / (self.count as f64);
        let delta2 = sample - self.mean;
        self.m2 += delta * delta2;
        self.max = self.max.max(sample);
    }

    /// (avg, stdev, max, stdev as % of avg)
    fn summary(&self) -> (f64, f64, f64, f64) {
        if self.count == 0 {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let avg = self.mean;
        let stdev = if self.count >= 2 {
            (self.m2 / ((self.count - 1) as f64)).sqrt()
        } else {
            0.0
        };

        let stdev_pct = if avg > 0.0 {
            (stdev / avg) * 100.0
        } else {
            0.0
        };
        (avg, stdev, self.max, stdev_pct)
    }
}

/// Per-scenario counters, shared by every VU of the scenario.
#[derive(Debug)]
pub struct RunStats {
    requests_total: AtomicU64,
    failed_requests_total: AtomicU64,
    iterations_total: AtomicU64,
    dropped_iterations_total: AtomicU64,
    bytes_received_total: AtomicU64,
    bytes_sent_total: AtomicU64,

    status_counts: DashMap<u16, u64>,
    transport_errors: DashMap<HttpTransportErrorKind, u64>,

    latency_us: Mutex<Histogram<u64>>,
    latency_us_window: Mutex<Histogram<u64>>,
    iteration_us: Mutex<Histogram<u64>>,

    rps_samples: Mutex<RpsAgg>,
}

fn new_hist() -> Histogram<u64> {
    // Up to 60s in microseconds, 3 significant figures. Larger values saturate.
    Histogram::<u64>::new_with_bounds(1, 60_000_000, 3)
        .unwrap_or_else(|err| panic!("failed to init histogram: {err}"))
}

impl Default for RunStats {
    fn default() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            failed_requests_total: AtomicU64::new(0),
            iterations_total: AtomicU64::new(0),
            dropped_iterations_total: AtomicU64::new(0),
            bytes_received_total: AtomicU64::new(0),
            bytes_sent_total: AtomicU64::new(0),

            status_counts: DashMap::new(),
            transport_errors: DashMap::new(),

            latency_us: Mutex::new(new_hist()),
            latency_us_window: Mutex::new(new_hist()),
            iteration_us: Mutex::new(new_hist()),

            rps_samples: Mutex::new(RpsAgg::default()),
        }
    }
}

fn record_us(hist: &Mutex<Histogram<u64>>, elapsed: Duration) {
    let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX).max(1);
    let mut h = hist
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    h.saturating_record(us);
}

impl RunStats {
    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn failed_requests_total(&self) -> u64 {
        self.failed_requests_total.load(Ordering::Relaxed)
    }

    pub fn iterations_total(&self) -> u64 {
        self.iterations_total.load(Ordering::Relaxed)
    }

    pub fn dropped_iterations_total(&self) -> u64 {
        self.dropped_iterations_total.load(Ordering::Relaxed)
    }

    pub fn bytes_received_total(&self) -> u64 {
        self.bytes_received_total.load(Ordering::Relaxed)
    }

    pub fn bytes_sent_total(&self) -> u64 {
        self.bytes_sent_total.load(Ordering::Relaxed)
    }

    pub fn status_counts(&self) -> BTreeMap<u16, u64> {
        self.status_counts
            .iter()
            .map(|e| (*e.key(), *e.value()))
            .collect()
    }

    pub fn transport_errors(&self) -> BTreeMap<String, u64> {
        self.transport_errors
            .iter()
            .map(|e| (e.key().to_string(), *e.value()))
            .collect()
    }

    pub fn record_http_request(&self, req: HttpRequestMeta) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if req.is_failed() {
            self.failed_requests_total.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(kind) = req.transport_error_kind {
            *self.transport_errors.entry(kind).or_insert(0) += 1;
        } else if let Some(status) = req.status {
            *self.status_counts.entry(status).or_insert(0) += 1;
        }

        if req.bytes_received != 0 {
            self.bytes_received_total
                .fetch_add(req.bytes_received, Ordering::Relaxed);
        }
        if req.bytes_sent != 0 {
            self.bytes_sent_total
                .fetch_add(req.bytes_sent, Ordering::Relaxed);
        }

        record_us(&self.latency_us, req.elapsed);
        record_us(&self.latency_us_window, req.elapsed);
    }

    pub fn record_iteration(&self, elapsed: Duration) {
        self.iterations_total.fetch_add(1, Ordering::Relaxed);
        record_us(&self.iteration_us, elapsed);
    }

    pub fn record_dropped_iterations(&self, n: u64) {
        if n != 0 {
            self.dropped_iterations_total
                .fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn record_rps_sample(&self, rps_now: f64) {
        let mut agg = self
            .rps_samples
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        agg.record(rps_now);
    }

    pub fn req_per_sec_summary(&self) -> (f64, f64, f64, f64) {
        let agg = self
            .rps_samples
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        agg.summary()
    }

    /// Latency over the whole scenario so far.
    pub fn latency_summary(&self) -> Option<LatencySummary> {
        let h = self
            .latency_us
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        LatencySummary::from_histogram_us(&h)
    }

    /// p50/p95 of the requests recorded since the previous call, in milliseconds.
    pub fn take_latency_window_ms(&self) -> (Option<f64>, Option<f64>) {
        let mut h = self
            .latency_us_window
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        #[allow(clippy::len_zero)]
        let out = if h.len() == 0 {
            (None, None)
        } else {
            let p50 = h.value_at_quantile(0.50) as f64 / 1000.0;
            let p95 = h.value_at_quantile(0.95) as f64 / 1000.0;
            (Some(p50), Some(p95))
        };

        h.reset();
        out
    }

    pub fn summarize(
        &self,
        name: &str,
        executor: ScenarioExecutorKind,
        elapsed: Duration,
    ) -> ScenarioSummary {
        let secs = elapsed.as_secs_f64().max(1e-9);
        let requests_total = self.requests_total();

        let (req_per_sec_avg, req_per_sec_stdev, req_per_sec_max, req_per_sec_stdev_pct) =
            self.req_per_sec_summary();

        let iteration_duration = {
            let h = self
                .iteration_us
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            LatencySummary::from_histogram_us(&h)
        };

        ScenarioSummary {
            name: name.to_string(),
            executor,
            requests_total,
            failed_requests_total: self.failed_requests_total(),
            iterations_total: self.iterations_total(),
            dropped_iterations_total: self.dropped_iterations_total(),
            bytes_received_total: self.bytes_received_total(),
            bytes_sent_total: self.bytes_sent_total(),
            rps: (requests_total as f64) / secs,
            req_per_sec_avg,
            req_per_sec_stdev,
            req_per_sec_max,
            req_per_sec_stdev_pct,
            status_counts: self.status_counts(),
            transport_errors: self.transport_errors(),
            latency: self.latency_summary(),
            iteration_duration,
        }
    }
}
