use std::collections::BTreeMap;
use std::time::Duration;

use super::stats::LatencySummary;

#[derive(Debug, Clone, Default)]
pub struct LiveMetrics {
    /// Requests/sec observed during the last progress interval.
    pub rps_now: f64,
    pub iterations_per_sec_now: f64,
    pub bytes_received_per_sec_now: u64,
    pub bytes_sent_per_sec_now: u64,

    /// Failed requests / total requests during the last interval (0..=1).
    pub error_rate_now: f64,
    pub latency_p50_ms_now: Option<f64>,
    pub latency_p95_ms_now: Option<f64>,

    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub iterations_total: u64,
    pub bytes_received_total: u64,
    pub bytes_sent_total: u64,

    pub req_per_sec_avg: f64,
    pub req_per_sec_stdev: f64,
    pub req_per_sec_max: f64,
    pub req_per_sec_stdev_pct: f64,

    /// Latency over the run so far.
    pub latency: Option<LatencySummary>,

    pub status_counts: BTreeMap<u16, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageProgress {
    /// 1-based stage index.
    pub stage: usize,
    pub stages: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

#[derive(Debug, Clone)]
pub enum ScenarioProgress {
    ConstantVus {
        vus: u64,
        duration: Option<Duration>,
    },
    RampingVus {
        total_duration: Duration,
        stage: Option<StageProgress>,
        max_vus: u64,
    },
    RampingArrivalRate {
        time_unit: Duration,
        total_duration: Duration,
        stage: Option<StageProgress>,
        active_vus: u64,
        max_vus: u64,
        dropped_iterations_total: u64,
    },
}

impl ScenarioProgress {
    /// (active, max) VUs for display.
    pub fn vus(&self) -> (u64, u64) {
        match self {
            Self::ConstantVus { vus, .. } => (*vus, *vus),
            Self::RampingVus { stage, max_vus, .. } => {
                let current = stage.as_ref().map_or(0, |s| s.current_target);
                (current, *max_vus)
            }
            Self::RampingArrivalRate {
                active_vus,
                max_vus,
                ..
            } => (*active_vus, *max_vus),
        }
    }

    pub fn total_duration(&self) -> Option<Duration> {
        match self {
            Self::ConstantVus { duration, .. } => *duration,
            Self::RampingVus { total_duration, .. }
            | Self::RampingArrivalRate { total_duration, .. } => Some(*total_duration),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Monotonic tick counter (1-based).
    pub tick: u64,
    pub elapsed: Duration,
    pub interval: Duration,
    pub scenario: String,
    pub metrics: LiveMetrics,
    pub progress: ScenarioProgress,
}

pub type ProgressFn = std::sync::Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;
