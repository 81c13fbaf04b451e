use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::sync::Arc;

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(
        &self,
        _source: &str,
        _request: &rampload_core::RequestSpec,
        _scenarios: &[rampload_core::ScenarioConfig],
    ) {
    }

    fn progress(&self) -> Option<rampload_core::ProgressFn> {
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, summary: &rampload_core::RunSummary) -> anyhow::Result<()> {
        let line = build_summary_line(summary);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub scenario: String,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub interval_secs: f64,

    pub active_vus: u64,
    pub max_vus: u64,
    pub target: Option<u64>,
    pub dropped_iterations_total: Option<u64>,

    pub requests_per_sec: f64,
    pub iterations_per_sec: f64,
    pub bytes_received_per_sec: u64,
    pub bytes_sent_per_sec: u64,
    pub error_rate: f64,
    pub latency_p50_ms: Option<f64>,
    pub latency_p95_ms: Option<f64>,

    pub total_requests: u64,
    pub total_failed_requests: u64,
    pub total_iterations: u64,
    pub total_bytes_received: u64,
    pub total_bytes_sent: u64,

    pub req_per_sec_avg: f64,
    pub req_per_sec_stdev: f64,
    pub req_per_sec_max: f64,
    pub req_per_sec_stdev_pct: f64,
}

fn build_progress_line(u: &rampload_core::ProgressUpdate) -> JsonProgressLine {
    let (active_vus, max_vus) = u.progress.vus();
    let (target, dropped_iterations_total) = match &u.progress {
        rampload_core::ScenarioProgress::ConstantVus { .. } => (None, None),
        rampload_core::ScenarioProgress::RampingVus { stage, .. } => {
            (stage.as_ref().map(|s| s.current_target), None)
        }
        rampload_core::ScenarioProgress::RampingArrivalRate {
            stage,
            dropped_iterations_total,
            ..
        } => (
            stage.as_ref().map(|s| s.current_target),
            Some(*dropped_iterations_total),
        ),
    };

    let m = &u.metrics;
    JsonProgressLine {
        kind: "progress",
        scenario: u.scenario.clone(),
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs_f64(),
        interval_secs: u.interval.as_secs_f64(),

        active_vus,
        max_vus,
        target,
        dropped_iterations_total,

        requests_per_sec: m.rps_now,
        iterations_per_sec: m.iterations_per_sec_now,
        bytes_received_per_sec: m.bytes_received_per_sec_now,
        bytes_sent_per_sec: m.bytes_sent_per_sec_now,
        error_rate: m.error_rate_now,
        latency_p50_ms: m.latency_p50_ms_now,
        latency_p95_ms: m.latency_p95_ms_now,

        total_requests: m.requests_total,
        total_failed_requests: m.failed_requests_total,
        total_iterations: m.iterations_total,
        total_bytes_received: m.bytes_received_total,
        total_bytes_sent: m.bytes_sent_total,

        req_per_sec_avg: m.req_per_sec_avg,
        req_per_sec_stdev: m.req_per_sec_stdev,
        req_per_sec_max: m.req_per_sec_max,
        req_per_sec_stdev_pct: m.req_per_sec_stdev_pct,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub run_duration_secs: f64,
    pub scenarios: Vec<JsonScenarioSummary>,
    pub totals: JsonTotals,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonScenarioSummary {
    pub scenario: String,
    pub executor: String,

    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub iterations_total: u64,
    pub dropped_iterations_total: u64,
    pub bytes_received_total: u64,
    pub bytes_sent_total: u64,

    pub rps: f64,
    pub req_per_sec_avg: f64,
    pub req_per_sec_stdev: f64,
    pub req_per_sec_max: f64,

    pub status_counts: BTreeMap<String, u64>,
    pub transport_errors: BTreeMap<String, u64>,

    pub latency: Option<JsonLatencySummary>,
    pub iteration_duration: Option<JsonLatencySummary>,
}

/// Milliseconds.
#[derive(Debug, Serialize)]
pub(crate) struct JsonLatencySummary {
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stdev: f64,
    pub count: u64,
}

impl From<&rampload_core::LatencySummary> for JsonLatencySummary {
    fn from(l: &rampload_core::LatencySummary) -> Self {
        Self {
            p50: l.p50_ms,
            p75: l.p75_ms,
            p90: l.p90_ms,
            p95: l.p95_ms,
            p99: l.p99_ms,
            min: l.min_ms,
            max: l.max_ms,
            mean: l.mean_ms,
            stdev: l.stdev_ms,
            count: l.count,
        }
    }
}

#[derive(Debug, Serialize, Default)]
pub(crate) struct JsonTotals {
    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub iterations_total: u64,
    pub dropped_iterations_total: u64,
    pub bytes_received_total: u64,
    pub bytes_sent_total: u64,
}

fn build_summary_line(summary: &rampload_core::RunSummary) -> JsonSummaryLine {
    let scenarios = summary
        .scenarios
        .iter()
        .map(|s| JsonScenarioSummary {
            scenario: s.name.clone(),
            executor: s.executor.to_string(),
            requests_total: s.requests_total,
            failed_requests_total: s.failed_requests_total,
            iterations_total: s.iterations_total,
            dropped_iterations_total: s.dropped_iterations_total,
            bytes_received_total: s.bytes_received_total,
            bytes_sent_total: s.bytes_sent_total,
            rps: s.rps,
            req_per_sec_avg: s.req_per_sec_avg,
            req_per_sec_stdev: s.req_per_sec_stdev,
            req_per_sec_max: s.req_per_sec_max,
            status_counts: s
                .status_counts
                .iter()
                .map(|(code, n)| (code.to_string(), *n))
                .collect(),
            transport_errors: s.transport_errors.clone(),
            latency: s.latency.as_ref().map(JsonLatencySummary::from),
            iteration_duration: s.iteration_duration.as_ref().map(JsonLatencySummary::from),
        })
        .collect::<Vec<_>>();

    JsonSummaryLine {
        kind: "summary",
        run_duration_secs: summary.run_duration.as_secs_f64(),
        scenarios,
        totals: JsonTotals {
            requests_total: summary.requests_total(),
            failed_requests_total: summary.failed_requests_total(),
            iterations_total: summary.iterations_total(),
            dropped_iterations_total: summary.dropped_iterations_total(),
            bytes_received_total: summary.bytes_received_total(),
            bytes_sent_total: summary.bytes_sent_total(),
        },
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
