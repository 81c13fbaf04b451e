use std::future::Future;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::error::Result;

use super::config::{ScenarioConfig, ScenarioExecutor, ScenarioExecutorKind};
use super::gate::IterationGate;
use super::pacer::ArrivalPacer;
use super::progress::{LiveMetrics, ProgressFn, ProgressUpdate, ScenarioProgress, StageProgress};
use super::schedule::{RampingU64Schedule, StageSnapshot};
use super::stats::{RunStats, RunSummary};
use super::vu::{IterationContext, StartSignal, VuContext, VuWork, run_vu};

const PACER_TICK: Duration = Duration::from_millis(10);
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone)]
enum ProgressSource {
    ConstantVus {
        vus: u64,
        duration: Option<Duration>,
    },
    RampingVus {
        schedule: Arc<RampingU64Schedule>,
        max_vus: u64,
    },
    ArrivalRate {
        schedule: Arc<RampingU64Schedule>,
        time_unit: Duration,
        pacer: Arc<ArrivalPacer>,
    },
}

impl ProgressSource {
    fn snapshot(&self, elapsed: Duration) -> ScenarioProgress {
        fn stage(st: StageSnapshot) -> StageProgress {
            StageProgress {
                stage: st.index + 1,
                stages: st.count,
                stage_elapsed: st.stage_elapsed,
                stage_remaining: st.stage_remaining,
                start_target: st.start_target,
                end_target: st.end_target,
                current_target: st.current_target,
            }
        }

        match self {
            Self::ConstantVus { vus, duration } => ScenarioProgress::ConstantVus {
                vus: *vus,
                duration: *duration,
            },
            Self::RampingVus { schedule, max_vus } => ScenarioProgress::RampingVus {
                total_duration: schedule.total_duration(),
                stage: schedule.stage_snapshot_at(elapsed).map(stage),
                max_vus: *max_vus,
            },
            Self::ArrivalRate {
                schedule,
                time_unit,
                pacer,
            } => ScenarioProgress::RampingArrivalRate {
                time_unit: *time_unit,
                total_duration: schedule.total_duration(),
                stage: schedule.stage_snapshot_at(elapsed).map(stage),
                active_vus: pacer.active_vus(),
                max_vus: pacer.max_vus(),
                dropped_iterations_total: pacer.dropped_total(),
            },
        }
    }
}

struct ScenarioRuntime {
    name: Arc<str>,
    kind: ScenarioExecutorKind,
    stats: Arc<RunStats>,
    source: ProgressSource,
}

#[derive(Default)]
struct LastTotals {
    requests_total: u64,
    failed_requests_total: u64,
    iterations_total: u64,
    bytes_received_total: u64,
    bytes_sent_total: u64,
}

fn live_metrics(stats: &RunStats, last: &mut LastTotals, dt: Duration) -> LiveMetrics {
    let secs = dt.as_secs_f64().max(1e-9);
    let per_sec = |delta: u64| (delta as f64) / secs;

    let requests_total = stats.requests_total();
    let failed_requests_total = stats.failed_requests_total();
    let iterations_total = stats.iterations_total();
    let bytes_received_total = stats.bytes_received_total();
    let bytes_sent_total = stats.bytes_sent_total();

    let delta_requests = requests_total.saturating_sub(last.requests_total);
    let delta_failed = failed_requests_total.saturating_sub(last.failed_requests_total);
    let rps_now = per_sec(delta_requests);
    stats.record_rps_sample(rps_now);

    let error_rate_now = if delta_requests == 0 {
        0.0
    } else {
        (delta_failed as f64) / (delta_requests as f64)
    };

    let (latency_p50_ms_now, latency_p95_ms_now) = stats.take_latency_window_ms();
    let (req_per_sec_avg, req_per_sec_stdev, req_per_sec_max, req_per_sec_stdev_pct) =
        stats.req_per_sec_summary();

    let metrics = LiveMetrics {
        rps_now,
        iterations_per_sec_now: per_sec(iterations_total.saturating_sub(last.iterations_total)),
        bytes_received_per_sec_now: per_sec(
            bytes_received_total.saturating_sub(last.bytes_received_total),
        )
        .round() as u64,
        bytes_sent_per_sec_now: per_sec(bytes_sent_total.saturating_sub(last.bytes_sent_total))
            .round() as u64,
        error_rate_now,
        latency_p50_ms_now,
        latency_p95_ms_now,
        requests_total,
        failed_requests_total,
        iterations_total,
        bytes_received_total,
        bytes_sent_total,
        req_per_sec_avg,
        req_per_sec_stdev,
        req_per_sec_max,
        req_per_sec_stdev_pct,
        latency: stats.latency_summary(),
        status_counts: stats.status_counts(),
    };

    *last = LastTotals {
        requests_total,
        failed_requests_total,
        iterations_total,
        bytes_received_total,
        bytes_sent_total,
    };
    metrics
}

/// Samples per-second rates for every scenario and forwards them to `progress`, if any.
async fn sample_progress(
    scenarios: Vec<(Arc<str>, Arc<RunStats>, ProgressSource)>,
    started: Instant,
    progress: Option<ProgressFn>,
) {
    let mut interval = tokio::time::interval_at(
        tokio::time::Instant::now() + PROGRESS_INTERVAL,
        PROGRESS_INTERVAL,
    );
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last: Vec<LastTotals> = scenarios.iter().map(|_| LastTotals::default()).collect();
    let mut last_at = Instant::now();
    let mut tick: u64 = 0;

    loop {
        interval.tick().await;

        tick = tick.saturating_add(1);
        let now = Instant::now();
        let dt = now.duration_since(last_at);
        last_at = now;
        let elapsed = started.elapsed();

        for ((name, stats, source), last) in scenarios.iter().zip(last.iter_mut()) {
            let metrics = live_metrics(stats, last, dt);
            if let Some(progress) = &progress {
                (progress)(ProgressUpdate {
                    tick,
                    elapsed,
                    interval: dt,
                    scenario: name.to_string(),
                    metrics,
                    progress: source.snapshot(elapsed),
                });
            }
        }
    }
}

/// Releases iteration tokens for one arrival-rate scenario.
///
/// The number released by `t` is `floor(integral(rate, 0..t) / time_unit)`, so late ticks catch
/// up instead of losing iterations. Whatever the pool cannot absorb is recorded as dropped.
async fn pace_arrivals(
    scenario: Arc<str>,
    schedule: Arc<RampingU64Schedule>,
    time_unit: Duration,
    pacer: Arc<ArrivalPacer>,
    stats: Arc<RunStats>,
    started: Instant,
) -> Result<()> {
    let mut interval = tokio::time::interval(PACER_TICK);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let total = schedule.total_duration();
    let unit_s = time_unit.as_secs_f64().max(1e-9);
    let mut released: u64 = 0;
    let mut warned = false;

    loop {
        interval.tick().await;

        let elapsed = started.elapsed().min(total);
        let due_total = (schedule.area_until(elapsed) / unit_s).floor() as u64;
        let dropped = pacer.update_due(due_total.saturating_sub(released));
        released = released.max(due_total);

        if dropped != 0 {
            stats.record_dropped_iterations(dropped);
            if !warned {
                warned = true;
                tracing::warn!(
                    scenario = %scenario,
                    max_vus = pacer.max_vus(),
                    "not enough VUs to sustain the arrival rate, dropping iterations"
                );
            }
        }

        if elapsed >= total {
            break;
        }
    }

    pacer.mark_done();
    tracing::debug!(
        scenario = %scenario,
        released,
        dropped = pacer.dropped_total(),
        "arrival schedule finished"
    );
    Ok(())
}

/// Run every scenario concurrently, calling `iteration` once per iteration.
///
/// Each scenario spawns its maximum VU count as tasks up front. The first iteration or task
/// error aborts the run.
pub async fn run_scenarios<F, Fut, E>(
    scenarios: Vec<ScenarioConfig>,
    iteration: F,
    progress: Option<ProgressFn>,
) -> Result<RunSummary>
where
    F: Fn(IterationContext) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let start_signal = Arc::new(StartSignal::new());
    let run_started: Arc<OnceLock<Instant>> = Arc::new(OnceLock::new());

    let mut tasks: JoinSet<Result<()>> = JoinSet::new();
    let mut runtimes: Vec<ScenarioRuntime> = Vec::with_capacity(scenarios.len());
    let mut gates: Vec<Arc<IterationGate>> = Vec::new();
    let mut pacers = Vec::new();
    let mut next_vu_id: u64 = 1;

    for scenario in scenarios {
        let name: Arc<str> = Arc::from(scenario.name.as_str());
        let stats = Arc::new(RunStats::default());
        let max_vus = scenario.max_vus();

        let (work, source) = match &scenario.executor {
            ScenarioExecutor::ConstantVus { vus } => {
                let gate = Arc::new(IterationGate::new(scenario.iterations, scenario.duration));
                gates.push(gate.clone());
                (
                    VuWork::Constant { gate },
                    ProgressSource::ConstantVus {
                        vus: *vus,
                        duration: scenario.duration,
                    },
                )
            }
            ScenarioExecutor::RampingVus { start_vus, stages } => {
                let schedule = Arc::new(RampingU64Schedule::new(*start_vus, stages.clone()));
                (
                    VuWork::RampingVus {
                        schedule: schedule.clone(),
                    },
                    ProgressSource::RampingVus { schedule, max_vus },
                )
            }
            ScenarioExecutor::RampingArrivalRate {
                start_rate,
                time_unit,
                pre_allocated_vus,
                max_vus,
                stages,
            } => {
                let schedule = Arc::new(RampingU64Schedule::new(*start_rate, stages.clone()));
                let pacer = Arc::new(ArrivalPacer::new(*pre_allocated_vus, *max_vus));
                pacers.push((
                    name.clone(),
                    schedule.clone(),
                    *time_unit,
                    pacer.clone(),
                    stats.clone(),
                ));
                (
                    VuWork::ArrivalRate {
                        pacer: pacer.clone(),
                    },
                    ProgressSource::ArrivalRate {
                        schedule,
                        time_unit: *time_unit,
                        pacer,
                    },
                )
            }
        };

        tracing::info!(
            scenario = %name,
            executor = %scenario.executor.kind(),
            max_vus,
            iterations = ?scenario.iterations,
            duration = ?scenario.duration,
            "starting scenario"
        );

        for scenario_vu in 1..=max_vus {
            let ctx = VuContext {
                vu_id: next_vu_id,
                scenario: name.clone(),
                scenario_vu,
                stats: stats.clone(),
                work: work.clone(),
                start_signal: start_signal.clone(),
                run_started: run_started.clone(),
            };
            next_vu_id = next_vu_id.saturating_add(1);

            tasks.spawn(run_vu(ctx, iteration.clone()));
        }

        runtimes.push(ScenarioRuntime {
            name,
            kind: scenario.executor.kind(),
            stats,
            source,
        });
    }

    let started = Instant::now();
    let _ = run_started.set(started);
    for gate in &gates {
        gate.start_at(started);
    }
    start_signal.start();

    // Pacers start after the VUs are released so no backlog builds while they wait.
    for (name, schedule, time_unit, pacer, stats) in pacers {
        tasks.spawn(pace_arrivals(name, schedule, time_unit, pacer, stats, started));
    }

    let sampler = tokio::spawn(sample_progress(
        runtimes
            .iter()
            .map(|r| (r.name.clone(), r.stats.clone(), r.source.clone()))
            .collect(),
        started,
        progress,
    ));

    // Dropping the set on the error path aborts the remaining tasks.
    let outcome = async {
        while let Some(joined) = tasks.join_next().await {
            joined??;
        }
        Ok::<(), crate::Error>(())
    }
    .await;

    sampler.abort();
    let _ = sampler.await;
    outcome?;

    let run_duration = started.elapsed();
    let scenarios = runtimes
        .iter()
        .map(|r| r.stats.summarize(&r.name, r.kind, run_duration))
        .collect::<Vec<_>>();

    for s in &scenarios {
        tracing::info!(
            scenario = %s.name,
            requests = s.requests_total,
            failed = s.failed_requests_total,
            iterations = s.iterations_total,
            dropped_iterations = s.dropped_iterations_total,
            "scenario finished"
        );
    }

    Ok(RunSummary {
        scenarios,
        run_duration,
    })
}
