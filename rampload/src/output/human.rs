use std::sync::Arc;

mod format;
mod progress;
mod summary;

use format::{format_bytes, format_duration, format_ms_opt, format_rate};
use progress::HumanProgress;
use summary::render;

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(
        &self,
        source: &str,
        request: &rampload_core::RequestSpec,
        scenarios: &[rampload_core::ScenarioConfig],
    ) {
        println!("plan: {source}");
        println!(
            "request: {} {} ({})",
            request.method,
            request.url,
            request.encoding.content_type()
        );
        for s in scenarios {
            println!("scenario: {} {}", s.name, describe_executor(s));
        }
        if !scenarios.is_empty() {
            println!();
        }
    }

    fn progress(&self) -> Option<rampload_core::ProgressFn> {
        let progress = self.progress.clone();

        Some(Arc::new(move |u| {
            let message = progress_message(&u);
            progress.update(&u.scenario, u.progress.total_duration(), u.elapsed, message);
        }))
    }

    fn print_summary(&self, summary: &rampload_core::RunSummary) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(summary));
        Ok(())
    }
}

fn describe_executor(s: &rampload_core::ScenarioConfig) -> String {
    match &s.executor {
        rampload_core::ScenarioExecutor::ConstantVus { vus } => format!(
            "exec=constant-vus vus={vus} iterations={} duration={}",
            s.iterations.map_or_else(|| "-".to_string(), |n| n.to_string()),
            s.duration.map_or_else(|| "-".to_string(), format_duration)
        ),
        rampload_core::ScenarioExecutor::RampingVus { start_vus, stages } => format!(
            "exec=ramping-vus start_vus={start_vus} stages={} max_vus={}",
            stages.len(),
            s.max_vus()
        ),
        rampload_core::ScenarioExecutor::RampingArrivalRate {
            start_rate,
            time_unit,
            pre_allocated_vus,
            max_vus,
            stages,
        } => {
            let peak = stages.iter().map(|st| st.target).max().unwrap_or(*start_rate);
            format!(
                "exec=ramping-arrival-rate rate={start_rate}->{peak}/{} stages={} vus={pre_allocated_vus}..{max_vus} duration={}",
                format_duration(*time_unit),
                stages.len(),
                s.duration.map_or_else(|| "-".to_string(), format_duration)
            )
        }
    }
}

fn progress_message(u: &rampload_core::ProgressUpdate) -> String {
    let m = &u.metrics;
    let rates = format!(
        " iters/s={} rps={} tps={}/s err={:.1}% p50={} p95={}",
        format_rate(m.iterations_per_sec_now),
        format_rate(m.rps_now),
        format_bytes(
            m.bytes_received_per_sec_now
                .saturating_add(m.bytes_sent_per_sec_now)
        ),
        m.error_rate_now * 100.0,
        format_ms_opt(m.latency_p50_ms_now),
        format_ms_opt(m.latency_p95_ms_now),
    );

    match &u.progress {
        rampload_core::ScenarioProgress::ConstantVus { vus, .. } => {
            format!("vus={vus} elapsed={}{rates}", format_duration(u.elapsed))
        }
        rampload_core::ScenarioProgress::RampingVus { stage, .. } => match stage {
            Some(stage) => format!(
                "stage={}/{} vus={} elapsed={} stage_remaining={}{rates}",
                stage.stage,
                stage.stages,
                stage.current_target,
                format_duration(u.elapsed),
                format_duration(stage.stage_remaining),
            ),
            None => format!("elapsed={}{rates}", format_duration(u.elapsed)),
        },
        rampload_core::ScenarioProgress::RampingArrivalRate {
            stage,
            active_vus,
            max_vus,
            dropped_iterations_total,
            ..
        } => {
            let mut msg = format!(
                "vus={active_vus}/{max_vus} dropped={dropped_iterations_total} elapsed={}{rates}",
                format_duration(u.elapsed)
            );
            if let Some(stage) = stage {
                msg.push_str(&format!(
                    " stage={}/{} target={}",
                    stage.stage, stage.stages, stage.current_target
                ));
            }
            msg
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn arrival_rate_scenario_is_described_with_its_ramp() {
        let plan = rampload_core::presets::TestPlan::user_register("http://localhost:8000");
        let resolved =
            rampload_core::scenarios_from_options(plan.options, rampload_core::RunConfig::default())
                .unwrap_or_else(|e| panic!("{e:#}"));

        assert_eq!(
            describe_executor(&resolved[0]),
            "exec=ramping-arrival-rate rate=0->90000/1s stages=1 vus=100..200 duration=900s"
        );
    }

    #[test]
    fn progress_message_shows_pool_and_stage() {
        let u = rampload_core::ProgressUpdate {
            tick: 1,
            elapsed: Duration::from_secs(60),
            interval: Duration::from_secs(1),
            scenario: "constant_request_rate".to_string(),
            metrics: rampload_core::LiveMetrics {
                rps_now: 6000.0,
                ..rampload_core::LiveMetrics::default()
            },
            progress: rampload_core::ScenarioProgress::RampingArrivalRate {
                time_unit: Duration::from_secs(1),
                total_duration: Duration::from_secs(900),
                stage: Some(rampload_core::StageProgress {
                    stage: 1,
                    stages: 1,
                    stage_elapsed: Duration::from_secs(60),
                    stage_remaining: Duration::from_secs(840),
                    start_target: 0,
                    end_target: 90_000,
                    current_target: 6_000,
                }),
                active_vus: 120,
                max_vus: 200,
                dropped_iterations_total: 3,
            },
        };

        let msg = progress_message(&u);
        assert!(msg.starts_with("vus=120/200 dropped=3 elapsed=60s"));
        assert!(msg.contains("rps=6000"));
        assert!(msg.ends_with("stage=1/1 target=6000"));
    }
}
