use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crate::error::{Error, Result};

use super::gate::IterationGate;
use super::pacer::ArrivalPacer;
use super::schedule::RampingU64Schedule;
use super::stats::RunStats;

/// Releases every VU at once when the measured run begins.
#[derive(Debug, Default)]
pub struct StartSignal {
    started: AtomicBool,
    notify: Notify,
}

impl StartSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        self.started.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub async fn wait(&self) {
        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();
            if self.started.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }
}

/// What a single iteration sees.
#[derive(Debug, Clone)]
pub struct IterationContext {
    /// Run-wide VU id (1-based).
    pub vu_id: u64,
    pub scenario: Arc<str>,
    /// VU number inside its scenario (1-based).
    pub scenario_vu: u64,
    /// Iterations this VU has started before this one.
    pub iteration: u64,
    pub stats: Arc<RunStats>,
}

#[derive(Debug, Clone)]
pub struct VuContext {
    pub vu_id: u64,
    pub scenario: Arc<str>,
    pub scenario_vu: u64,
    pub stats: Arc<RunStats>,
    pub work: VuWork,
    pub start_signal: Arc<StartSignal>,
    pub run_started: Arc<OnceLock<Instant>>,
}

#[derive(Debug, Clone)]
pub enum VuWork {
    Constant {
        gate: Arc<IterationGate>,
    },
    RampingVus {
        schedule: Arc<RampingU64Schedule>,
    },
    ArrivalRate {
        pacer: Arc<ArrivalPacer>,
    },
}

struct Iterations<F> {
    ctx: VuContext,
    iteration: F,
    count: u64,
}

impl<F, Fut, E> Iterations<F>
where
    F: Fn(IterationContext) -> Fut,
    Fut: Future<Output = std::result::Result<(), E>>,
    E: std::fmt::Display,
{
    async fn run_one(&mut self) -> Result<()> {
        let iter_ctx = IterationContext {
            vu_id: self.ctx.vu_id,
            scenario: self.ctx.scenario.clone(),
            scenario_vu: self.ctx.scenario_vu,
            iteration: self.count,
            stats: self.ctx.stats.clone(),
        };
        self.count = self.count.saturating_add(1);

        let started = Instant::now();
        (self.iteration)(iter_ctx).await.map_err(|err| {
            Error::Vu(format!(
                "scenario `{}` vu {}: {err}",
                self.ctx.scenario, self.ctx.scenario_vu
            ))
        })?;
        self.ctx.stats.record_iteration(started.elapsed());
        Ok(())
    }
}

/// Drive one VU until its executor says stop.
pub async fn run_vu<F, Fut, E>(ctx: VuContext, iteration: F) -> Result<()>
where
    F: Fn(IterationContext) -> Fut,
    Fut: Future<Output = std::result::Result<(), E>>,
    E: std::fmt::Display,
{
    ctx.start_signal.wait().await;

    let started = ctx
        .run_started
        .get()
        .copied()
        .unwrap_or_else(Instant::now);
    let work = ctx.work.clone();
    let scenario_vu = ctx.scenario_vu;

    let mut it = Iterations {
        ctx,
        iteration,
        count: 0,
    };

    match work {
        VuWork::Constant { gate } => {
            while gate.next() {
                it.run_one().await?;
            }
        }
        VuWork::RampingVus { schedule } => loop {
            let elapsed = started.elapsed();
            if schedule.is_done(elapsed) {
                break;
            }

            if scenario_vu > schedule.target_at(elapsed) {
                let wait = schedule.next_recheck_in(elapsed, scenario_vu);
                tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
                continue;
            }

            it.run_one().await?;
        },
        VuWork::ArrivalRate { pacer } => loop {
            // Once the schedule is over every VU helps drain the backlog.
            if !pacer.is_done() && scenario_vu > pacer.active_vus() {
                pacer.wait_for_update().await;
                continue;
            }

            if !pacer.claim_next().await {
                break;
            }
            let res = it.run_one().await;
            pacer.finish_iteration();
            res?;
        },
    }

    tracing::trace!(
        scenario = %it.ctx.scenario,
        vu = scenario_vu,
        iterations = it.count,
        "vu finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;

    use super::*;

    fn ctx(work: VuWork, scenario_vu: u64) -> (VuContext, Arc<StartSignal>) {
        let start_signal = Arc::new(StartSignal::new());
        let run_started = Arc::new(OnceLock::new());
        let _ = run_started.set(Instant::now());
        (
            VuContext {
                vu_id: scenario_vu,
                scenario: Arc::from("s"),
                scenario_vu,
                stats: Arc::new(RunStats::default()),
                work,
                start_signal: start_signal.clone(),
                run_started,
            },
            start_signal,
        )
    }

    #[tokio::test]
    async fn constant_vu_runs_until_gate_closes() {
        let gate = Arc::new(IterationGate::new(Some(3), None));
        let (ctx, start) = ctx(VuWork::Constant { gate }, 1);
        let stats = ctx.stats.clone();
        start.start();

        let seen = Arc::new(AtomicU64::new(0));
        let iteration = {
            let seen = seen.clone();
            move |c: IterationContext| {
                let seen = seen.clone();
                async move {
                    assert_eq!(c.iteration, seen.fetch_add(1, Ordering::Relaxed));
                    Ok::<(), std::convert::Infallible>(())
                }
            }
        };

        run_vu(ctx, iteration)
            .await
            .unwrap_or_else(|e| panic!("vu failed: {e}"));
        assert_eq!(seen.load(Ordering::Relaxed), 3);
        assert_eq!(stats.iterations_total(), 3);
    }

    #[tokio::test]
    async fn arrival_vu_drains_backlog_after_done() {
        let pacer = Arc::new(ArrivalPacer::new(1, 8));
        pacer.update_due(5);
        pacer.mark_done();

        let (ctx, start) = ctx(
            VuWork::ArrivalRate {
                pacer: pacer.clone(),
            },
            4,
        );
        let stats = ctx.stats.clone();
        start.start();

        run_vu(ctx, |_c: IterationContext| async {
            Ok::<(), std::convert::Infallible>(())
        })
        .await
        .unwrap_or_else(|e| panic!("vu failed: {e}"));
        assert_eq!(stats.iterations_total(), 5);
        assert_eq!(pacer.backlog(), 0);
        assert_eq!(pacer.busy_vus(), 0);
    }

    #[tokio::test]
    async fn iteration_error_stops_the_vu() {
        let gate = Arc::new(IterationGate::new(Some(10), None));
        let (ctx, start) = ctx(VuWork::Constant { gate }, 2);
        start.start();

        let res = run_vu(ctx, |_c: IterationContext| async {
            Err::<(), _>(std::fmt::Error)
        })
        .await;
        match res {
            Err(Error::Vu(msg)) => assert!(msg.contains("vu 2"), "{msg}"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
