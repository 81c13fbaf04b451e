use std::time::Duration;

use crate::error::{Error, Result};

use super::config::{
    LoadOptions, RunConfig, ScenarioConfig, ScenarioExecutor, ScenarioExecutorKind,
    ScenarioOptions, Stage,
};

const DEFAULT_TIME_UNIT: Duration = Duration::from_secs(1);

/// Validate raw scenario options and apply run overrides.
///
/// Explicit `scenarios` win over the top-level `vus`/`iterations`/`duration`. CLI overrides win
/// over everything: a ramping scenario combined with any override is run as `constant-vus`.
pub fn scenarios_from_options(opts: LoadOptions, cfg: RunConfig) -> Result<Vec<ScenarioConfig>> {
    if opts.scenarios.is_empty() {
        return Ok(vec![default_scenario(&opts, &cfg)?]);
    }

    let mut out = Vec::with_capacity(opts.scenarios.len());
    for s in &opts.scenarios {
        let executor_name = s.executor.as_deref().unwrap_or("constant-vus");
        let kind: ScenarioExecutorKind = executor_name
            .parse()
            .map_err(|_| Error::InvalidExecutor(executor_name.to_string()))?;

        let resolved = if cfg.has_overrides() && kind.is_ramping() {
            constant_vus(s, &opts, &cfg)?
        } else {
            match kind {
                ScenarioExecutorKind::ConstantVus => constant_vus(s, &opts, &cfg)?,
                ScenarioExecutorKind::RampingVus => ramping_vus(s, &opts)?,
                ScenarioExecutorKind::RampingArrivalRate => ramping_arrival_rate(s, &opts)?,
                ScenarioExecutorKind::ConstantArrivalRate => constant_arrival_rate(s, &opts)?,
            }
        };
        out.push(resolved);
    }

    Ok(out)
}

fn default_scenario(opts: &LoadOptions, cfg: &RunConfig) -> Result<ScenarioConfig> {
    let vus = cfg.vus.or(opts.vus).unwrap_or(1);
    if vus == 0 {
        return Err(Error::InvalidVus);
    }

    let duration = cfg.duration.or(opts.duration);

    // One iteration unless duration mode is used.
    let iterations = cfg
        .iterations
        .or(opts.iterations)
        .or_else(|| duration.is_none().then_some(1));
    if iterations == Some(0) {
        return Err(Error::InvalidIterations);
    }

    Ok(ScenarioConfig {
        name: "default".to_string(),
        executor: ScenarioExecutor::ConstantVus { vus },
        iterations,
        duration,
    })
}

fn constant_vus(s: &ScenarioOptions, opts: &LoadOptions, cfg: &RunConfig) -> Result<ScenarioConfig> {
    let vus = cfg.vus.or(s.vus).or(opts.vus).unwrap_or(1);
    if vus == 0 {
        return Err(Error::InvalidVus);
    }

    let iterations = cfg.iterations.or(s.iterations).or(opts.iterations);
    if iterations == Some(0) {
        return Err(Error::InvalidIterations);
    }

    let duration = cfg.duration.or(s.duration).or(opts.duration);

    Ok(ScenarioConfig {
        name: s.name.clone(),
        executor: ScenarioExecutor::ConstantVus { vus },
        iterations,
        duration,
    })
}

fn ramping_vus(s: &ScenarioOptions, opts: &LoadOptions) -> Result<ScenarioConfig> {
    reject_iterations(s, opts)?;
    let total_duration = validate_stages(&s.stages)?;

    let start_vus = s.start_vus.unwrap_or(0);
    let executor = ScenarioExecutor::RampingVus {
        start_vus,
        stages: s.stages.clone(),
    };
    if executor.max_vus() == 0 {
        return Err(Error::InvalidVus);
    }

    Ok(ScenarioConfig {
        name: s.name.clone(),
        executor,
        iterations: None,
        duration: Some(total_duration),
    })
}

fn ramping_arrival_rate(s: &ScenarioOptions, opts: &LoadOptions) -> Result<ScenarioConfig> {
    reject_iterations(s, opts)?;
    let total_duration = validate_stages(&s.stages)?;
    let (time_unit, pre_allocated_vus, max_vus) = arrival_pool(s)?;

    Ok(ScenarioConfig {
        name: s.name.clone(),
        executor: ScenarioExecutor::RampingArrivalRate {
            start_rate: s.start_rate.unwrap_or(0),
            time_unit,
            pre_allocated_vus,
            max_vus,
            stages: s.stages.clone(),
        },
        iterations: None,
        duration: Some(total_duration),
    })
}

/// A constant arrival rate is a ramp with a single flat stage.
fn constant_arrival_rate(s: &ScenarioOptions, opts: &LoadOptions) -> Result<ScenarioConfig> {
    reject_iterations(s, opts)?;

    let rate = s.rate.filter(|r| *r > 0).ok_or(Error::InvalidRate)?;
    let duration = s
        .duration
        .or(opts.duration)
        .filter(|d| !d.is_zero())
        .ok_or(Error::InvalidDuration)?;
    let (time_unit, pre_allocated_vus, max_vus) = arrival_pool(s)?;

    Ok(ScenarioConfig {
        name: s.name.clone(),
        executor: ScenarioExecutor::RampingArrivalRate {
            start_rate: rate,
            time_unit,
            pre_allocated_vus,
            max_vus,
            stages: vec![Stage {
                duration,
                target: rate,
            }],
        },
        iterations: None,
        duration: Some(duration),
    })
}

fn reject_iterations(s: &ScenarioOptions, opts: &LoadOptions) -> Result<()> {
    if s.iterations.is_some() || opts.iterations.is_some() {
        return Err(Error::InvalidIterations);
    }
    Ok(())
}

fn validate_stages(stages: &[Stage]) -> Result<Duration> {
    if stages.is_empty() {
        return Err(Error::InvalidStages);
    }

    let mut total = Duration::ZERO;
    for (idx, st) in stages.iter().enumerate() {
        if st.duration.is_zero() {
            return Err(Error::InvalidStageDuration(idx + 1));
        }
        total = total.saturating_add(st.duration);
    }
    Ok(total)
}

fn arrival_pool(s: &ScenarioOptions) -> Result<(Duration, u64, u64)> {
    let time_unit = s.time_unit.unwrap_or(DEFAULT_TIME_UNIT);
    if time_unit.is_zero() {
        return Err(Error::InvalidTimeUnit);
    }

    let pre_allocated_vus = s.pre_allocated_vus.unwrap_or(1);
    if pre_allocated_vus == 0 {
        return Err(Error::InvalidPreAllocatedVus);
    }

    let max_vus = s.max_vus.unwrap_or(pre_allocated_vus);
    if max_vus < pre_allocated_vus {
        return Err(Error::InvalidMaxVus);
    }

    Ok((time_unit, pre_allocated_vus, max_vus))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrival(stages: Vec<Stage>) -> ScenarioOptions {
        ScenarioOptions {
            name: "arrivals".to_string(),
            executor: Some("ramping-arrival-rate".to_string()),
            start_rate: Some(0),
            pre_allocated_vus: Some(2),
            max_vus: Some(4),
            stages,
            ..ScenarioOptions::default()
        }
    }

    fn stage(secs: u64, target: u64) -> Stage {
        Stage {
            duration: Duration::from_secs(secs),
            target,
        }
    }

    fn resolve_one(s: ScenarioOptions) -> Result<ScenarioConfig> {
        let opts = LoadOptions {
            scenarios: vec![s],
            ..LoadOptions::default()
        };
        let mut out = scenarios_from_options(opts, RunConfig::default())?;
        Ok(out.remove(0))
    }

    #[test]
    fn empty_options_default_to_single_iteration() {
        let out = scenarios_from_options(LoadOptions::default(), RunConfig::default())
            .unwrap_or_else(|e| panic!("resolve failed: {e}"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].executor, ScenarioExecutor::ConstantVus { vus: 1 });
        assert_eq!(out[0].iterations, Some(1));
        assert_eq!(out[0].duration, None);
    }

    #[test]
    fn duration_mode_drops_default_iteration() {
        let cfg = RunConfig {
            duration: Some(Duration::from_secs(2)),
            ..RunConfig::default()
        };
        let out = scenarios_from_options(LoadOptions::default(), cfg)
            .unwrap_or_else(|e| panic!("resolve failed: {e}"));
        assert_eq!(out[0].iterations, None);
        assert_eq!(out[0].duration, Some(Duration::from_secs(2)));
    }

    #[test]
    fn arrival_rate_sums_stage_durations() {
        let s = resolve_one(arrival(vec![stage(2, 10), stage(3, 0)]))
            .unwrap_or_else(|e| panic!("resolve failed: {e}"));
        assert_eq!(s.duration, Some(Duration::from_secs(5)));
        match s.executor {
            ScenarioExecutor::RampingArrivalRate {
                time_unit,
                pre_allocated_vus,
                max_vus,
                ..
            } => {
                assert_eq!(time_unit, Duration::from_secs(1));
                assert_eq!(pre_allocated_vus, 2);
                assert_eq!(max_vus, 4);
            }
            other => panic!("unexpected executor: {other:?}"),
        }
    }

    #[test]
    fn arrival_rate_rejects_pool_smaller_than_preallocation() {
        let mut s = arrival(vec![stage(1, 1)]);
        s.max_vus = Some(1);
        assert!(matches!(resolve_one(s), Err(Error::InvalidMaxVus)));
    }

    #[test]
    fn arrival_rate_rejects_zero_preallocation_and_time_unit() {
        let mut s = arrival(vec![stage(1, 1)]);
        s.pre_allocated_vus = Some(0);
        assert!(matches!(resolve_one(s), Err(Error::InvalidPreAllocatedVus)));

        let mut s = arrival(vec![stage(1, 1)]);
        s.time_unit = Some(Duration::ZERO);
        assert!(matches!(resolve_one(s), Err(Error::InvalidTimeUnit)));
    }

    #[test]
    fn max_vus_defaults_to_preallocation() {
        let mut s = arrival(vec![stage(1, 1)]);
        s.max_vus = None;
        let s = resolve_one(s).unwrap_or_else(|e| panic!("resolve failed: {e}"));
        assert_eq!(s.max_vus(), 2);
    }

    #[test]
    fn stages_must_be_present_and_positive() {
        assert!(matches!(
            resolve_one(arrival(Vec::new())),
            Err(Error::InvalidStages)
        ));
        assert!(matches!(
            resolve_one(arrival(vec![stage(1, 5), stage(0, 5)])),
            Err(Error::InvalidStageDuration(2))
        ));
    }

    #[test]
    fn ramping_executors_reject_iterations() {
        let mut s = arrival(vec![stage(1, 1)]);
        s.iterations = Some(3);
        assert!(matches!(resolve_one(s), Err(Error::InvalidIterations)));
    }

    #[test]
    fn unknown_executor_is_reported_by_name() {
        let s = ScenarioOptions {
            name: "x".to_string(),
            executor: Some("externally-controlled".to_string()),
            ..ScenarioOptions::default()
        };
        match resolve_one(s) {
            Err(Error::InvalidExecutor(name)) => assert_eq!(name, "externally-controlled"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn constant_arrival_rate_becomes_flat_ramp() {
        let s = ScenarioOptions {
            name: "flat".to_string(),
            executor: Some("constant-arrival-rate".to_string()),
            rate: Some(50),
            duration: Some(Duration::from_secs(10)),
            pre_allocated_vus: Some(5),
            ..ScenarioOptions::default()
        };
        let s = resolve_one(s).unwrap_or_else(|e| panic!("resolve failed: {e}"));
        assert_eq!(
            s.executor,
            ScenarioExecutor::RampingArrivalRate {
                start_rate: 50,
                time_unit: Duration::from_secs(1),
                pre_allocated_vus: 5,
                max_vus: 5,
                stages: vec![stage(10, 50)],
            }
        );
    }

    #[test]
    fn constant_arrival_rate_requires_rate_and_duration() {
        let base = ScenarioOptions {
            name: "flat".to_string(),
            executor: Some("constant-arrival-rate".to_string()),
            ..ScenarioOptions::default()
        };
        assert!(matches!(resolve_one(base.clone()), Err(Error::InvalidRate)));

        let with_rate = ScenarioOptions {
            rate: Some(1),
            ..base
        };
        assert!(matches!(resolve_one(with_rate), Err(Error::InvalidDuration)));
    }

    #[test]
    fn ramping_vus_needs_at_least_one_vu() {
        let s = ScenarioOptions {
            name: "r".to_string(),
            executor: Some("ramping-vus".to_string()),
            stages: vec![stage(1, 0)],
            ..ScenarioOptions::default()
        };
        assert!(matches!(resolve_one(s), Err(Error::InvalidVus)));
    }
}
