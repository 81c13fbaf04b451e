use std::time::Duration;

use rampload_core::runner::{
    LoadOptions, RunConfig, ScenarioExecutor, ScenarioOptions, Stage, scenarios_from_options,
};

fn arrival_scenario(stages: Vec<Stage>) -> ScenarioOptions {
    ScenarioOptions {
        name: "constant_request_rate".to_string(),
        executor: Some("ramping-arrival-rate".to_string()),
        start_rate: Some(0),
        stages,
        pre_allocated_vus: Some(100),
        max_vus: Some(200),
        ..ScenarioOptions::default()
    }
}

#[test]
fn overrides_convert_arrival_rate_to_constant_vus() {
    // Stages are invalid on purpose: with overrides they are ignored.
    let opts = LoadOptions {
        scenarios: vec![arrival_scenario(Vec::new())],
        ..LoadOptions::default()
    };
    let cfg = RunConfig {
        iterations: Some(1),
        vus: Some(1),
        duration: None,
    };

    let scenarios = scenarios_from_options(opts, cfg)
        .unwrap_or_else(|e| panic!("expected scenarios to be valid: {e}"));
    assert_eq!(scenarios.len(), 1);

    let s = &scenarios[0];
    assert_eq!(s.name, "constant_request_rate");
    assert_eq!(s.iterations, Some(1));
    assert_eq!(s.duration, None);
    match s.executor {
        ScenarioExecutor::ConstantVus { vus } => assert_eq!(vus, 1),
        _ => panic!("expected constant-vus executor"),
    }
}

#[test]
fn arrival_rate_still_validates_without_overrides() {
    let opts = LoadOptions {
        scenarios: vec![arrival_scenario(Vec::new())],
        ..LoadOptions::default()
    };

    let err = scenarios_from_options(opts, RunConfig::default())
        .err()
        .unwrap_or_else(|| panic!("expected empty stages to be rejected"));
    assert_eq!(
        err.to_string(),
        "`stages` must be a non-empty array of { duration, target }"
    );
}

#[test]
fn override_duration_wins_over_scenario_duration() {
    let opts = LoadOptions {
        duration: Some(Duration::from_secs(30)),
        scenarios: vec![ScenarioOptions {
            name: "steady".to_string(),
            vus: Some(3),
            duration: Some(Duration::from_secs(10)),
            ..ScenarioOptions::default()
        }],
        ..LoadOptions::default()
    };
    let cfg = RunConfig {
        duration: Some(Duration::from_secs(2)),
        ..RunConfig::default()
    };

    let scenarios = scenarios_from_options(opts, cfg)
        .unwrap_or_else(|e| panic!("expected scenarios to be valid: {e}"));
    assert_eq!(scenarios[0].duration, Some(Duration::from_secs(2)));
    assert_eq!(scenarios[0].executor, ScenarioExecutor::ConstantVus { vus: 3 });
}

#[test]
fn scenario_values_win_over_top_level_defaults() {
    let opts = LoadOptions {
        vus: Some(8),
        iterations: Some(100),
        scenarios: vec![ScenarioOptions {
            name: "steady".to_string(),
            vus: Some(2),
            iterations: Some(5),
            ..ScenarioOptions::default()
        }],
        ..LoadOptions::default()
    };

    let scenarios = scenarios_from_options(opts, RunConfig::default())
        .unwrap_or_else(|e| panic!("expected scenarios to be valid: {e}"));
    assert_eq!(scenarios[0].executor, ScenarioExecutor::ConstantVus { vus: 2 });
    assert_eq!(scenarios[0].iterations, Some(5));
}
