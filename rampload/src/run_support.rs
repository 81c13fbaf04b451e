use rampload_core::presets::{self, TestPlan};

use crate::cli::PlanArgs;
use crate::run_error::RunError;
use crate::scenario_file;

pub(crate) struct LoadedPlan {
    /// Where the plan came from, for the output header.
    pub source: String,
    pub base_url: String,
    pub plan: TestPlan,
}

pub(crate) async fn load_plan(args: &PlanArgs) -> Result<LoadedPlan, RunError> {
    let Some(path) = &args.scenario else {
        let base_url = args
            .base_url
            .clone()
            .unwrap_or_else(|| presets::DEFAULT_BASE_URL.to_string());
        return Ok(LoadedPlan {
            source: "built-in user-register".to_string(),
            plan: TestPlan::user_register(&base_url),
            base_url,
        });
    };

    if !scenario_file::looks_like_yaml_path(path) {
        return Err(RunError::InvalidInput(anyhow::anyhow!(
            "unsupported scenario file `{}` (expected .yaml or .yml)",
            path.display()
        )));
    }

    let file = scenario_file::load_scenario_file(path)
        .await
        .map_err(RunError::InvalidInput)?;

    let base_url = args
        .base_url
        .clone()
        .or_else(|| file.base_url.clone())
        .unwrap_or_else(|| presets::DEFAULT_BASE_URL.to_string());
    let plan = file
        .into_plan(Some(&base_url))
        .map_err(|e| RunError::InvalidInput(e.context("invalid request in scenario file")))?;

    Ok(LoadedPlan {
        source: path.display().to_string(),
        base_url,
        plan,
    })
}

pub(crate) fn resolve_scenarios(
    loaded: &LoadedPlan,
    args: &PlanArgs,
) -> Result<Vec<rampload_core::ScenarioConfig>, RunError> {
    rampload_core::scenarios_from_options(loaded.plan.options.clone(), args.run_config())
        .map_err(|e| RunError::from_core(e, "invalid scenario config"))
}
