use crate::cli::ExportScenarioArgs;
use crate::exit_codes::ExitCode;
use crate::run_error::RunError;
use crate::run_support::{load_plan, resolve_scenarios};
use crate::scenario_file;

pub async fn export_scenario(args: ExportScenarioArgs) -> Result<ExitCode, RunError> {
    let loaded = load_plan(&args.plan).await?;
    let scenarios = resolve_scenarios(&loaded, &args.plan)?;

    let doc = scenario_file::build_doc_from_plan(&scenarios, &loaded.plan.request, &loaded.base_url);
    scenario_file::write_yaml_file(&args.out, &doc)
        .await
        .map_err(|e| RunError::RuntimeError(e.context("failed to write scenario YAML")))?;

    tracing::info!(out = %args.out.display(), scenarios = scenarios.len(), "scenario exported");
    Ok(ExitCode::Success)
}
