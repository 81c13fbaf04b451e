use std::sync::Arc;

use rampload_core::{HttpClient, IterationContext, Workload};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;
use crate::run_support::{load_plan, resolve_scenarios};

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let loaded = load_plan(&args.plan).await?;
    let scenarios = resolve_scenarios(&loaded, &args.plan)?;

    let client = Arc::new(HttpClient::default());
    let workload = Arc::new(
        Workload::new(client, &loaded.plan.request)
            .map_err(|e| RunError::from_core(e, "invalid request"))?,
    );

    out.print_header(&loaded.source, &loaded.plan.request, &scenarios);
    tracing::info!(
        source = %loaded.source,
        base_url = %loaded.base_url,
        scenarios = scenarios.len(),
        "starting run"
    );

    let summary = rampload_core::run_scenarios(
        scenarios,
        move |ctx: IterationContext| {
            let workload = workload.clone();
            async move { workload.run_iteration(ctx).await }
        },
        out.progress(),
    )
    .await
    .map_err(|e| RunError::from_core(e, "run failed"))?;

    tracing::info!(
        requests = summary.requests_total(),
        failed = summary.failed_requests_total(),
        dropped = summary.dropped_iterations_total(),
        "run finished"
    );

    out.print_summary(&summary)
        .map_err(|e| RunError::RuntimeError(e.context("failed to print summary")))?;

    Ok(ExitCode::Success)
}
