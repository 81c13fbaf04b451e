use crate::cli::OutputFormat;

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    /// `source` names where the plan came from (a file path or the built-in test).
    fn print_header(
        &self,
        source: &str,
        request: &rampload_core::RequestSpec,
        scenarios: &[rampload_core::ScenarioConfig],
    );
    fn progress(&self) -> Option<rampload_core::ProgressFn>;
    fn print_summary(&self, summary: &rampload_core::RunSummary) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
