use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

const DURATION_HINT: &str = "expected e.g. 10s, 250ms, 1m30s";

/// Accepts the same forms as scenario files: a humantime string, or bare seconds.
fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    let d = match s.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(s)
            .map_err(|e| format!("invalid duration '{s}': {e} ({DURATION_HINT})"))?,
    };

    if d.is_zero() {
        return Err(format!("duration '{s}' must be positive"));
    }
    Ok(d)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Live progress bars and a text summary.
    HumanReadable,
    /// Emit JSON progress and summary lines (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "rampload",
    author,
    version,
    about = "Open-model HTTP load generator",
    long_about = "rampload starts iterations at a target arrival rate that ramps over time, independent of how long each request takes.\n\nWithout a scenario file it runs the built-in user-registration test: POST /user-register, ramping from 0 to 90000 iterations/s over 15 minutes with 100 pre-allocated and at most 200 virtual users.",
    after_help = "Examples:\n  rampload run --base-url http://localhost:8000\n  rampload run demos/user_register.yaml --output json\n  rampload run --vus 10 --duration 30s\n  rampload export-scenario --out scenario.yaml"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test
    #[command(
        long_about = "Run a scenario file (or the built-in user-registration test) against the target service.\n\nCLI flags override values from the scenario."
    )]
    Run(RunArgs),

    /// Resolve a scenario (with overrides applied) and write it as YAML
    ExportScenario(ExportScenarioArgs),
}

#[derive(Debug, Clone, Args)]
pub struct PlanArgs {
    /// Scenario file (.yaml/.yml). Defaults to the built-in user-registration test
    pub scenario: Option<PathBuf>,

    /// Base URL of the target service (overrides `baseUrl` in the scenario file)
    #[arg(long, env = "BASE_URL", value_name = "URL")]
    pub base_url: Option<String>,

    /// Override iterations (switches ramping scenarios to constant VUs)
    #[arg(long)]
    pub iterations: Option<u64>,

    /// Number of virtual users (switches ramping scenarios to constant VUs)
    #[arg(long)]
    pub vus: Option<u64>,

    /// Test duration (e.g. 10s, 250ms, 1m)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,
}

impl PlanArgs {
    pub fn run_config(&self) -> rampload_core::RunConfig {
        rampload_core::RunConfig {
            iterations: self.iterations,
            vus: self.vus,
            duration: self.duration,
        }
    }
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Log filter written to stderr (e.g. info, rampload_core=debug). Falls back to RUST_LOG
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,
}

#[derive(Debug, Args)]
pub struct ExportScenarioArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Output YAML file
    #[arg(long, value_name = "FILE")]
    pub out: PathBuf,
}
