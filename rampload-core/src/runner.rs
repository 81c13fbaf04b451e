mod config;
mod gate;
mod pacer;
mod progress;
mod resolve;
mod run;
mod schedule;
mod stats;
mod vu;

pub use config::{
    LoadOptions, RunConfig, ScenarioConfig, ScenarioExecutor, ScenarioExecutorKind,
    ScenarioOptions, Stage,
};
pub use gate::IterationGate;
pub use pacer::ArrivalPacer;
pub use progress::{LiveMetrics, ProgressFn, ProgressUpdate, ScenarioProgress, StageProgress};
pub use resolve::scenarios_from_options;
pub use run::run_scenarios;
pub use schedule::{RampingU64Schedule, StageSnapshot};
pub use stats::{HttpRequestMeta, LatencySummary, RunStats, RunSummary, ScenarioSummary};
pub use vu::IterationContext;
