#![forbid(unsafe_code)]

mod error;
mod request;
mod workload;

pub mod presets;
pub mod runner;

pub use error::{Error, Result};
pub use rampload_http::{HttpClient, HttpRequest, HttpResponse, HttpTransportErrorKind};
pub use request::{BodyEncoding, BodyFields, HttpMethod, RequestSpec, join_url};
pub use runner::{
    IterationContext, LatencySummary, LiveMetrics, LoadOptions, ProgressFn, ProgressUpdate,
    RunConfig, RunStats, RunSummary, ScenarioConfig, ScenarioExecutor, ScenarioExecutorKind,
    ScenarioOptions, ScenarioProgress, ScenarioSummary, Stage, StageProgress, run_scenarios,
    scenarios_from_options,
};
pub use workload::Workload;
