use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

/// Run-shape overrides (CLI flags). These win over anything a scenario declares.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub iterations: Option<u64>,
    pub vus: Option<u64>,
    pub duration: Option<Duration>,
}

impl RunConfig {
    #[must_use]
    pub fn has_overrides(&self) -> bool {
        self.vus.is_some() || self.iterations.is_some() || self.duration.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioExecutor {
    ConstantVus {
        vus: u64,
    },

    /// Ramp the number of active VUs up/down over time.
    RampingVus {
        start_vus: u64,
        stages: Vec<Stage>,
    },

    /// Open-model arrival rate (iterations started per `time_unit`), with ramping stages.
    RampingArrivalRate {
        start_rate: u64,
        time_unit: Duration,
        pre_allocated_vus: u64,
        max_vus: u64,
        stages: Vec<Stage>,
    },
}

impl ScenarioExecutor {
    /// Number of VU tasks the runner spawns for this executor.
    #[must_use]
    pub fn max_vus(&self) -> u64 {
        match self {
            Self::ConstantVus { vus } => *vus,
            Self::RampingVus { start_vus, stages } => {
                let max_stage = stages.iter().map(|st| st.target).max().unwrap_or(0);
                max_stage.max(*start_vus)
            }
            Self::RampingArrivalRate { max_vus, .. } => *max_vus,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ScenarioExecutorKind {
        match self {
            Self::ConstantVus { .. } => ScenarioExecutorKind::ConstantVus,
            Self::RampingVus { .. } => ScenarioExecutorKind::RampingVus,
            Self::RampingArrivalRate { .. } => ScenarioExecutorKind::RampingArrivalRate,
        }
    }
}

/// Scenario executor kind (the string form used by scenario files and the CLI).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display)]
pub enum ScenarioExecutorKind {
    #[strum(
        serialize = "constant-vus",
        serialize = "constant",
        serialize = "per-vu-iterations"
    )]
    ConstantVus,

    #[strum(serialize = "ramping-vus")]
    RampingVus,

    #[strum(serialize = "ramping-arrival-rate", serialize = "ramping-rps")]
    RampingArrivalRate,

    #[strum(serialize = "constant-arrival-rate", serialize = "constant-rps")]
    ConstantArrivalRate,
}

impl ScenarioExecutorKind {
    #[must_use]
    pub fn is_ramping(self) -> bool {
        !matches!(self, Self::ConstantVus)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioConfig {
    pub name: String,
    pub executor: ScenarioExecutor,
    pub iterations: Option<u64>,
    pub duration: Option<Duration>,
}

impl ScenarioConfig {
    #[must_use]
    pub fn max_vus(&self) -> u64 {
        self.executor.max_vus()
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub vus: Option<u64>,
    pub iterations: Option<u64>,
    pub duration: Option<Duration>,
    pub scenarios: Vec<ScenarioOptions>,
}

/// Raw scenario declaration, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioOptions {
    pub name: String,

    /// Scenario executor. If missing, defaults to constant VUs.
    pub executor: Option<String>,

    pub vus: Option<u64>,
    pub iterations: Option<u64>,
    pub duration: Option<Duration>,

    // Ramping VUs
    pub start_vus: Option<u64>,
    pub stages: Vec<Stage>,

    // Arrival rate
    pub start_rate: Option<u64>,
    pub rate: Option<u64>,
    pub time_unit: Option<Duration>,
    pub pre_allocated_vus: Option<u64>,
    pub max_vus: Option<u64>,
}
