pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("virtual user error: {0}")]
    Vu(String),

    #[error("`vus` must be a positive integer")]
    InvalidVus,

    #[error("`iterations` must be a positive integer (and is not allowed for ramping executors)")]
    InvalidIterations,

    #[error(
        "invalid `executor` `{0}` (expected `constant-vus`, `ramping-vus`, `ramping-arrival-rate`, or `constant-arrival-rate`)"
    )]
    InvalidExecutor(String),

    #[error("`stages` must be a non-empty array of {{ duration, target }}")]
    InvalidStages,

    #[error("stage #{0} must have a positive `duration`")]
    InvalidStageDuration(usize),

    #[error("`rate` must be a positive integer")]
    InvalidRate,

    #[error("`duration` must be a positive duration")]
    InvalidDuration,

    #[error("`timeUnit` must be a positive duration")]
    InvalidTimeUnit,

    #[error("`preAllocatedVUs` must be a positive integer")]
    InvalidPreAllocatedVus,

    #[error("`maxVUs` must be >= `preAllocatedVUs`")]
    InvalidMaxVus,

    #[error("invalid request url: `{0}` (expected an absolute http:// or https:// URL)")]
    InvalidUrl(String),

    #[error("invalid http method: `{0}`")]
    InvalidMethod(String),

    #[error("invalid body encoding: `{0}` (expected `json` or `form`)")]
    InvalidEncoding(String),

    #[error("failed to encode request body: {0}")]
    BodyEncode(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    Request(#[from] rampload_http::Error),
}
