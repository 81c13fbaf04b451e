use anyhow::Context as _;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn";

/// Picks `--log-level` first, then `RUST_LOG`, then `warn`.
pub(crate) fn env_filter(log_level: Option<&str>) -> anyhow::Result<EnvFilter> {
    match log_level {
        Some(level) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid --log-level filter: {level}")),
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())),
    }
}

/// Logs always go to stderr so NDJSON on stdout stays parseable.
pub(crate) fn init(log_level: Option<&str>) -> anyhow::Result<()> {
    let filter = env_filter(log_level)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_level_is_used() {
        let filter = env_filter(Some("rampload_core=debug"))
            .unwrap_or_else(|e| panic!("filter should parse: {e:#}"));
        assert!(filter.to_string().contains("rampload_core=debug"));
    }

    #[test]
    fn malformed_level_is_rejected() {
        assert!(env_filter(Some("rampload_core=loud")).is_err());
    }
}
