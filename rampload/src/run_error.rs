use crate::exit_codes::ExitCode;

#[derive(Debug)]
pub enum RunError {
    InvalidInput(anyhow::Error),
    RuntimeError(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::RuntimeError(_) => ExitCode::RuntimeError,
        }
    }

    #[must_use]
    pub fn anyhow(&self) -> &anyhow::Error {
        match self {
            Self::InvalidInput(e) | Self::RuntimeError(e) => e,
        }
    }

    /// Config errors from the engine are the user's to fix; everything else is a runtime failure.
    pub(crate) fn from_core(err: rampload_core::Error, context: &'static str) -> Self {
        let invalid = !matches!(
            err,
            rampload_core::Error::Join(_) | rampload_core::Error::Vu(_)
        );
        let err = anyhow::Error::new(err).context(context);
        if invalid {
            Self::InvalidInput(err)
        } else {
            Self::RuntimeError(err)
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.anyhow())
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.anyhow().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_invalid_input() {
        let err = RunError::from_core(rampload_core::Error::InvalidMaxVus, "invalid scenario");
        assert_eq!(err.exit_code(), ExitCode::InvalidInput);
        assert_eq!(
            err.to_string(),
            "invalid scenario: `maxVUs` must be >= `preAllocatedVUs`"
        );
    }

    #[test]
    fn vu_failures_are_runtime_errors() {
        let err = RunError::from_core(rampload_core::Error::Vu("boom".to_string()), "run failed");
        assert_eq!(err.exit_code(), ExitCode::RuntimeError);
    }
}
