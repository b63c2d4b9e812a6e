//! Domain error types.

/// Top-level error type for stocksignal.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("no data for {code}")]
    NoData { code: String },

    #[error("invalid series for {symbol}: {reason}")]
    InvalidSeries { symbol: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&SignalError> for std::process::ExitCode {
    fn from(err: &SignalError) -> Self {
        let code: u8 = match err {
            SignalError::Io(_) => 1,
            SignalError::ConfigParse { .. }
            | SignalError::ConfigMissing { .. }
            | SignalError::ConfigInvalid { .. } => 2,
            SignalError::DataSource { .. } | SignalError::NoData { .. } => 3,
            SignalError::InvalidSeries { .. } => 4,
        };
        std::process::ExitCode::from(code)
    }
}
