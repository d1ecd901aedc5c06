//! Domain error types.

/// Top-level error type for aetherquant.
#[derive(Debug, thiserror::Error)]
pub enum AetherError {
    #[error("insufficient data for {context}: have {have}, need {need}")]
    InsufficientData {
        context: String,
        have: usize,
        need: usize,
    },

    #[error("alignment error: {reason}")]
    Alignment { reason: String },

    #[error("singular covariance matrix: {reason}")]
    SingularCovariance { reason: String },

    #[error("invalid configuration {parameter}: {reason}")]
    Configuration { parameter: String, reason: String },

    #[error("invalid price series for {symbol}: {reason}")]
    InvalidSeries { symbol: String, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("broker error: {reason}")]
    Broker { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AetherError {
    pub(crate) fn configuration(parameter: &str, reason: impl Into<String>) -> Self {
        AetherError::Configuration {
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn insufficient(context: impl Into<String>, have: usize, need: usize) -> Self {
        AetherError::InsufficientData {
            context: context.into(),
            have,
            need,
        }
    }
}

impl From<&AetherError> for std::process::ExitCode {
    fn from(err: &AetherError) -> Self {
        let code: u8 = match err {
            AetherError::Io(_) | AetherError::Json(_) => 1,
            AetherError::ConfigParse { .. }
            | AetherError::ConfigMissing { .. }
            | AetherError::Configuration { .. } => 2,
            AetherError::Data { .. } | AetherError::Broker { .. } => 3,
            AetherError::InvalidSeries { .. } | AetherError::Alignment { .. } => 4,
            AetherError::NoData { .. } | AetherError::InsufficientData { .. } => 5,
            AetherError::SingularCovariance { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_message() {
        let err = AetherError::insufficient("moving average cross", 10, 50);
        assert_eq!(
            err.to_string(),
            "insufficient data for moving average cross: have 10, need 50"
        );
    }

    #[test]
    fn configuration_message_names_parameter() {
        let err = AetherError::configuration("commission_bps", "must be non-negative");
        assert_eq!(
            err.to_string(),
            "invalid configuration commission_bps: must be non-negative"
        );
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: AetherError = io.into();
        assert!(matches!(err, AetherError::Io(_)));
    }
}
