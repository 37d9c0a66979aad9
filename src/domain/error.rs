//! Domain error types.
//!
//! Insufficient history and rejected fills are not errors: the classifier
//! and voters fall back to safe defaults and the ledger reports `Ok(false)`.

/// Top-level error type for regimetrader.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
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

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("ledger state corrupted: {reason}")]
    StateCorruption { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        EngineError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&EngineError> for std::process::ExitCode {
    fn from(err: &EngineError) -> Self {
        let code: u8 = match err {
            EngineError::Io(_) => 1,
            EngineError::ConfigParse { .. }
            | EngineError::ConfigMissing { .. }
            | EngineError::ConfigInvalid { .. } => 2,
            EngineError::Data { .. } => 3,
            EngineError::StateCorruption { .. } => 4,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_invalid_message_names_section_and_key() {
        let err = EngineError::invalid("consensus", "min_votes", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "invalid config value [consensus] min_votes: must be at least 1"
        );
    }

    #[test]
    fn state_corruption_message() {
        let err = EngineError::StateCorruption {
            reason: "negative cash".into(),
        };
        assert_eq!(err.to_string(), "ledger state corrupted: negative cash");
    }
}
