//! Domain error types.

/// A parse error with position information for rule parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for breadthscan.
#[derive(Debug, thiserror::Error)]
pub enum BreadthscanError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

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

    #[error(transparent)]
    RuleParse(#[from] ParseError),

    #[error("invalid rule: {reason}")]
    RuleInvalid { reason: String },

    #[error("unknown indicator type '{type_name}'")]
    UnknownIndicator { type_name: String },

    #[error("no price data for {ticker}")]
    NoData { ticker: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BreadthscanError {
    pub fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        BreadthscanError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&BreadthscanError> for std::process::ExitCode {
    fn from(err: &BreadthscanError) -> Self {
        let code: u8 = match err {
            BreadthscanError::Io(_) => 1,
            BreadthscanError::ConfigParse { .. }
            | BreadthscanError::ConfigMissing { .. }
            | BreadthscanError::ConfigInvalid { .. }
            | BreadthscanError::UnknownIndicator { .. } => 2,
            BreadthscanError::Database { .. } | BreadthscanError::DatabaseQuery { .. } => 3,
            BreadthscanError::RuleParse(_) | BreadthscanError::RuleInvalid { .. } => 4,
            BreadthscanError::NoData { .. } => 5,
            BreadthscanError::Serialization(_) => 6,
        };
        std::process::ExitCode::from(code)
    }
}
