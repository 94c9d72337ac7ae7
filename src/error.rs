//! Error types for the simulation run.
//!
//! Market outcomes that fail to clear are reported through
//! [`ClearingType`](crate::market::ClearingType), never through these types.

pub use crate::config::ConfigError;

/// Failure of the time-advance/pub-sub bus. Always fatal to a run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BusError {
    /// No grant arrived for a time request.
    #[error("time request for t={requested}s timed out")]
    Timeout { requested: u64 },
    /// The bus closed the connection.
    #[error("bus disconnected at t={at}s")]
    Disconnected { at: u64 },
    /// The bus granted a time earlier than the previous grant.
    #[error("granted t={granted}s precedes previous grant t={previous}s")]
    TimeRegression { granted: u64, previous: u64 },
}

/// Rejected external measurement string.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IngestError {
    #[error("empty value")]
    Empty,
    #[error("\"{0}\" is not numeric")]
    NotNumeric(String),
    #[error("value is not finite")]
    NonFinite,
    #[error("{value} is out of range for {what}")]
    OutOfRange { what: &'static str, value: f64 },
}

/// Top-level error of a simulation run.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("{}", format_config_errors(.0))]
    Config(Vec<ConfigError>),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ConfigError> for SimError {
    fn from(e: ConfigError) -> Self {
        Self::Config(vec![e])
    }
}

fn format_config_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
