use thiserror::Error;

/// Malformed or out-of-range configuration. Fatal at startup; the embedder
/// is expected to call [`crate::Config::validate`] once before wiring up
/// the rest of the platform.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config field `{field}` is invalid: {reason}")]
    OutOfRange {
        field: &'static str,
        reason: &'static str,
    },
}
