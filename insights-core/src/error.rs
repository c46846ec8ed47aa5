//! Error types for the insights engine

use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid pattern for rule '{name}': {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("Rule '{0}' has no capture group")]
    MissingCapture(String),

    #[error("Invalid date format '{0}'")]
    InvalidDateFormat(String),

    #[error("UTC offset out of range: {0} minutes")]
    InvalidUtcOffset(i32),
}

/// Errors raised while turning an intercepted response body into records.
///
/// These never leave the interceptor's side branch; they are logged and the
/// response is skipped.
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unrecognized payload shape")]
    UnrecognizedShape,
}

/// Errors reported by a host implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("Host capability unavailable: {0}")]
    Unavailable(&'static str),

    #[error("Script error: {0}")]
    Js(String),
}

#[derive(Error, Debug)]
pub enum InsightsError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Harvest(#[from] HarvestError),

    #[error(transparent)]
    Host(#[from] HostError),
}
