//! Error types.
//!
//! Setup problems (bad fixtures, invalid configuration) surface as
//! [`MockError`] when an expectation is registered. A failing dynamic
//! producer surfaces as [`DispatchError`] from `dispatch`. An unmatched
//! request is never an error.

use thiserror::Error;

/// Error returned by a dynamic response producer.
pub type ProducerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while setting up expectations.
#[derive(Debug, Error)]
pub enum MockError {
    /// A fixture reference could not be read.
    #[error("failed to read fixture {name}: {source}")]
    Fixture {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// A fixture was referenced but the dispatcher has no resolver.
    #[error("fixture {0} referenced but no fixture directory is configured")]
    NoFixtureResolver(String),

    /// A header pattern is not a valid regex.
    #[error("invalid pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    /// The configuration parsed but failed validation.
    #[error("expectation {index}: {message}")]
    InvalidConfig { index: usize, message: String },

    /// A response body could not be decoded.
    #[error("invalid base64 body: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while dispatching a request.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The matched expectation's producer failed. The expectation stays
    /// consumed.
    #[error("response producer for {label} failed: {source}")]
    Producer {
        label: String,
        #[source]
        source: ProducerError,
    },
}

pub type Result<T, E = MockError> = std::result::Result<T, E>;
