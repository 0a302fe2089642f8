//! Setup-time errors. Per-candidate network faults never reach these types;
//! the probes turn them into absent or zero measurements.
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be a finite number greater than zero (got {value})")]
    NonPositive { field: &'static str, value: f64 },

    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: f64 },

    #[error("{field} must be at least 1")]
    Zero { field: &'static str },
}

#[derive(Debug, Error, PartialEq)]
pub enum RangeError {
    #[error("line {line}: invalid address or range `{input}`: {reason}")]
    Invalid {
        line: usize,
        input: String,
        reason: String,
    },

    #[error("ranges expand to more than {limit} candidates")]
    TooManyCandidates { limit: usize },
}

#[derive(Debug, Error, PartialEq)]
pub enum TemplateError {
    #[error("connection template is not a valid URL: {0}")]
    Parse(#[from] url::ParseError),

    #[error("connection template has no host")]
    MissingHost,

    #[error("cannot substitute address {0} into the connection template")]
    Substitute(String),
}
