//! Error taxonomy for the analysis core
//!
//! - `MissingChannel`: a rule or the classifier references a channel the
//!   table does not carry. Fatal for the classifier, isolated per rule.
//! - `InvalidArgument`: malformed parameter/threshold request.
//! - `UndefinedAggregate`: a ratio computed over zero qualifying samples.
//! - `InvalidSeries`: timestamps not strictly increasing, or ragged channels.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisError {
    #[error("Missing channel '{channel}' required by {context}")]
    MissingChannel { channel: String, context: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Undefined aggregate: {0} (no qualifying samples)")]
    UndefinedAggregate(String),

    #[error("Invalid time series: {0}")]
    InvalidSeries(String),
}

impl AnalysisError {
    pub fn missing_channel(channel: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingChannel {
            channel: channel.into(),
            context: context.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
