//! Error types for the consensus components

use crate::types::SourceFailure;
use thiserror::Error;

/// Consensus engine errors
///
/// A result below the approval threshold is not an error; it comes back with
/// `approved = false`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConsensusError {
    /// Every source failed or had no answer
    #[error("No source could locate '{location}' ({} failed)", .failures.len())]
    SourceUnavailable {
        location: String,
        failures: Vec<SourceFailure>,
    },

    /// Blank or otherwise unusable request
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Analytics and export errors
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Export format not supported: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Integration facade errors
#[derive(Debug, Error)]
pub enum IntegrationError {
    /// Main location could not be validated
    #[error("Validation failed: {0}")]
    Validation(#[from] ConsensusError),

    /// Chapter mapper failed
    #[error("Chapter mapping failed: {0}")]
    Mapping(#[source] anyhow::Error),

    #[error("Invalid feedback: {0}")]
    InvalidFeedback(String),
}
