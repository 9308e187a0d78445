//! Error taxonomy for the deposit pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A boundary dataset or the geocoding service could not be reached or
    /// returned something unusable.
    #[error("failed to fetch {source_name}: {reason}")]
    CollaboratorFetch { source_name: String, reason: String },

    /// A CSV row that is missing required fields or cannot be parsed.
    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    /// The collaborator did not answer within the configured timeout.
    #[error("{source_name} timed out")]
    Timeout { source_name: String },
}

impl PipelineError {
    pub fn fetch(source_name: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::CollaboratorFetch {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PipelineError::Timeout { .. })
    }
}
