use crate::{
    address::EncodingError,
    network::{NetworkError, SubmissionError},
    schema::SchemaError,
    signer::SigningError,
    wallet::DerivationError,
};

/// An error returned by [crate::orchestrator::TxOrchestrator] and the helpers it is built from.
///
/// None of these errors are retried internally. [Error::is_retry_safe] reports whether the caller may repeat the same
/// call without risking a duplicate transaction or a repeated signature prompt.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The caller supplied malformed parameters.
    #[error("invalid parameters: {0}")]
    Validation(String),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Derivation(#[from] DerivationError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error("query failed: {0}")]
    Query(#[source] NetworkError),
}

impl Error {
    pub fn is_retry_safe(&self) -> bool {
        match self {
            Error::Submission(e) => e.retry_safe,
            Error::Query(e) => e.is_transport(),
            _ => false,
        }
    }
}
