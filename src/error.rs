use thiserror::Error;

/// Domain failures that callers branch on. Plumbing errors stay `anyhow::Error`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexerError {
    /// Missing or invalid network, provider, signing key or address configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An RPC call failed; recovered by the retry wrapper where possible.
    #[error("transient fetch error: {0}")]
    TransientFetch(String),

    /// The ledger claims a state the store does not have.
    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),

    /// Malformed input at the query boundary.
    #[error("validation error: {0}")]
    Validation(String),
}

impl IndexerError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientFetch(msg.into())
    }

    /// Finds a domain error anywhere in an `anyhow` chain.
    pub fn find(err: &anyhow::Error) -> Option<&IndexerError> {
        err.chain().find_map(|cause| cause.downcast_ref::<IndexerError>())
    }
}
