//! Errors returned by the reference grant derivator

use thiserror::Error;

/// Failure of a derivation pass
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API or shared helper failure
    #[error(transparent)]
    Common(#[from] gantry_common::Error),

    /// Grant without a namespace
    #[error("grant {0} has no namespace")]
    MissingNamespace(String),
}

impl Error {
    /// Whether the controller should retry with backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Common(e) => e.is_retryable(),
            Self::MissingNamespace(_) => false,
        }
    }
}

impl From<kube::Error> for Error {
    fn from(e: kube::Error) -> Self {
        Self::Common(e.into())
    }
}
