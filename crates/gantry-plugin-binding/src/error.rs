//! Errors returned by the plugin binding manager

use thiserror::Error;

/// Failure of a plugin binding pass
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API or shared helper failure
    #[error(transparent)]
    Common(#[from] gantry_common::Error),

    /// Plugin definition without a namespace
    #[error("plugin {0} has no namespace")]
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
