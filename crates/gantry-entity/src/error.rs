//! Errors returned by entity reconcilers

use gantry_remote::RemoteError;
use thiserror::Error;

/// Failure of a reconcile pass that could not be folded into status
///
/// Remote rejections and missing dependencies are reported on conditions;
/// only store failures and unexpected errors surface here.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Kubernetes API or shared helper failure
    #[error(transparent)]
    Kube(#[from] gantry_common::Error),

    /// Remote API failure that was not mapped to a condition
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Object is malformed in a way no status can describe
    #[error("validation error: {0}")]
    Validation(String),
}

impl ReconcileError {
    /// Whether the controller should retry with backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Kube(e) => e.is_retryable(),
            Self::Remote(e) => e.is_transient(),
            Self::Validation(_) => false,
        }
    }
}

impl From<kube::Error> for ReconcileError {
    fn from(e: kube::Error) -> Self {
        Self::Kube(e.into())
    }
}
