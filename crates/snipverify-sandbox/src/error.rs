//! Adapter error types
//!
//! Both types describe the isolation layer, never the snippet. A snippet
//! that exits non-zero is a normal [`ExecutionOutcome`](crate::ExecutionOutcome).

use thiserror::Error;

/// Sandbox environment could not be created
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Runtime backend is not reachable (daemon down, binary missing)
    #[error("runtime unavailable: {0}")]
    Unavailable(String),

    /// Host is out of some resource (disk, memory, container slots)
    #[error("host resources exhausted: {0}")]
    ResourceExhausted(String),

    /// Backend refused to create the environment
    #[error("environment creation failed: {0}")]
    CreateFailed(String),

    /// Spec cannot be satisfied by this runtime at all
    #[error("invalid execution spec: {0}")]
    InvalidSpec(String),

    /// I/O error while preparing the environment
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisionError {
    /// Whether a later attempt might succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidSpec(_))
    }
}

/// The isolation layer itself faulted while running a snippet
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Handle does not belong to this runtime, or was already torn down
    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    /// Container runtime or sandbox supervisor crashed
    #[error("isolation layer fault: {0}")]
    IsolationFault(String),

    /// I/O error while talking to the environment
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_spec_is_not_retryable() {
        assert!(ProvisionError::Unavailable("docker".into()).is_retryable());
        assert!(ProvisionError::ResourceExhausted("disk".into()).is_retryable());
        assert!(!ProvisionError::InvalidSpec("no image".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = ExecutionError::IsolationFault("daemon crashed".into());
        assert_eq!(err.to_string(), "isolation layer fault: daemon crashed");
    }
}
