// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Governance error taxonomy.
//!
//! Every operation exposed by the application layer fails with exactly one of
//! these kinds. Callers branch on the variant, never on the message.

use thiserror::Error;

use crate::domain::repository::RepositoryError;

#[derive(Debug, Error)]
pub enum GovernanceError {
    /// The resource does not exist, or the caller may not learn that it does.
    #[error("{0} not found")]
    NotFound(String),

    /// Checkout held by someone else, duplicate grant, stale workflow state.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Stored structure contradicts itself (dangling parent, path mismatch).
    /// Never downgraded to a partial answer.
    #[error("Integrity fault: {0}")]
    Integrity(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Transient storage condition (lock timeout, serialization failure).
    #[error("Storage temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Repository error: {0}")]
    Repository(String),
}

impl GovernanceError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GovernanceError::Unavailable(_))
    }

    /// Stable, machine-readable kind used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            GovernanceError::NotFound(_) => "not_found",
            GovernanceError::Conflict(_) => "conflict",
            GovernanceError::Forbidden(_) => "forbidden",
            GovernanceError::Integrity(_) => "integrity",
            GovernanceError::Validation(_) => "validation",
            GovernanceError::Unavailable(_) => "unavailable",
            GovernanceError::Repository(_) => "repository",
        }
    }
}

impl From<RepositoryError> for GovernanceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => GovernanceError::NotFound(what),
            RepositoryError::Conflict(msg) => GovernanceError::Conflict(msg),
            RepositoryError::StaleState(msg) => GovernanceError::Conflict(msg),
            RepositoryError::Integrity(msg) => GovernanceError::Integrity(msg),
            RepositoryError::Transient(msg) => GovernanceError::Unavailable(msg),
            other => GovernanceError::Repository(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_failures_are_retryable() {
        assert!(GovernanceError::from(RepositoryError::Transient("lock timeout".into())).is_retryable());
        assert!(!GovernanceError::Conflict("held".into()).is_retryable());
        assert!(!GovernanceError::from(RepositoryError::Database("syntax".into())).is_retryable());
    }

    #[test]
    fn test_stale_state_surfaces_as_conflict() {
        let err = GovernanceError::from(RepositoryError::StaleState("moved on".into()));
        assert_eq!(err.kind(), "conflict");
    }
}
