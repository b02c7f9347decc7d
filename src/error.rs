use serde::Serialize;
use thiserror::Error;

use crate::models::integrity::IntegrityIssue;

/// Errors returned by every public governance operation.
///
/// Each variant is recovered at the boundary of the operation that raised it:
/// nothing has been written when one of these comes back.
#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(
        "integrity check refused the change ({count} issue(s))",
        count = .issues.len()
    )]
    IntegrityBlocked {
        issues: Vec<IntegrityIssue>,
        /// `true` when only warnings were raised and the caller may retry
        /// with an explicit override.
        overridable: bool,
    },

    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("storage failure: {0}")]
    Storage(StoreError),

    #[error("collaborator failure: {0}")]
    Collaborator(#[from] CollaboratorError),
}

/// Flat classification of [`GovernanceError`], used by callers that only need
/// to branch on the kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    PermissionDenied,
    InvalidState,
    ValidationError,
    LimitExceeded,
    NotFound,
    IntegrityBlocked,
    ConcurrencyConflict,
    StorageUnavailable,
    CollaboratorUnavailable,
}

impl GovernanceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GovernanceError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            GovernanceError::InvalidState(_) => ErrorKind::InvalidState,
            GovernanceError::Validation(_) => ErrorKind::ValidationError,
            GovernanceError::LimitExceeded(_) => ErrorKind::LimitExceeded,
            GovernanceError::NotFound(_) => ErrorKind::NotFound,
            GovernanceError::IntegrityBlocked { .. } => ErrorKind::IntegrityBlocked,
            GovernanceError::ConcurrencyConflict(_) => ErrorKind::ConcurrencyConflict,
            GovernanceError::Storage(_) => ErrorKind::StorageUnavailable,
            GovernanceError::Collaborator(_) => ErrorKind::CollaboratorUnavailable,
        }
    }

    pub fn permission(message: impl Into<String>) -> Self {
        GovernanceError::PermissionDenied(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        GovernanceError::InvalidState(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        GovernanceError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        GovernanceError::NotFound(message.into())
    }
}

impl From<StoreError> for GovernanceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { .. } => {
                GovernanceError::ConcurrencyConflict(err.to_string())
            }
            StoreError::Missing { entity, id } => {
                GovernanceError::NotFound(format!("{entity} {id} does not exist"))
            }
            other => GovernanceError::Storage(other),
        }
    }
}

/// Errors raised by a [`crate::store::GovernanceStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} does not exist")]
    Missing { entity: &'static str, id: i64 },

    #[error("{entity} {id} changed since it was read (expected version {expected})")]
    VersionConflict {
        entity: &'static str,
        id: i64,
        expected: i64,
    },

    #[error("stored record is malformed: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// Failure reported by one of the external collaborators (membership oracle,
/// integrity hook, notification service, audit logger).
#[derive(Debug, Error)]
#[error("{service}: {message}")]
pub struct CollaboratorError {
    pub service: &'static str,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(service: &'static str, message: impl Into<String>) -> Self {
        Self {
            service,
            message: message.into(),
        }
    }
}

pub type GovernanceResult<T> = Result<T, GovernanceError>;
