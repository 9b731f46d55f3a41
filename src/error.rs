//! Domain error taxonomy.
//!
//! Callers map these onto transport concerns (404/403/409) themselves;
//! the taxonomy keeps the kinds distinct so that mapping stays trivial.

use crate::collab::CollabError;
use crate::storage::StorageError;

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;

/// Errors surfaced by repositories and workflows.
///
/// No operation retries on failure; every error is single-shot and it is
/// the caller's decision whether to try again.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    /// Malformed input, missing required field, out-of-range value.
    #[error("validation: {0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The actor lacks ownership or enrollment for the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The class is at its enrollment cap.
    #[error("class {class_id} is full (capacity {capacity})")]
    ClassFull { class_id: String, capacity: u32 },

    /// The (class, student) pair is already enrolled.
    #[error("student {student_id} already enrolled in class {class_id}")]
    AlreadyEnrolled {
        class_id: String,
        student_id: String,
    },

    /// A concurrent update lost a conditional write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Identity provider failures are fatal to login and user creation.
    #[error("identity provider failure: {0}")]
    IdentityProvider(String),

    /// Other collaborator failures (object storage); email and event-bus
    /// failures never reach this type, they are logged and swallowed.
    #[error("collaborator failure: {0}")]
    Collaborator(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DomainError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// True for the capacity/conflict family ("try again" semantics).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::ClassFull { .. } | Self::AlreadyEnrolled { .. } | Self::Conflict(_)
        )
    }
}

impl From<CollabError> for DomainError {
    fn from(err: CollabError) -> Self {
        match err {
            CollabError::Identity(msg) => Self::IdentityProvider(msg),
            other => Self::Collaborator(other.to_string()),
        }
    }
}
