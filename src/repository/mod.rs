//! Per-entity repositories and the cross-entity workflows.
//!
//! Every repository shares one [`TableStore`](crate::storage::TableStore)
//! and owns the item layout of its entity family. Workflows that span
//! several items (enrollment, grading, cascade deletes) run as sequences of
//! independent writes with no transaction around them; the ordering inside
//! each workflow is deliberate and documented per operation.

use uuid::Uuid;

pub mod assignment;
pub mod audit;
pub mod class;
pub mod enrollment;
pub mod notification;
pub mod post;
pub mod subject;
pub mod user;

pub use assignment::AssignmentRepository;
pub use audit::AuditLog;
pub use class::ClassRepository;
pub use enrollment::EnrollmentRepository;
pub use notification::NotificationRepository;
pub use post::PostRepository;
pub use subject::SubjectRepository;
pub use user::UserRepository;

/// Active/inactive status codes shared by every soft-deletable entity.
pub const STATUS_ACTIVE: i32 = 1;
pub const STATUS_INACTIVE: i32 = 0;

/// Current instant in the stored wire format (RFC3339, UTC).
pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Short uppercase id used for classes and assignments.
pub(crate) fn short_code() -> String {
    Uuid::new_v4().to_string()[..8].to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_code_shape() {
        let code = short_code();
        assert_eq!(code.len(), 8);
        assert_eq!(code, code.to_uppercase());
    }
}
