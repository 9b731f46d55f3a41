//! Shared domain vocabulary: roles, enrollment states, typed search filters.

use crate::error::{DomainError, Result};
use crate::keys;

/// Account roles. The numeric codes are stored nowhere; only the names are
/// persisted (`role_name` attribute and `ROLE#<NAME>` GSI1 search keys).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin = 1,
    Lecturer = 2,
    Student = 3,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Lecturer => "LECTURER",
            Role::Student => "STUDENT",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "LECTURER" => Ok(Role::Lecturer),
            "STUDENT" => Ok(Role::Student),
            other => Err(DomainError::Validation(format!("unknown role: {other}"))),
        }
    }

    /// GSI1 partition used to list all accounts of a role.
    pub fn search_key(&self) -> String {
        format!("{}{}", keys::ROLE_PREFIX, self.as_str())
    }
}

/// Enrollment record states. `Waitlist` exists in the vocabulary but no
/// workflow produces it; enrollment past the cap fails instead of queueing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentStatus {
    Unenrolled = 0,
    Enrolled = 1,
    Waitlist = 2,
}

impl EnrollmentStatus {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(EnrollmentStatus::Unenrolled),
            1 => Some(EnrollmentStatus::Enrolled),
            2 => Some(EnrollmentStatus::Waitlist),
            _ => None,
        }
    }
}

/// Post-query filters for subject search. `None` fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct SubjectFilter {
    pub department: Option<String>,
    pub status: Option<i32>,
}

/// Post-query filters for class search.
#[derive(Debug, Clone, Default)]
pub struct ClassFilter {
    pub subject_id: Option<String>,
    pub teacher_id: Option<String>,
    pub status: Option<i32>,
    pub semester: Option<String>,
}

/// Post-query filters for user search (role partitions already split
/// students from lecturers; this narrows further).
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub status: Option<i32>,
}

/// Post-query filters for the audit-log listing.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub actor_id: Option<String>,
    pub class_id: Option<String>,
    /// Date prefix (`YYYY-MM-DD`) matched against the log timestamp.
    pub date: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_case_insensitive() {
        assert_eq!(Role::parse("student").unwrap(), Role::Student);
        assert_eq!(Role::parse("LECTURER").unwrap(), Role::Lecturer);
        assert!(Role::parse("janitor").is_err());
    }

    #[test]
    fn test_role_search_key() {
        assert_eq!(Role::Admin.search_key(), "ROLE#ADMIN");
    }

    #[test]
    fn test_enrollment_status_codes() {
        assert_eq!(EnrollmentStatus::Enrolled.code(), 1);
        assert_eq!(
            EnrollmentStatus::from_code(2),
            Some(EnrollmentStatus::Waitlist)
        );
        assert_eq!(EnrollmentStatus::from_code(7), None);
    }
}
