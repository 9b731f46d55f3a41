//! Key scheme for the single table.
//!
//! The single source of truth for every PK/SK/GSI1 format. Key strings must
//! stay bit-exact compatible with existing deployments:
//!
//! | entity        | PK                    | SK                                  |
//! |---------------|-----------------------|-------------------------------------|
//! | user profile  | `USER#<id>`           | `PROFILE`                           |
//! | subject       | `SUBJECT#<code>`      | `INFO`                              |
//! | class         | `CLASS#<id>`          | `INFO`                              |
//! | enrollment    | `CLASS#<classId>`     | `STUDENT#<studentId>`               |
//! | post          | `CLASS#<classId>`     | `POST#<postId>`                     |
//! | comment       | `POST#<postId>`       | `COMMENT#<commentId>`               |
//! | reaction      | `REACTION#<entityId>` | `USER#<userId>`                     |
//! | assignment    | `ASSIGNMENT#<classId>`| `INFO#<assignmentId>`               |
//! | submission    | `ASSIGNMENT#<classId>`| `SUBMISSION#<assignmentId>#<sid>`   |
//! | notification  | `USER#<userId>`       | `NOTI#<timestamp>`                  |
//! | broadcast     | `NOTI#SYSTEM`         | `NOTI#<timestamp>`                  |
//! | audit log     | `LOG#<logId>`         | `INFO`                              |
//!
//! Normalization is idempotent: prefixing an already-prefixed id returns it
//! unchanged. No I/O happens here.

pub const USER_PREFIX: &str = "USER#";
pub const SUBJECT_PREFIX: &str = "SUBJECT#";
pub const CLASS_PREFIX: &str = "CLASS#";
pub const STUDENT_PREFIX: &str = "STUDENT#";
pub const POST_PREFIX: &str = "POST#";
pub const COMMENT_PREFIX: &str = "COMMENT#";
pub const REACTION_PREFIX: &str = "REACTION#";
pub const ASSIGNMENT_PREFIX: &str = "ASSIGNMENT#";
pub const SUBMISSION_PREFIX: &str = "SUBMISSION#";
pub const NOTIFICATION_PREFIX: &str = "NOTI#";
pub const LOG_PREFIX: &str = "LOG#";
pub const NAME_PREFIX: &str = "NAME#";
pub const ROLE_PREFIX: &str = "ROLE#";
pub const TIMESTAMP_PREFIX: &str = "TIMESTAMP#";

/// Sort key of every singleton info item (subject, class, assignment head).
pub const SK_INFO: &str = "INFO";
/// Sort key of the user profile item.
pub const SK_PROFILE: &str = "PROFILE";
/// Partition of broadcast notifications.
pub const SYSTEM_NOTIFICATIONS_PK: &str = "NOTI#SYSTEM";

/// GSI1 partitions for the "list all of a type" patterns.
pub const TYPE_SUBJECT: &str = "TYPE#SUBJECT";
pub const TYPE_CLASS: &str = "TYPE#CLASS";
pub const TYPE_LOG: &str = "TYPE#LOG";

/// Primary identity of an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey {
    pub pk: String,
    pub sk: String,
}

impl ItemKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }
}

/// Prefix `id` with `prefix` unless it already carries it.
pub fn normalize(prefix: &str, id: &str) -> String {
    if id.starts_with(prefix) {
        id.to_string()
    } else {
        format!("{prefix}{id}")
    }
}

/// Recover the raw id behind a known prefix; ids without the prefix pass
/// through unchanged.
pub fn strip<'a>(prefix: &str, id: &'a str) -> &'a str {
    id.strip_prefix(prefix).unwrap_or(id)
}

pub fn user_pk(user_id: &str) -> String {
    normalize(USER_PREFIX, user_id)
}

pub fn class_pk(class_id: &str) -> String {
    normalize(CLASS_PREFIX, class_id)
}

pub fn subject_pk(code: &str) -> String {
    normalize(SUBJECT_PREFIX, code)
}

pub fn user_profile(user_id: &str) -> ItemKey {
    ItemKey::new(user_pk(user_id), SK_PROFILE)
}

pub fn subject(code: &str) -> ItemKey {
    ItemKey::new(subject_pk(code), SK_INFO)
}

pub fn class(class_id: &str) -> ItemKey {
    ItemKey::new(class_pk(class_id), SK_INFO)
}

pub fn enrollment(class_id: &str, student_id: &str) -> ItemKey {
    ItemKey::new(
        class_pk(class_id),
        format!("{STUDENT_PREFIX}{}", strip(USER_PREFIX, student_id)),
    )
}

pub fn post(class_id: &str, post_id: &str) -> ItemKey {
    ItemKey::new(class_pk(class_id), format!("{POST_PREFIX}{post_id}"))
}

pub fn comment(post_id: &str, comment_id: &str) -> ItemKey {
    ItemKey::new(
        format!("{POST_PREFIX}{post_id}"),
        format!("{COMMENT_PREFIX}{comment_id}"),
    )
}

pub fn reaction(entity_id: &str, user_id: &str) -> ItemKey {
    ItemKey::new(format!("{REACTION_PREFIX}{entity_id}"), user_pk(user_id))
}

pub fn assignment(class_id: &str, assignment_id: &str) -> ItemKey {
    ItemKey::new(
        assignment_pk(class_id),
        format!("{SK_INFO}#{assignment_id}"),
    )
}

/// Partition shared by a class's assignments and their submissions.
pub fn assignment_pk(class_id: &str) -> String {
    format!("{ASSIGNMENT_PREFIX}{}", strip(CLASS_PREFIX, class_id))
}

pub fn submission(class_id: &str, assignment_id: &str, student_id: &str) -> ItemKey {
    ItemKey::new(
        assignment_pk(class_id),
        submission_sk(assignment_id, student_id),
    )
}

pub fn submission_sk(assignment_id: &str, student_id: &str) -> String {
    format!(
        "{SUBMISSION_PREFIX}{assignment_id}#{}",
        strip(USER_PREFIX, student_id)
    )
}

pub fn user_notification(user_id: &str, stamp: &str) -> ItemKey {
    ItemKey::new(user_pk(user_id), format!("{NOTIFICATION_PREFIX}{stamp}"))
}

pub fn system_notification(stamp: &str) -> ItemKey {
    ItemKey::new(
        SYSTEM_NOTIFICATIONS_PK,
        format!("{NOTIFICATION_PREFIX}{stamp}"),
    )
}

pub fn audit_log(log_id: &str) -> ItemKey {
    ItemKey::new(format!("{LOG_PREFIX}{log_id}"), SK_INFO)
}

/// GSI1 sort key used by the name-prefix search pattern. Names are
/// lowercased so keyword search is case-insensitive, but it remains a
/// prefix match only.
pub fn name_sort_key(name: &str) -> String {
    format!("{NAME_PREFIX}{}", name.to_lowercase())
}

/// Extract the student id from a submission sort key
/// (`SUBMISSION#<assignmentId>#<studentId>`).
pub fn student_id_from_submission_sk(sk: &str) -> Option<&str> {
    if !sk.starts_with(SUBMISSION_PREFIX) {
        return None;
    }
    sk.rsplit('#').next().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_adds_prefix_once() {
        assert_eq!(normalize(USER_PREFIX, "SE001"), "USER#SE001");
        assert_eq!(normalize(USER_PREFIX, "USER#SE001"), "USER#SE001");
    }

    #[test]
    fn test_strip_round_trip() {
        for prefix in [
            USER_PREFIX,
            CLASS_PREFIX,
            SUBJECT_PREFIX,
            POST_PREFIX,
            COMMENT_PREFIX,
            LOG_PREFIX,
        ] {
            let id = "abc123";
            let prefixed = normalize(prefix, id);
            assert_eq!(strip(prefix, &prefixed), id);
            // idempotent normalization
            assert_eq!(normalize(prefix, &prefixed), prefixed);
        }
        // stripping a bare id is a no-op
        assert_eq!(strip(USER_PREFIX, "SE001"), "SE001");
    }

    #[test]
    fn test_enrollment_key_strips_user_prefix() {
        let key = enrollment("ABCD1234", "USER#SE001");
        assert_eq!(key.pk, "CLASS#ABCD1234");
        assert_eq!(key.sk, "STUDENT#SE001");
    }

    #[test]
    fn test_assignment_partition_from_prefixed_class() {
        assert_eq!(assignment_pk("CLASS#ABCD1234"), "ASSIGNMENT#ABCD1234");
        let key = submission("ABCD1234", "ASS_1", "SE001");
        assert_eq!(key.pk, "ASSIGNMENT#ABCD1234");
        assert_eq!(key.sk, "SUBMISSION#ASS_1#SE001");
    }

    #[test]
    fn test_student_id_from_submission_sk() {
        assert_eq!(
            student_id_from_submission_sk("SUBMISSION#ASS_1#SE001"),
            Some("SE001")
        );
        assert_eq!(student_id_from_submission_sk("INFO#ASS_1"), None);
    }

    #[test]
    fn test_name_sort_key_lowercases() {
        assert_eq!(name_sort_key("Software Project"), "NAME#software project");
    }
}
