//! Attribute names stored in the table.
//!
//! The mix of camelCase and snake_case is historical; both spellings are
//! live in existing rows, so every name here must stay bit-exact.

pub const PK: &str = "PK";
pub const SK: &str = "SK";
pub const GSI1_PK: &str = "GSI1PK";
pub const GSI1_SK: &str = "GSI1SK";

// Shared
pub const ID: &str = "id";
pub const NAME: &str = "name";
pub const STATUS: &str = "status";
pub const TYPE: &str = "type";
pub const TITLE: &str = "title";
pub const CONTENT: &str = "content";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

// User profile
pub const CODE_USER: &str = "codeUser";
pub const EMAIL: &str = "email";
pub const ROLE_NAME: &str = "role_name";
pub const DATE_OF_BIRTH: &str = "date_of_birth";
pub const AVATAR: &str = "avatar";

// Subject
pub const CODE_SUBJECT: &str = "codeSubject";
pub const CREDITS: &str = "credits";
pub const DEPARTMENT: &str = "department";
pub const PREREQUISITES: &str = "prerequisites";

// Class
pub const SUBJECT_ID: &str = "subject_id";
pub const TEACHER_ID: &str = "teacher_id";
pub const SEMESTER: &str = "semester";
pub const ACADEMIC_YEAR: &str = "academicYear";
pub const ROOM: &str = "room";
pub const PASSWORD: &str = "password";
pub const STUDENT_COUNT: &str = "studentCount";
// denormalized names present in existing rows; no workflow here writes them
pub const STUDENT_NAME: &str = "studentName";
pub const TEACHER_NAME: &str = "teacherName";

// Enrollment
pub const JOINED_AT: &str = "joined_at";
pub const STUDENT_ID: &str = "student_id";

// Post / comment / reaction
pub const SENDER_ID: &str = "senderId";
pub const POST_ID: &str = "postId";
pub const PARENT_ID: &str = "parentId";
pub const IS_PINNED: &str = "isPinned";
pub const LIKE_COUNT: &str = "likeCount";
pub const COMMENT_COUNT: &str = "commentCount";

// Assignment / submission
pub const DEADLINE: &str = "deadline";
pub const MAX_SCORE: &str = "max_score";
pub const WEIGHT: &str = "weight";
pub const IS_PUBLISHED: &str = "is_published";
pub const FILE_URL: &str = "file_url";
pub const FILE_NAME: &str = "file_name";
pub const FILE_TYPE: &str = "file_type";
// present in existing submission rows; no workflow here writes it
pub const UPLOADED_BY: &str = "uploaded_by";
pub const SUBMITTED_AT: &str = "submitted_at";
pub const SCORE: &str = "score";
pub const FEEDBACK: &str = "feedback";
pub const GRADED_AT: &str = "gradedAt";

// Notification
pub const IS_READ: &str = "is_read";
pub const SENT_BY: &str = "sent_by";
pub const SENT_AT: &str = "sent_at";
pub const CLASS_ID: &str = "class_id";

// Audit log
pub const ACTION_TYPE: &str = "action_type";
pub const LOG_DETAILS: &str = "log_details";
pub const TARGET_CLASS_ID: &str = "target_class_id";
pub const ACTOR_ID: &str = "actor_id";
