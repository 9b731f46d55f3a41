//! Assignments, submissions, grading, ranking.
//!
//! Assignments and their submissions share one partition per class
//! (`ASSIGNMENT#<classId>`): the assignment head is `INFO#<assignmentId>`
//! and each submission is `SUBMISSION#<assignmentId>#<studentId>`, so a
//! roster read for one assignment is a single sort-prefix query. The GSI1
//! mirrors give "assignments of a class" and "this student's submission".

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::collab::ObjectStorage;
use crate::domain::EnrollmentStatus;
use crate::error::{DomainError, Result};
use crate::keys;
use crate::schema;
use crate::storage::{Item, ItemExt, QuerySpec, TableStore};

use super::class::assert_class_owner;
use super::STATUS_ACTIVE;

/// Seconds a presigned attachment URL stays valid.
const ATTACHMENT_URL_TTL_SECS: u64 = 900;

/// Cap on the summed grade weights of one class.
const MAX_TOTAL_WEIGHT: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct Assignment {
    pub id: String,
    pub class_id: String,
    pub title: String,
    pub content: Option<String>,
    pub deadline: Option<String>,
    pub max_score: Option<f64>,
    pub weight: f64,
    pub is_published: bool,
    pub file_url: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Assignment {
    fn from_item(item: &Item) -> Result<Self> {
        let pk = item.req_s(schema::PK)?;
        let sk = item.req_s(schema::SK)?;
        Ok(Self {
            id: sk
                .strip_prefix(&format!("{}#", keys::SK_INFO))
                .unwrap_or(sk)
                .to_string(),
            class_id: keys::strip(keys::ASSIGNMENT_PREFIX, pk).to_string(),
            title: item.opt_s(schema::TITLE)?.unwrap_or_default().to_string(),
            content: item.opt_s(schema::CONTENT)?.map(str::to_string),
            deadline: item.opt_s(schema::DEADLINE)?.map(str::to_string),
            max_score: item.opt_f64(schema::MAX_SCORE)?,
            weight: item.opt_f64(schema::WEIGHT)?.unwrap_or(0.0),
            is_published: item.opt_bool(schema::IS_PUBLISHED)?.unwrap_or(false),
            file_url: item.opt_s(schema::FILE_URL)?.map(str::to_string),
            created_at: item.opt_s(schema::CREATED_AT)?.map(str::to_string),
            updated_at: item.opt_s(schema::UPDATED_AT)?.map(str::to_string),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub assignment_id: String,
    pub student_id: String,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
    pub submitted_at: Option<String>,
    /// `late` or `on_time`, decided at submission time.
    pub timing: Option<String>,
    pub score: Option<f64>,
    pub feedback: Option<String>,
    pub graded_at: Option<String>,
}

impl Submission {
    fn from_item(item: &Item) -> Result<Self> {
        let sk = item.req_s(schema::SK)?;
        let student_id = keys::student_id_from_submission_sk(sk)
            .unwrap_or_default()
            .to_string();
        let assignment_id = sk
            .strip_prefix(keys::SUBMISSION_PREFIX)
            .and_then(|rest| rest.rsplit_once('#'))
            .map(|(aid, _)| aid.to_string())
            .unwrap_or_default();
        Ok(Self {
            assignment_id,
            student_id,
            file_url: item.opt_s(schema::FILE_URL)?.map(str::to_string),
            file_name: item.opt_s(schema::FILE_NAME)?.map(str::to_string),
            file_type: item.opt_s(schema::FILE_TYPE)?.map(str::to_string),
            submitted_at: item.opt_s(schema::SUBMITTED_AT)?.map(str::to_string),
            timing: item.opt_s(schema::TYPE)?.map(str::to_string),
            score: item.opt_f64(schema::SCORE)?,
            feedback: item.opt_s(schema::FEEDBACK)?.map(str::to_string),
            graded_at: item.opt_s(schema::GRADED_AT)?.map(str::to_string),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub title: String,
    pub content: Option<String>,
    pub deadline: Option<String>,
    pub max_score: Option<f64>,
    pub weight: f64,
    pub is_published: bool,
    pub file_url: Option<String>,
}

/// Fields an assignment update may change. `None` leaves the stored value.
#[derive(Debug, Clone, Default)]
pub struct AssignmentUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub deadline: Option<String>,
    pub max_score: Option<f64>,
    pub weight: Option<f64>,
    pub is_published: Option<bool>,
    pub file_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub file_url: String,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankEntry {
    pub student_id: String,
    pub total_score: f64,
    pub rank: usize,
}

pub struct AssignmentRepository {
    store: Arc<dyn TableStore>,
    files: Option<Arc<dyn ObjectStorage>>,
}

impl AssignmentRepository {
    pub fn new(store: Arc<dyn TableStore>, files: Option<Arc<dyn ObjectStorage>>) -> Self {
        Self { store, files }
    }

    /// Create an assignment in a class the teacher owns.
    pub async fn create(
        &self,
        class_id: &str,
        teacher_id: &str,
        new: NewAssignment,
    ) -> Result<Assignment> {
        assert_class_owner(self.store.as_ref(), class_id, teacher_id).await?;
        if new.title.trim().is_empty() {
            return Err(DomainError::Validation("assignment title is required".into()));
        }
        if new.weight < 0.0 {
            return Err(DomainError::Validation("weight cannot be negative".into()));
        }

        let assignment_id = format!("ASS_{}", super::short_code());
        let now = super::now();
        let key = keys::assignment(class_id, &assignment_id);
        let raw_class = keys::strip(keys::CLASS_PREFIX, class_id);

        let mut item = crate::storage::item::keyed(&key);
        item.set_s(schema::GSI1_PK, keys::class_pk(class_id));
        item.set_s(
            schema::GSI1_SK,
            format!("{}{assignment_id}", keys::ASSIGNMENT_PREFIX),
        );
        item.set_s(schema::ID, assignment_id.clone());
        item.set_s(schema::CLASS_ID, raw_class);
        item.set_s(schema::TITLE, new.title);
        item.set_opt_s(schema::CONTENT, new.content);
        item.set_opt_s(schema::DEADLINE, new.deadline);
        if let Some(max_score) = new.max_score {
            item.set_f64(schema::MAX_SCORE, max_score);
        }
        item.set_f64(schema::WEIGHT, new.weight);
        item.set_bool(schema::IS_PUBLISHED, new.is_published);
        item.set_opt_s(schema::FILE_URL, new.file_url);
        item.set_s(schema::CREATED_AT, now.clone());
        item.set_s(schema::UPDATED_AT, now);

        let assignment = Assignment::from_item(&item)?;
        self.store.put(item).await?;
        info!(class_id = %assignment.class_id, assignment_id = %assignment_id, "Assignment created");
        Ok(assignment)
    }

    /// Update an assignment. A weight change re-validates the class total:
    /// all other assignments' weights plus the new one must stay within
    /// the cap.
    pub async fn update(
        &self,
        class_id: &str,
        assignment_id: &str,
        teacher_id: &str,
        update: AssignmentUpdate,
    ) -> Result<Assignment> {
        assert_class_owner(self.store.as_ref(), class_id, teacher_id).await?;
        let key = keys::assignment(class_id, assignment_id);
        let mut item = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| DomainError::not_found("assignment", assignment_id))?;

        if let Some(weight) = update.weight {
            let others: f64 = self
                .list_for_class(class_id)
                .await?
                .iter()
                .filter(|a| a.id != assignment_id)
                .map(|a| a.weight)
                .sum();
            if others + weight > MAX_TOTAL_WEIGHT {
                return Err(DomainError::Validation(format!(
                    "total weight would be {:.1}, cap is {MAX_TOTAL_WEIGHT:.0}",
                    others + weight
                )));
            }
            item.set_f64(schema::WEIGHT, weight);
        }
        if let Some(title) = update.title {
            if !title.is_empty() {
                item.set_s(schema::TITLE, title);
            }
        }
        if let Some(content) = update.content {
            item.set_s(schema::CONTENT, content);
        }
        if let Some(deadline) = update.deadline {
            item.set_s(schema::DEADLINE, deadline);
        }
        if let Some(max_score) = update.max_score {
            item.set_f64(schema::MAX_SCORE, max_score);
        }
        if let Some(is_published) = update.is_published {
            item.set_bool(schema::IS_PUBLISHED, is_published);
        }
        if let Some(file_url) = update.file_url {
            item.set_s(schema::FILE_URL, file_url);
        }
        item.set_s(schema::UPDATED_AT, super::now());

        let assignment = Assignment::from_item(&item)?;
        self.store.put(item).await?;
        Ok(assignment)
    }

    /// Delete an assignment. With submissions on file the assignment is
    /// only unpublished so grades stay reachable; without any it is
    /// removed outright.
    pub async fn delete(
        &self,
        class_id: &str,
        assignment_id: &str,
        teacher_id: &str,
    ) -> Result<()> {
        assert_class_owner(self.store.as_ref(), class_id, teacher_id).await?;
        let key = keys::assignment(class_id, assignment_id);
        let mut item = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| DomainError::not_found("assignment", assignment_id))?;

        let submissions = self.submission_items(class_id, assignment_id).await?;
        if submissions.is_empty() {
            self.store.delete(&key).await?;
            info!(assignment_id = %assignment_id, "Assignment deleted");
        } else {
            item.set_bool(schema::IS_PUBLISHED, false);
            item.set_s(schema::UPDATED_AT, super::now());
            self.store.put(item).await?;
            info!(assignment_id = %assignment_id, submissions = submissions.len(), "Assignment unpublished instead of deleted");
        }
        Ok(())
    }

    pub async fn get(&self, class_id: &str, assignment_id: &str) -> Result<Assignment> {
        let item = self
            .store
            .get(&keys::assignment(class_id, assignment_id))
            .await?
            .ok_or_else(|| DomainError::not_found("assignment", assignment_id))?;
        Assignment::from_item(&item)
    }

    /// All assignments of a class, via the GSI1 mirror.
    pub async fn list_for_class(&self, class_id: &str) -> Result<Vec<Assignment>> {
        let items = self
            .store
            .query(
                QuerySpec::gsi1(keys::class_pk(class_id))
                    .sort_prefix(keys::ASSIGNMENT_PREFIX),
            )
            .await?;
        items.iter().map(Assignment::from_item).collect()
    }

    /// Published assignments only, for an enrolled student.
    pub async fn list_published(
        &self,
        class_id: &str,
        student_id: &str,
    ) -> Result<Vec<Assignment>> {
        self.ensure_enrolled(class_id, student_id).await?;
        let mut assignments = self.list_for_class(class_id).await?;
        assignments.retain(|a| a.is_published);
        Ok(assignments)
    }

    /// First submission for an assignment. The timing stamp compares the
    /// submission instant against the deadline; a deadline that does not
    /// parse counts as not late.
    pub async fn submit(
        &self,
        class_id: &str,
        assignment_id: &str,
        student_id: &str,
        new: NewSubmission,
    ) -> Result<Submission> {
        self.ensure_enrolled(class_id, student_id).await?;
        if new.file_url.trim().is_empty() {
            return Err(DomainError::Validation("submission file is required".into()));
        }
        let assignment = self.get(class_id, assignment_id).await?;
        if !assignment.is_published {
            return Err(DomainError::Forbidden("assignment is not published".into()));
        }

        let key = keys::submission(class_id, assignment_id, student_id);
        if self.store.get(&key).await?.is_some() {
            return Err(DomainError::Conflict(
                "submission already exists, resubmit instead".into(),
            ));
        }

        let now = super::now();
        let mut item = crate::storage::item::keyed(&key);
        item.set_s(schema::GSI1_PK, keys::user_pk(student_id));
        item.set_s(
            schema::GSI1_SK,
            format!("{}{assignment_id}", keys::SUBMISSION_PREFIX),
        );
        item.set_s(schema::STUDENT_ID, keys::strip(keys::USER_PREFIX, student_id));
        item.set_s(schema::FILE_URL, new.file_url);
        item.set_opt_s(schema::FILE_NAME, new.file_name);
        item.set_opt_s(schema::FILE_TYPE, new.file_type);
        item.set_i32(schema::STATUS, STATUS_ACTIVE);
        item.set_s(schema::SUBMITTED_AT, now.clone());
        item.set_s(schema::TYPE, Self::timing(assignment.deadline.as_deref(), &now));

        let submission = Submission::from_item(&item)?;
        self.store.put(item).await?;
        Ok(submission)
    }

    /// Replace an existing submission. The file may be kept; any grade
    /// already given is wiped back to explicit nulls and the timing is
    /// re-evaluated against the deadline.
    pub async fn resubmit(
        &self,
        class_id: &str,
        assignment_id: &str,
        student_id: &str,
        file: Option<NewSubmission>,
    ) -> Result<Submission> {
        let key = keys::submission(class_id, assignment_id, student_id);
        let mut item = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| DomainError::not_found("submission", assignment_id))?;

        if let Some(file) = file {
            if file.file_url.trim().is_empty() {
                return Err(DomainError::Validation("submission file is required".into()));
            }
            item.set_s(schema::FILE_URL, file.file_url);
            item.set_opt_s(schema::FILE_NAME, file.file_name);
            item.set_opt_s(schema::FILE_TYPE, file.file_type);
        } else if item.opt_s(schema::FILE_URL)?.unwrap_or("").is_empty() {
            return Err(DomainError::Validation("submission file is required".into()));
        }

        let assignment = self.get(class_id, assignment_id).await?;
        let now = super::now();
        item.set_s(schema::SUBMITTED_AT, now.clone());
        item.set_s(schema::TYPE, Self::timing(assignment.deadline.as_deref(), &now));
        item.set_null(schema::SCORE);
        item.set_null(schema::FEEDBACK);
        item.set_null(schema::GRADED_AT);

        let submission = Submission::from_item(&item)?;
        self.store.put(item).await?;
        info!(assignment_id = %assignment_id, student_id = %submission.student_id, "Submission replaced, grade cleared");
        Ok(submission)
    }

    /// Grade one student's work. Without a submission on file an empty one
    /// is synthesized so a grade can always be recorded.
    pub async fn grade(
        &self,
        class_id: &str,
        assignment_id: &str,
        student_id: &str,
        teacher_id: &str,
        score: f64,
        feedback: Option<&str>,
    ) -> Result<Submission> {
        assert_class_owner(self.store.as_ref(), class_id, teacher_id).await?;
        self.get(class_id, assignment_id).await?;
        if !(0.0..=10.0).contains(&score) {
            return Err(DomainError::Validation(format!(
                "score must be between 0 and 10, got {score}"
            )));
        }

        let key = keys::submission(class_id, assignment_id, student_id);
        let now = super::now();
        let mut item = match self.store.get(&key).await? {
            Some(existing) => existing,
            None => {
                warn!(assignment_id = %assignment_id, student_id = %student_id, "Grading without a submission, synthesizing one");
                let mut fresh = crate::storage::item::keyed(&key);
                fresh.set_s(schema::GSI1_PK, keys::user_pk(student_id));
                fresh.set_s(
                    schema::GSI1_SK,
                    format!("{}{assignment_id}", keys::SUBMISSION_PREFIX),
                );
                fresh.set_s(schema::STUDENT_ID, keys::strip(keys::USER_PREFIX, student_id));
                fresh.set_i32(schema::STATUS, STATUS_ACTIVE);
                fresh.set_s(schema::SUBMITTED_AT, now.clone());
                fresh
            }
        };

        item.set_f64(schema::SCORE, score);
        item.set_opt_s(schema::FEEDBACK, feedback.map(str::to_string));
        item.set_s(schema::GRADED_AT, now.clone());
        item.set_s(schema::UPDATED_AT, now);

        let submission = Submission::from_item(&item)?;
        self.store.put(item).await?;
        Ok(submission)
    }

    /// All submissions for one assignment, teacher view.
    pub async fn list_submissions(
        &self,
        class_id: &str,
        assignment_id: &str,
        teacher_id: &str,
    ) -> Result<Vec<Submission>> {
        assert_class_owner(self.store.as_ref(), class_id, teacher_id).await?;
        let items = self.submission_items(class_id, assignment_id).await?;
        items.iter().map(Submission::from_item).collect()
    }

    /// A student's own submission, via the GSI1 mirror.
    pub async fn submission_for_student(
        &self,
        student_id: &str,
        assignment_id: &str,
    ) -> Result<Option<Submission>> {
        let items = self
            .store
            .query(
                QuerySpec::gsi1(keys::user_pk(student_id)).sort_prefix(format!(
                    "{}{assignment_id}",
                    keys::SUBMISSION_PREFIX
                )),
            )
            .await?;
        items.first().map(Submission::from_item).transpose()
    }

    /// Score ranking over every submission of the class. Scores are summed
    /// per student and ranked descending; ties keep their sort position.
    pub async fn class_ranking(&self, class_id: &str) -> Result<Vec<RankEntry>> {
        let items = self
            .store
            .query(
                QuerySpec::partition(keys::assignment_pk(class_id))
                    .sort_prefix(keys::SUBMISSION_PREFIX),
            )
            .await?;

        let mut totals: Vec<(String, f64)> = Vec::new();
        for item in &items {
            let sk = item.req_s(schema::SK)?;
            let Some(student_id) = keys::student_id_from_submission_sk(sk) else {
                continue;
            };
            let score = item.opt_f64(schema::SCORE)?.unwrap_or(0.0);
            match totals.iter_mut().find(|(sid, _)| sid == student_id) {
                Some((_, total)) => *total += score,
                None => totals.push((student_id.to_string(), score)),
            }
        }

        totals.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(totals
            .into_iter()
            .enumerate()
            .map(|(index, (student_id, total_score))| RankEntry {
                student_id,
                total_score,
                rank: index + 1,
            })
            .collect())
    }

    /// An enrolled student's rank in the class. A student with no
    /// submissions ranks at the bottom of the board.
    pub async fn student_rank(&self, class_id: &str, student_id: &str) -> Result<usize> {
        self.ensure_enrolled(class_id, student_id).await?;
        let ranking = self.class_ranking(class_id).await?;
        let raw = keys::strip(keys::USER_PREFIX, student_id);
        Ok(ranking
            .iter()
            .find(|entry| entry.student_id == raw)
            .map(|entry| entry.rank)
            .unwrap_or(ranking.len()))
    }

    /// Presigned URL for uploading a submission attachment.
    pub async fn attachment_upload_url(
        &self,
        class_id: &str,
        assignment_id: &str,
        student_id: &str,
        file_name: &str,
        content_type: &str,
    ) -> Result<String> {
        let files = self.files.as_ref().ok_or_else(|| {
            DomainError::Validation("file storage is not configured".into())
        })?;
        let object_key = format!(
            "submissions/{}/{assignment_id}/{}/{file_name}",
            keys::strip(keys::CLASS_PREFIX, class_id),
            keys::strip(keys::USER_PREFIX, student_id),
        );
        Ok(files
            .issue_upload_url(&object_key, content_type, ATTACHMENT_URL_TTL_SECS)
            .await?)
    }

    /// Presigned URL for downloading an attachment by object key.
    pub async fn attachment_download_url(&self, object_key: &str) -> Result<String> {
        let files = self.files.as_ref().ok_or_else(|| {
            DomainError::Validation("file storage is not configured".into())
        })?;
        Ok(files
            .issue_download_url(object_key, ATTACHMENT_URL_TTL_SECS)
            .await?)
    }

    async fn submission_items(&self, class_id: &str, assignment_id: &str) -> Result<Vec<Item>> {
        Ok(self
            .store
            .query(
                QuerySpec::partition(keys::assignment_pk(class_id)).sort_prefix(format!(
                    "{}{assignment_id}#",
                    keys::SUBMISSION_PREFIX
                )),
            )
            .await?)
    }

    async fn ensure_enrolled(&self, class_id: &str, student_id: &str) -> Result<()> {
        let item = self
            .store
            .get(&keys::enrollment(class_id, student_id))
            .await?
            .ok_or_else(|| {
                DomainError::Forbidden(format!("student {student_id} is not in this class"))
            })?;
        let status = item
            .opt_i32(schema::STATUS)?
            .unwrap_or(EnrollmentStatus::Enrolled.code());
        if status != EnrollmentStatus::Enrolled.code() {
            return Err(DomainError::Forbidden(format!(
                "student {student_id} is not active in this class"
            )));
        }
        Ok(())
    }

    fn timing(deadline: Option<&str>, submitted_at: &str) -> &'static str {
        let Some(deadline) = deadline else {
            return "on_time";
        };
        let Ok(deadline) = DateTime::parse_from_rfc3339(deadline) else {
            // unparsable deadlines never mark anyone late
            return "on_time";
        };
        let Ok(now) = DateTime::parse_from_rfc3339(submitted_at) else {
            return "on_time";
        };
        if now.with_timezone(&Utc) > deadline.with_timezone(&Utc) {
            "late"
        } else {
            "on_time"
        }
    }
}
