//! Enrollment workflow.
//!
//! An enrollment is one item under the class partition
//! (`CLASS#<classId>`/`STUDENT#<studentId>`) mirrored into GSI1 as
//! `USER#<studentId>`/`CLASS#<classId>` for the "my classes" view. The
//! class item carries a denormalized `studentCount` that this module keeps
//! in step with best-effort writes: the enrollment put and the counter
//! update are separate requests, so a crash between them leaves drift.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::EnrollmentStatus;
use crate::error::{DomainError, Result};
use crate::keys;
use crate::schema;
use crate::storage::{Item, ItemExt, QuerySpec, StorageError, TableStore, UpdateCondition};

use super::class::Class;
use super::subject::Subject;
use super::{AuditLog, NotificationRepository, STATUS_ACTIVE};

/// Hard cap on students per class.
pub const MAX_CLASS_SIZE: i64 = 40;

#[derive(Debug, Clone)]
pub struct Enrollment {
    pub class_id: String,
    pub student_id: String,
    pub status: i32,
    pub joined_at: Option<String>,
}

impl Enrollment {
    fn from_item(item: &Item) -> Result<Self> {
        let pk = item.req_s(schema::PK)?;
        let sk = item.req_s(schema::SK)?;
        Ok(Self {
            class_id: keys::strip(keys::CLASS_PREFIX, pk).to_string(),
            student_id: keys::strip(keys::STUDENT_PREFIX, sk).to_string(),
            status: item
                .opt_i32(schema::STATUS)?
                .unwrap_or(EnrollmentStatus::Enrolled.code()),
            joined_at: item.opt_s(schema::JOINED_AT)?.map(str::to_string),
        })
    }
}

pub struct EnrollmentRepository {
    store: Arc<dyn TableStore>,
    notifications: Arc<NotificationRepository>,
    audit: AuditLog,
}

impl EnrollmentRepository {
    pub fn new(store: Arc<dyn TableStore>, notifications: Arc<NotificationRepository>) -> Self {
        let audit = AuditLog::new(store.clone());
        Self {
            store,
            notifications,
            audit,
        }
    }

    /// Student self-enrollment. The precondition order is load-bearing:
    /// class exists and is active, capacity precheck, student profile
    /// exists, no duplicate enrollment, prerequisites, passcode. The real
    /// capacity guard is the conditional counter update at the end, so two
    /// racing students cannot both take the last seat; the enrollment item
    /// is written only after the seat is held.
    pub async fn enroll_self(
        &self,
        class_id: &str,
        student_id: &str,
        passcode: Option<&str>,
    ) -> Result<Enrollment> {
        let class = self.active_class(class_id).await?;
        if i64::from(class.student_count) >= MAX_CLASS_SIZE {
            return Err(DomainError::ClassFull {
                class_id: class.id.clone(),
                capacity: MAX_CLASS_SIZE as u32,
            });
        }

        let raw_student = keys::strip(keys::USER_PREFIX, student_id);
        if self
            .store
            .get(&keys::user_profile(raw_student))
            .await?
            .is_none()
        {
            return Err(DomainError::not_found("user", raw_student));
        }

        self.reject_duplicate(class_id, student_id).await?;

        if let Some(subject_id) = &class.subject_id {
            self.check_prerequisites(student_id, subject_id).await?;
        }

        // plaintext comparison against the stored passcode
        if let Some(required) = class.password.as_deref().filter(|p| !p.is_empty()) {
            if passcode != Some(required) {
                return Err(DomainError::Forbidden("incorrect class passcode".into()));
            }
        }

        self.take_seat(&class, class_id).await?;
        let enrollment = self.put_enrollment(class_id, student_id).await?;
        self.notifications
            .notify_user(
                raw_student,
                "Enrolled in class",
                &format!("You have joined class {}", class.name),
                "CLASS_ENROLLMENT",
            )
            .await?;

        info!(class_id = %enrollment.class_id, student_id = %enrollment.student_id, "Student enrolled");
        Ok(enrollment)
    }

    /// Admin enrollment. Skips passcode and prerequisites, verifies the
    /// student profile, notifies the student and records the action. Here
    /// the enrollment is written before the counter, the opposite order of
    /// self-enrollment.
    pub async fn enroll_by_admin(&self, class_id: &str, student_id: &str) -> Result<Enrollment> {
        let class = self.active_class(class_id).await?;
        if i64::from(class.student_count) >= MAX_CLASS_SIZE {
            return Err(DomainError::ClassFull {
                class_id: class.id.clone(),
                capacity: MAX_CLASS_SIZE as u32,
            });
        }

        let raw_student = keys::strip(keys::USER_PREFIX, student_id);
        if self
            .store
            .get(&keys::user_profile(raw_student))
            .await?
            .is_none()
        {
            return Err(DomainError::not_found("user", raw_student));
        }

        self.reject_duplicate(class_id, student_id).await?;
        let enrollment = self.put_enrollment(class_id, student_id).await?;
        self.store
            .add_to_counter(&keys::class(class_id), schema::STUDENT_COUNT, 1, None)
            .await?;

        self.notifications
            .notify_user(
                raw_student,
                "Enrolled in class",
                &format!("You have been enrolled in class {}", class.name),
                "CLASS_ENROLLMENT",
            )
            .await?;
        self.audit
            .record(
                Some("ADMIN"),
                "ENROLL_STUDENT",
                &format!("Enrolled student {raw_student} into class {}", class.name),
                Some(class_id),
            )
            .await;

        Ok(enrollment)
    }

    /// Remove an enrollment. The counter decrement is floored at zero and
    /// runs before the item delete; a crash in between overstates the
    /// count by one.
    pub async fn unenroll(&self, class_id: &str, student_id: &str) -> Result<()> {
        let key = keys::enrollment(class_id, student_id);
        if self.store.get(&key).await?.is_none() {
            return Err(DomainError::not_found(
                "enrollment",
                format!("{class_id}/{student_id}"),
            ));
        }

        let class_key = keys::class(class_id);
        if let Some(class_item) = self.store.get(&class_key).await? {
            let current = class_item.opt_i32(schema::STUDENT_COUNT)?.unwrap_or(0);
            if current > 0 {
                self.store
                    .add_to_counter(&class_key, schema::STUDENT_COUNT, -1, None)
                    .await?;
            } else {
                warn!(class_id = %class_id, "Student count already zero, skipping decrement");
            }
        }

        self.store.delete(&key).await?;
        Ok(())
    }

    /// Enrollments of one student, via the GSI1 mirror.
    pub async fn list_for_student(&self, student_id: &str) -> Result<Vec<Enrollment>> {
        let items = self
            .store
            .query(
                QuerySpec::gsi1(keys::user_pk(student_id))
                    .sort_prefix(keys::CLASS_PREFIX),
            )
            .await?;
        items.iter().map(Enrollment::from_item).collect()
    }

    /// Classes a student is enrolled in, resolved to class items. Missing
    /// class rows (deleted classes with surviving enrollments) are skipped.
    pub async fn list_classes_for_student(&self, student_id: &str) -> Result<Vec<Class>> {
        let enrollments = self.list_for_student(student_id).await?;
        let mut classes = Vec::with_capacity(enrollments.len());
        for enrollment in &enrollments {
            if let Some(item) = self.store.get(&keys::class(&enrollment.class_id)).await? {
                classes.push(Class::from_item(&item)?);
            }
        }
        Ok(classes)
    }

    /// Roster of one class.
    pub async fn list_students(&self, class_id: &str) -> Result<Vec<Enrollment>> {
        let items = self
            .store
            .query(
                QuerySpec::partition(keys::class_pk(class_id))
                    .sort_prefix(keys::STUDENT_PREFIX),
            )
            .await?;
        items.iter().map(Enrollment::from_item).collect()
    }

    /// Error unless the student holds an active enrollment in the class.
    pub async fn ensure_enrolled(&self, class_id: &str, student_id: &str) -> Result<()> {
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

    async fn active_class(&self, class_id: &str) -> Result<Class> {
        let item = self
            .store
            .get(&keys::class(class_id))
            .await?
            .ok_or_else(|| DomainError::not_found("class", class_id))?;
        let class = Class::from_item(&item)?;
        if !class.is_active() {
            return Err(DomainError::Validation(
                "class is not open for enrollment".into(),
            ));
        }
        Ok(class)
    }

    async fn reject_duplicate(&self, class_id: &str, student_id: &str) -> Result<()> {
        if self
            .store
            .get(&keys::enrollment(class_id, student_id))
            .await?
            .is_some()
        {
            return Err(DomainError::AlreadyEnrolled {
                class_id: keys::strip(keys::CLASS_PREFIX, class_id).to_string(),
                student_id: keys::strip(keys::USER_PREFIX, student_id).to_string(),
            });
        }
        Ok(())
    }

    /// Every prerequisite subject must appear among the student's completed
    /// records (GSI1 user partition, `SUBJECT#` rows with passing status).
    async fn check_prerequisites(&self, student_id: &str, subject_id: &str) -> Result<()> {
        let subject_item = self
            .store
            .get(&keys::subject(keys::strip(keys::SUBJECT_PREFIX, subject_id)))
            .await?;
        let Some(subject_item) = subject_item else {
            // class points at a subject that no longer exists; nothing to check
            return Ok(());
        };
        let subject = Subject::from_item(&subject_item)?;
        let prerequisites = subject.prerequisite_codes();
        if prerequisites.is_empty() {
            return Ok(());
        }

        let records = self
            .store
            .query(QuerySpec::gsi1(keys::user_pk(student_id)))
            .await?;
        let mut completed: Vec<String> = Vec::new();
        for record in &records {
            let sk = record.req_s(schema::SK)?;
            if !sk.starts_with(keys::SUBJECT_PREFIX) {
                continue;
            }
            if record.opt_i32(schema::STATUS)?.unwrap_or(0) != STATUS_ACTIVE {
                continue;
            }
            let code = record
                .opt_s(schema::SUBJECT_ID)?
                .map(str::to_string)
                .unwrap_or_else(|| sk.to_string());
            completed.push(keys::normalize(keys::SUBJECT_PREFIX, &code));
        }

        let missing: Vec<String> = prerequisites
            .iter()
            .map(|p| keys::normalize(keys::SUBJECT_PREFIX, p))
            .filter(|p| !completed.contains(p))
            .map(|p| keys::strip(keys::SUBJECT_PREFIX, &p).to_string())
            .collect();
        if !missing.is_empty() {
            return Err(DomainError::Forbidden(format!(
                "missing prerequisites: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    async fn take_seat(&self, class: &Class, class_id: &str) -> Result<()> {
        if i64::from(class.student_count) >= MAX_CLASS_SIZE {
            return Err(DomainError::ClassFull {
                class_id: class.id.clone(),
                capacity: MAX_CLASS_SIZE as u32,
            });
        }
        let condition = UpdateCondition::NumberBelow {
            attribute: schema::STUDENT_COUNT.to_string(),
            limit: MAX_CLASS_SIZE,
        };
        match self
            .store
            .add_to_counter(&keys::class(class_id), schema::STUDENT_COUNT, 1, Some(condition))
            .await
        {
            Ok(()) => Ok(()),
            Err(StorageError::ConditionFailed(_)) => Err(DomainError::ClassFull {
                class_id: class.id.clone(),
                capacity: MAX_CLASS_SIZE as u32,
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn put_enrollment(&self, class_id: &str, student_id: &str) -> Result<Enrollment> {
        let key = keys::enrollment(class_id, student_id);
        let raw_student = keys::strip(keys::USER_PREFIX, student_id);
        let raw_class = keys::strip(keys::CLASS_PREFIX, class_id);

        let mut item = crate::storage::item::keyed(&key);
        item.set_s(schema::GSI1_PK, keys::user_pk(student_id));
        item.set_s(schema::GSI1_SK, keys::class_pk(class_id));
        item.set_s(schema::STUDENT_ID, raw_student);
        item.set_s(schema::CLASS_ID, raw_class);
        item.set_i32(schema::STATUS, EnrollmentStatus::Enrolled.code());
        item.set_s(schema::JOINED_AT, super::now());

        let enrollment = Enrollment::from_item(&item)?;
        self.store.put(item).await?;
        Ok(enrollment)
    }
}
