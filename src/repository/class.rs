//! Class sections.
//!
//! A class is one offering of a subject (`CLASS#<id>`/`INFO`), carrying the
//! teacher assignment, the enrollment counter, and the optional plaintext
//! join passcode. The passcode is stored and compared as-is; hashing it
//! would break compatibility with existing rows.

use std::sync::Arc;

use tracing::{info, warn};

use crate::collab::EventBus;
use crate::domain::ClassFilter;
use crate::error::{DomainError, Result};
use crate::keys;
use crate::schema;
use crate::storage::{Filter, Item, ItemExt, QuerySpec, TableStore};

use super::{AuditLog, NotificationRepository, STATUS_ACTIVE, STATUS_INACTIVE};

#[derive(Debug, Clone)]
pub struct Class {
    pub id: String,
    pub name: String,
    pub subject_id: Option<String>,
    pub teacher_id: Option<String>,
    pub semester: Option<String>,
    pub academic_year: Option<String>,
    pub room: Option<String>,
    pub password: Option<String>,
    pub status: i32,
    pub student_count: i32,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Class {
    pub(crate) fn from_item(item: &Item) -> Result<Self> {
        Ok(Self {
            id: item.opt_s(schema::ID)?.unwrap_or_default().to_string(),
            name: item.opt_s(schema::NAME)?.unwrap_or_default().to_string(),
            subject_id: item.opt_s(schema::SUBJECT_ID)?.map(str::to_string),
            teacher_id: item.opt_s(schema::TEACHER_ID)?.map(str::to_string),
            semester: item.opt_s(schema::SEMESTER)?.map(str::to_string),
            academic_year: item.opt_s(schema::ACADEMIC_YEAR)?.map(str::to_string),
            room: item.opt_s(schema::ROOM)?.map(str::to_string),
            password: item.opt_s(schema::PASSWORD)?.map(str::to_string),
            status: item.opt_i32(schema::STATUS)?.unwrap_or(STATUS_ACTIVE),
            student_count: item.opt_i32(schema::STUDENT_COUNT)?.unwrap_or(0),
            created_at: item.opt_s(schema::CREATED_AT)?.map(str::to_string),
            updated_at: item.opt_s(schema::UPDATED_AT)?.map(str::to_string),
        })
    }

    pub fn is_active(&self) -> bool {
        self.status != STATUS_INACTIVE
    }
}

#[derive(Debug, Clone)]
pub struct NewClass {
    pub name: String,
    pub subject_id: Option<String>,
    pub teacher_id: Option<String>,
    pub semester: Option<String>,
    pub academic_year: Option<String>,
    pub room: Option<String>,
    pub password: Option<String>,
    pub status: Option<i32>,
}

/// Fields a class update may change. `None` leaves the stored value.
#[derive(Debug, Clone, Default)]
pub struct ClassUpdate {
    pub name: Option<String>,
    pub teacher_id: Option<String>,
    pub password: Option<String>,
    pub semester: Option<String>,
    pub academic_year: Option<String>,
    pub room: Option<String>,
    pub status: Option<i32>,
}

/// Assert that `teacher_code` owns the class, returning the class item.
/// The stored teacher id may or may not carry the `USER#` prefix and may
/// have stray whitespace; comparison is prefix-stripped, trimmed, and
/// case-insensitive.
pub(crate) async fn assert_class_owner(
    store: &dyn TableStore,
    class_id: &str,
    teacher_code: &str,
) -> Result<Item> {
    let item = store
        .get(&keys::class(class_id))
        .await?
        .ok_or_else(|| DomainError::not_found("class", class_id))?;

    let stored = item
        .opt_s(schema::TEACHER_ID)?
        .ok_or_else(|| DomainError::Forbidden("class has no assigned teacher".into()))?;

    let clean = keys::strip(keys::USER_PREFIX, stored.trim()).trim();
    if !clean.eq_ignore_ascii_case(teacher_code.trim()) {
        warn!(class_id = %class_id, teacher = %teacher_code, owner = %stored, "Ownership check failed");
        return Err(DomainError::Forbidden(
            "class belongs to another teacher".into(),
        ));
    }
    Ok(item)
}

pub struct ClassRepository {
    store: Arc<dyn TableStore>,
    notifications: Arc<NotificationRepository>,
    events: Option<Arc<dyn EventBus>>,
    audit: AuditLog,
}

impl ClassRepository {
    pub fn new(
        store: Arc<dyn TableStore>,
        notifications: Arc<NotificationRepository>,
        events: Option<Arc<dyn EventBus>>,
    ) -> Self {
        let audit = AuditLog::new(store.clone());
        Self {
            store,
            notifications,
            events,
            audit,
        }
    }

    /// Create a class with a generated 8-character id. The creation event
    /// is published best-effort: a bus failure is logged, the class stands.
    pub async fn create(&self, new: NewClass) -> Result<Class> {
        if new.name.trim().is_empty() {
            return Err(DomainError::Validation("class name is required".into()));
        }

        let class_id = super::short_code();
        let now = super::now();
        let key = keys::class(&class_id);

        let mut item = crate::storage::item::keyed(&key);
        item.set_s(schema::GSI1_PK, keys::TYPE_CLASS);
        item.set_s(schema::GSI1_SK, keys::name_sort_key(&new.name));
        item.set_s(schema::ID, class_id.clone());
        item.set_s(schema::CLASS_ID, class_id.clone());
        item.set_s(schema::NAME, new.name);
        item.set_opt_s(schema::PASSWORD, new.password);
        item.set_opt_s(
            schema::SUBJECT_ID,
            new.subject_id
                .map(|s| keys::normalize(keys::SUBJECT_PREFIX, &s)),
        );
        item.set_opt_s(schema::SEMESTER, new.semester);
        item.set_opt_s(schema::ACADEMIC_YEAR, new.academic_year);
        item.set_opt_s(schema::ROOM, new.room);
        item.set_opt_s(
            schema::TEACHER_ID,
            new.teacher_id.map(|t| keys::normalize(keys::USER_PREFIX, &t)),
        );
        item.set_i32(schema::STATUS, new.status.unwrap_or(STATUS_ACTIVE));
        item.set_s(schema::CREATED_AT, now.clone());
        item.set_s(schema::UPDATED_AT, now);

        let class = Class::from_item(&item)?;
        self.store.put(item).await?;
        info!(class_id = %class_id, "Class created");

        if class.teacher_id.is_some() {
            if let Some(bus) = &self.events {
                let payload = serde_json::json!({
                    "classId": class.id,
                    "name": class.name,
                    "teacherId": class.teacher_id,
                    "subjectId": class.subject_id,
                });
                if let Err(err) = bus.publish("ClassCreated", payload).await {
                    warn!(class_id = %class_id, error = %err, "Event publish failed, class stands");
                }
            }
        }

        Ok(class)
    }

    pub async fn get(&self, class_id: &str) -> Result<Class> {
        let item = self
            .store
            .get(&keys::class(class_id))
            .await?
            .ok_or_else(|| DomainError::not_found("class", class_id))?;
        Class::from_item(&item)
    }

    /// Admin update. A teacher reassignment notifies both the new and the
    /// previous teacher before the class item is rewritten.
    pub async fn update(&self, class_id: &str, update: ClassUpdate) -> Result<Class> {
        let key = keys::class(class_id);
        let mut item = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| DomainError::not_found("class", class_id))?;

        let class_name = item.opt_s(schema::NAME)?.unwrap_or_default().to_string();
        let mut reassigned_to: Option<String> = None;

        if let Some(teacher_id) = &update.teacher_id {
            if !teacher_id.is_empty() {
                let new_teacher = keys::normalize(keys::USER_PREFIX, teacher_id);
                let old_teacher = item.opt_s(schema::TEACHER_ID)?.map(str::to_string);

                if old_teacher.as_deref() != Some(new_teacher.as_str()) {
                    self.notifications
                        .notify_user(
                            &new_teacher,
                            "New teaching assignment",
                            &format!("You have been assigned to teach class {class_name}"),
                            "CLASS_ASSIGNMENT",
                        )
                        .await?;
                    if let Some(old) = old_teacher.filter(|t| !t.is_empty()) {
                        self.notifications
                            .notify_user(
                                &old,
                                "Teaching assignment changed",
                                &format!("You are no longer assigned to class {class_name}"),
                                "CLASS_ASSIGNMENT",
                            )
                            .await?;
                    }
                    item.set_s(schema::TEACHER_ID, new_teacher);
                    reassigned_to = Some(teacher_id.clone());
                }
            }
        }

        self.apply_common_fields(&mut item, &update)?;
        item.set_s(schema::UPDATED_AT, super::now());

        let class = Class::from_item(&item)?;
        self.store.put(item).await?;

        let mut detail = format!("Updated class {}", class.name);
        if let Some(teacher) = reassigned_to {
            detail.push_str(&format!(". New teacher: {teacher}"));
        }
        self.audit
            .record(Some("ADMIN"), "UPDATE_CLASS", &detail, Some(class_id))
            .await;

        Ok(class)
    }

    /// Lecturer self-service update. Reassigning the teacher is an
    /// admin-only concern and is refused here.
    pub async fn update_by_lecturer(
        &self,
        class_id: &str,
        teacher_code: &str,
        update: ClassUpdate,
    ) -> Result<Class> {
        if update.teacher_id.is_some() {
            return Err(DomainError::Forbidden(
                "lecturers cannot reassign the class teacher".into(),
            ));
        }

        let mut item = assert_class_owner(self.store.as_ref(), class_id, teacher_code).await?;
        self.apply_common_fields(&mut item, &update)?;
        item.set_s(schema::UPDATED_AT, super::now());

        let class = Class::from_item(&item)?;
        self.store.put(item).await?;
        Ok(class)
    }

    fn apply_common_fields(&self, item: &mut Item, update: &ClassUpdate) -> Result<()> {
        if let Some(name) = &update.name {
            if !name.is_empty() {
                item.set_s(schema::NAME, name.clone());
                item.set_s(schema::GSI1_SK, keys::name_sort_key(name));
            }
        }
        if let Some(password) = &update.password {
            item.set_s(schema::PASSWORD, password.clone());
        }
        if let Some(semester) = &update.semester {
            item.set_s(schema::SEMESTER, semester.clone());
        }
        if let Some(year) = &update.academic_year {
            item.set_s(schema::ACADEMIC_YEAR, year.clone());
        }
        if let Some(room) = &update.room {
            item.set_s(schema::ROOM, room.clone());
        }
        if let Some(status) = update.status {
            item.set_i32(schema::STATUS, status);
        }
        Ok(())
    }

    /// Soft delete: enrollments and posts stay in place.
    pub async fn deactivate(&self, class_id: &str) -> Result<()> {
        let key = keys::class(class_id);
        let mut item = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| DomainError::not_found("class", class_id))?;

        let name = item.opt_s(schema::NAME)?.unwrap_or_default().to_string();
        item.set_i32(schema::STATUS, STATUS_INACTIVE);
        item.set_s(schema::UPDATED_AT, super::now());

        self.audit
            .record(
                Some("ADMIN"),
                "DEACTIVATE_CLASS",
                &format!("Deactivated class {name}"),
                Some(class_id),
            )
            .await;
        self.store.put(item).await?;
        Ok(())
    }

    /// Search classes by name fragment with typed post-filters. The
    /// keyword here is a `contains` match on the display name, applied
    /// after the `TYPE#CLASS` partition read.
    pub async fn search(&self, keyword: &str, filter: &ClassFilter) -> Result<Vec<Class>> {
        let mut parts: Vec<Filter> = Vec::new();

        if let Some(subject_id) = &filter.subject_id {
            if !subject_id.is_empty() {
                parts.push(Filter::eq_s(
                    schema::SUBJECT_ID,
                    keys::normalize(keys::SUBJECT_PREFIX, subject_id),
                ));
            }
        }
        if let Some(teacher_id) = &filter.teacher_id {
            if !teacher_id.is_empty() {
                parts.push(Filter::eq_s(
                    schema::TEACHER_ID,
                    keys::normalize(keys::USER_PREFIX, teacher_id),
                ));
            }
        }
        if let Some(status) = filter.status {
            parts.push(Filter::eq_n(schema::STATUS, status as i64));
        }
        if let Some(semester) = &filter.semester {
            if !semester.is_empty() {
                parts.push(Filter::eq_s(schema::SEMESTER, semester.clone()));
            }
        }
        if !keyword.is_empty() {
            parts.push(Filter::contains(schema::NAME, keyword.to_string()));
        }

        let mut spec = QuerySpec::gsi1(keys::TYPE_CLASS);
        if !parts.is_empty() {
            spec = spec.filter(Filter::And(parts));
        }

        let items = self.store.query(spec).await?;
        items.iter().map(Class::from_item).collect()
    }

    /// Classes assigned to one teacher.
    pub async fn list_for_teacher(&self, teacher_id: &str) -> Result<Vec<Class>> {
        let filter = ClassFilter {
            teacher_id: Some(teacher_id.to_string()),
            ..Default::default()
        };
        self.search("", &filter).await
    }
}
