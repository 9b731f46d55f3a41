//! Subject catalog.

use std::sync::Arc;

use tracing::info;

use crate::domain::SubjectFilter;
use crate::error::{DomainError, Result};
use crate::keys;
use crate::schema;
use crate::storage::{Filter, Item, ItemExt, QuerySpec, TableStore};

use super::{AuditLog, STATUS_ACTIVE, STATUS_INACTIVE};

/// A subject in the catalog. `code` is the natural key (`SUBJECT#<code>`).
#[derive(Debug, Clone)]
pub struct Subject {
    pub code: String,
    pub name: String,
    pub credits: i32,
    pub department: Option<String>,
    /// Comma-separated codes of subjects that must be completed first.
    pub prerequisites: Option<String>,
    pub status: i32,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Subject {
    pub(crate) fn from_item(item: &Item) -> Result<Self> {
        Ok(Self {
            code: item.opt_s(schema::CODE_SUBJECT)?.unwrap_or_default().to_string(),
            name: item.opt_s(schema::NAME)?.unwrap_or_default().to_string(),
            credits: item.opt_i32(schema::CREDITS)?.unwrap_or(0),
            department: item.opt_s(schema::DEPARTMENT)?.map(str::to_string),
            prerequisites: item.opt_s(schema::PREREQUISITES)?.map(str::to_string),
            status: item.opt_i32(schema::STATUS)?.unwrap_or(STATUS_ACTIVE),
            created_at: item.opt_s(schema::CREATED_AT)?.map(str::to_string),
            updated_at: item.opt_s(schema::UPDATED_AT)?.map(str::to_string),
        })
    }

    /// Prerequisite codes, trimmed, without the `SUBJECT#` prefix applied.
    pub fn prerequisite_codes(&self) -> Vec<String> {
        self.prerequisites
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Fields a subject update may change. `None` leaves the stored value.
#[derive(Debug, Clone, Default)]
pub struct SubjectUpdate {
    pub name: Option<String>,
    pub credits: Option<i32>,
    pub department: Option<String>,
    pub prerequisites: Option<String>,
    pub status: Option<i32>,
}

/// What a new subject needs.
#[derive(Debug, Clone)]
pub struct NewSubject {
    pub code: String,
    pub name: String,
    pub credits: i32,
    pub department: Option<String>,
    pub prerequisites: Option<String>,
    pub status: Option<i32>,
}

pub struct SubjectRepository {
    store: Arc<dyn TableStore>,
    audit: AuditLog,
}

impl SubjectRepository {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        let audit = AuditLog::new(store.clone());
        Self { store, audit }
    }

    /// Create a subject. The code is uppercased and must be unused.
    pub async fn create(&self, new: NewSubject) -> Result<Subject> {
        if new.code.trim().is_empty() {
            return Err(DomainError::Validation("subject code is required".into()));
        }
        if new.name.trim().is_empty() {
            return Err(DomainError::Validation("subject name is required".into()));
        }
        if new.credits <= 0 {
            return Err(DomainError::Validation(
                "credits must be greater than zero".into(),
            ));
        }

        let code = new.code.trim().to_uppercase();
        let key = keys::subject(&code);
        if self.store.get(&key).await?.is_some() {
            return Err(DomainError::Conflict(format!(
                "subject {code} already exists"
            )));
        }

        let now = super::now();
        let mut item = crate::storage::item::keyed(&key);
        item.set_s(schema::GSI1_PK, keys::TYPE_SUBJECT);
        item.set_s(schema::GSI1_SK, keys::name_sort_key(&new.name));
        item.set_s(schema::ID, key.pk.clone());
        item.set_s(schema::CODE_SUBJECT, code.clone());
        item.set_s(schema::NAME, new.name.clone());
        item.set_i32(schema::CREDITS, new.credits);
        item.set_opt_s(schema::DEPARTMENT, new.department);
        item.set_opt_s(schema::PREREQUISITES, new.prerequisites);
        item.set_i32(schema::STATUS, new.status.unwrap_or(STATUS_ACTIVE));
        item.set_s(schema::CREATED_AT, now.clone());
        item.set_s(schema::UPDATED_AT, now);

        let subject = Subject::from_item(&item)?;
        self.store.put(item).await?;

        info!(code = %code, "Subject created");
        self.audit
            .record(
                Some("ADMIN"),
                "CREATE_SUBJECT",
                &format!("Created subject {code} - {}", new.name),
                None,
            )
            .await;

        Ok(subject)
    }

    pub async fn get(&self, code: &str) -> Result<Subject> {
        let item = self
            .store
            .get(&keys::subject(code))
            .await?
            .ok_or_else(|| DomainError::not_found("subject", code))?;
        Subject::from_item(&item)
    }

    /// Partial update; a rename also refreshes the search sort key.
    pub async fn update(&self, code: &str, update: SubjectUpdate) -> Result<Subject> {
        let key = keys::subject(code);
        let mut item = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| DomainError::not_found("subject", code))?;

        if let Some(name) = &update.name {
            if !name.is_empty() {
                item.set_s(schema::NAME, name.clone());
                item.set_s(schema::GSI1_SK, keys::name_sort_key(name));
            }
        }
        if let Some(credits) = update.credits {
            item.set_i32(schema::CREDITS, credits);
        }
        if let Some(department) = update.department {
            item.set_s(schema::DEPARTMENT, department);
        }
        if let Some(prerequisites) = update.prerequisites {
            item.set_s(schema::PREREQUISITES, prerequisites);
        }
        if let Some(status) = update.status {
            item.set_i32(schema::STATUS, status);
        }
        item.set_s(schema::UPDATED_AT, super::now());

        let subject = Subject::from_item(&item)?;
        self.store.put(item).await?;
        Ok(subject)
    }

    /// Soft delete: the item stays, status flips to inactive.
    pub async fn soft_delete(&self, code: &str) -> Result<()> {
        let key = keys::subject(code);
        let mut item = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| DomainError::not_found("subject", code))?;
        item.set_i32(schema::STATUS, STATUS_INACTIVE);
        item.set_s(schema::UPDATED_AT, super::now());
        self.store.put(item).await?;
        Ok(())
    }

    /// Name-prefix search over the catalog with post-query filters.
    /// The keyword matches the lowercased start of the name only.
    pub async fn search(&self, keyword: &str, filter: &SubjectFilter) -> Result<Vec<Subject>> {
        let mut spec = QuerySpec::gsi1(keys::TYPE_SUBJECT);
        if !keyword.is_empty() {
            spec = spec.sort_prefix(keys::name_sort_key(keyword));
        }

        let mut post_filter: Option<Filter> = None;
        if let Some(department) = &filter.department {
            post_filter = Some(Filter::eq_s(schema::DEPARTMENT, department.clone()));
        }
        if let Some(status) = filter.status {
            let f = Filter::eq_n(schema::STATUS, status as i64);
            post_filter = Some(match post_filter {
                Some(existing) => existing.and(f),
                None => f,
            });
        }
        if let Some(f) = post_filter {
            spec = spec.filter(f);
        }

        let items = self.store.query(spec).await?;
        items.iter().map(Subject::from_item).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryTableStore;

    fn repo() -> SubjectRepository {
        SubjectRepository::new(Arc::new(MemoryTableStore::new()))
    }

    fn new_subject(code: &str, name: &str) -> NewSubject {
        NewSubject {
            code: code.to_string(),
            name: name.to_string(),
            credits: 3,
            department: Some("SE".to_string()),
            prerequisites: None,
            status: None,
        }
    }

    #[tokio::test]
    async fn test_create_uppercases_and_rejects_duplicates() {
        let repo = repo();
        let created = repo.create(new_subject("se101", "Intro")).await.unwrap();
        assert_eq!(created.code, "SE101");

        let err = repo.create(new_subject("SE101", "Intro")).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_create_validates_fields() {
        let repo = repo();
        let mut bad = new_subject("SE101", "Intro");
        bad.credits = 0;
        assert!(matches!(
            repo.create(bad).await.unwrap_err(),
            DomainError::Validation(_)
        ));
        assert!(repo.create(new_subject(" ", "Intro")).await.is_err());
        assert!(repo.create(new_subject("SE101", "")).await.is_err());
    }

    #[tokio::test]
    async fn test_rename_refreshes_search_key() {
        let repo = repo();
        repo.create(new_subject("SE101", "Intro")).await.unwrap();
        repo.update(
            "SE101",
            SubjectUpdate {
                name: Some("Advanced Intro".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let hits = repo
            .search("advanced", &SubjectFilter::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        let stale = repo.search("intro", &SubjectFilter::default()).await.unwrap();
        assert!(stale.is_empty());
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_item() {
        let repo = repo();
        repo.create(new_subject("SE101", "Intro")).await.unwrap();
        repo.soft_delete("SE101").await.unwrap();

        let subject = repo.get("SE101").await.unwrap();
        assert_eq!(subject.status, STATUS_INACTIVE);
    }

    #[tokio::test]
    async fn test_search_filters_by_status() {
        let repo = repo();
        repo.create(new_subject("SE101", "Databases")).await.unwrap();
        repo.create(new_subject("SE102", "Data Mining")).await.unwrap();
        repo.soft_delete("SE102").await.unwrap();

        let active_only = SubjectFilter {
            status: Some(STATUS_ACTIVE),
            ..Default::default()
        };
        let hits = repo.search("data", &active_only).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].code, "SE101");
    }

    #[test]
    fn test_prerequisite_codes_parse() {
        let subject = Subject {
            code: "SE301".into(),
            name: "Capstone".into(),
            credits: 5,
            department: None,
            prerequisites: Some("SE101, SE201 ,".into()),
            status: STATUS_ACTIVE,
            created_at: None,
            updated_at: None,
        };
        assert_eq!(subject.prerequisite_codes(), vec!["SE101", "SE201"]);
    }
}
