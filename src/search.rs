//! Keyword search dispatcher.
//!
//! One strategy per searchable entity kind, all built on the same index
//! pattern: a GSI1 partition per type (`TYPE#SUBJECT`, `TYPE#CLASS`,
//! `ROLE#STUDENT`, `ROLE#LECTURER`) with `NAME#<lowercased name>` sort
//! keys. The keyword is lowercased and matched as a sort-key prefix, so
//! the search is case-insensitive but prefix-only: "data" finds
//! "Databases", "bases" does not.

use std::sync::Arc;
use tracing::debug;

use crate::error::{DomainError, Result};
use crate::keys;
use crate::schema;
use crate::storage::{Item, ItemExt, QuerySpec, TableStore};

/// One search result, shaped the same across entity kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub kind: &'static str,
    pub id: String,
    pub name: String,
}

trait SearchStrategy: Send + Sync {
    /// Entity kind this strategy answers for.
    fn kind(&self) -> &'static str;

    /// GSI1 partition holding the kind's name index.
    fn index_partition(&self) -> String;

    /// Identifier to surface for a hit.
    fn hit_id(&self, item: &Item) -> Result<String>;
}

struct SubjectSearch;

impl SubjectSearch {
    const KIND: &'static str = "subjects";
}

impl SearchStrategy for SubjectSearch {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn index_partition(&self) -> String {
        keys::TYPE_SUBJECT.to_string()
    }

    fn hit_id(&self, item: &Item) -> Result<String> {
        Ok(item
            .opt_s(schema::CODE_SUBJECT)?
            .map(str::to_string)
            .unwrap_or_else(|| pk_id(item)))
    }
}

struct ClassSearch;

impl SearchStrategy for ClassSearch {
    fn kind(&self) -> &'static str {
        "classes"
    }

    fn index_partition(&self) -> String {
        keys::TYPE_CLASS.to_string()
    }

    fn hit_id(&self, item: &Item) -> Result<String> {
        Ok(pk_id(item))
    }
}

struct RoleSearch {
    kind: &'static str,
    partition: &'static str,
}

impl SearchStrategy for RoleSearch {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn index_partition(&self) -> String {
        self.partition.to_string()
    }

    fn hit_id(&self, item: &Item) -> Result<String> {
        Ok(item
            .opt_s(schema::CODE_USER)?
            .map(str::to_string)
            .unwrap_or_else(|| pk_id(item)))
    }
}

fn pk_id(item: &Item) -> String {
    match item.req_s(schema::PK) {
        Ok(pk) => pk.split_once('#').map(|(_, id)| id).unwrap_or(pk).to_string(),
        Err(_) => String::new(),
    }
}

/// Routes a keyword search to the strategy for the requested kind.
pub struct SearchDispatcher {
    store: Arc<dyn TableStore>,
    strategies: Vec<Box<dyn SearchStrategy>>,
}

impl SearchDispatcher {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self {
            store,
            strategies: vec![
                Box::new(SubjectSearch),
                Box::new(ClassSearch),
                Box::new(RoleSearch {
                    kind: "students",
                    partition: "ROLE#STUDENT",
                }),
                Box::new(RoleSearch {
                    kind: "lecturers",
                    partition: "ROLE#LECTURER",
                }),
            ],
        }
    }

    /// Kinds this dispatcher can answer for.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Run a prefix search. An unknown kind is a validation error, not an
    /// empty result, so clients learn about typos.
    pub async fn search(&self, kind: &str, keyword: &str) -> Result<Vec<SearchHit>> {
        let wanted = kind.trim().to_lowercase();
        // common alias from older clients
        let wanted = if wanted == "teachers" { "lecturers".to_string() } else { wanted };

        let strategy = self
            .strategies
            .iter()
            .find(|s| s.kind() == wanted)
            .ok_or_else(|| {
                DomainError::Validation(format!(
                    "unsupported search type {kind}, expected one of: {}",
                    self.kinds().join(", ")
                ))
            })?;

        let mut spec = QuerySpec::gsi1(strategy.index_partition());
        if !keyword.trim().is_empty() {
            spec = spec.sort_prefix(keys::name_sort_key(keyword.trim()));
        }

        let items = self.store.query(spec).await?;
        debug!(kind = %strategy.kind(), keyword = %keyword, hits = items.len(), "Search completed");

        items
            .iter()
            .map(|item| {
                Ok(SearchHit {
                    kind: strategy.kind(),
                    id: strategy.hit_id(item)?,
                    name: item.opt_s(schema::NAME)?.unwrap_or_default().to_string(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryTableStore;

    async fn seeded() -> SearchDispatcher {
        let store = Arc::new(MemoryTableStore::new());

        let mut subject = crate::storage::item::keyed(&keys::subject("SE101"));
        subject.set_s(schema::GSI1_PK, keys::TYPE_SUBJECT);
        subject.set_s(schema::GSI1_SK, keys::name_sort_key("Databases"));
        subject.set_s(schema::CODE_SUBJECT, "SE101");
        subject.set_s(schema::NAME, "Databases");
        store.put(subject).await.unwrap();

        let mut class = crate::storage::item::keyed(&keys::class("C1"));
        class.set_s(schema::GSI1_PK, keys::TYPE_CLASS);
        class.set_s(schema::GSI1_SK, keys::name_sort_key("Databases Lab"));
        class.set_s(schema::NAME, "Databases Lab");
        store.put(class).await.unwrap();

        let mut student = crate::storage::item::keyed(&keys::user_profile("SE001"));
        student.set_s(schema::GSI1_PK, "ROLE#STUDENT");
        student.set_s(schema::GSI1_SK, keys::name_sort_key("Dana Tran"));
        student.set_s(schema::CODE_USER, "SE001");
        student.set_s(schema::NAME, "Dana Tran");
        store.put(student).await.unwrap();

        let mut lecturer = crate::storage::item::keyed(&keys::user_profile("GV01"));
        lecturer.set_s(schema::GSI1_PK, "ROLE#LECTURER");
        lecturer.set_s(schema::GSI1_SK, keys::name_sort_key("Binh Le"));
        lecturer.set_s(schema::CODE_USER, "GV01");
        lecturer.set_s(schema::NAME, "Binh Le");
        store.put(lecturer).await.unwrap();

        SearchDispatcher::new(store)
    }

    #[tokio::test]
    async fn test_prefix_match_is_case_insensitive() {
        let search = seeded().await;
        let hits = search.search("subjects", "DATA").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "SE101");

        // prefix only: an infix never matches
        assert!(search.search("subjects", "bases").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_each_kind_routes_to_its_partition() {
        let search = seeded().await;
        assert_eq!(search.search("classes", "data").await.unwrap().len(), 1);
        assert_eq!(search.search("students", "dana").await.unwrap().len(), 1);
        assert_eq!(search.search("lecturers", "binh").await.unwrap().len(), 1);
        // alias
        assert_eq!(search.search("teachers", "binh").await.unwrap().len(), 1);
        // a student query never sees lecturers
        assert!(search.search("students", "binh").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_kind_is_rejected() {
        let search = seeded().await;
        let err = search.search("rooms", "a").await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn test_empty_keyword_lists_partition() {
        let search = seeded().await;
        let hits = search.search("subjects", "").await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}
