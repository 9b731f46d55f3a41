//! In-memory TableStore for tests.
//!
//! Mirrors the service semantics the repositories rely on: items ordered by
//! sort key inside a partition, GSI1 as a projection keyed by the
//! `GSI1PK`/`GSI1SK` attributes, filters applied after the key condition,
//! and the conditional counter update. Not a full emulation beyond that.

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use tokio::sync::RwLock;

use super::{
    item, Filter, Item, ItemExt, QuerySpec, Result, StorageError, TableStore, UpdateCondition,
};
use crate::keys::ItemKey;
use crate::schema;

/// In-memory table keyed by `(PK, SK)`.
#[derive(Default)]
pub struct MemoryTableStore {
    rows: RwLock<BTreeMap<(String, String), Item>>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items, for test assertions.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

fn passes(filter: &Option<Filter>, item: &Item) -> bool {
    filter.as_ref().map(|f| f.matches(item)).unwrap_or(true)
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn get(&self, key: &ItemKey) -> Result<Option<Item>> {
        let rows = self.rows.read().await;
        Ok(rows.get(&(key.pk.clone(), key.sk.clone())).cloned())
    }

    async fn put(&self, item: Item) -> Result<()> {
        let pk = item.req_s(schema::PK)?.to_string();
        let sk = item.req_s(schema::SK)?.to_string();
        self.rows.write().await.insert((pk, sk), item);
        Ok(())
    }

    async fn delete(&self, key: &ItemKey) -> Result<()> {
        self.rows
            .write()
            .await
            .remove(&(key.pk.clone(), key.sk.clone()));
        Ok(())
    }

    async fn query(&self, spec: QuerySpec) -> Result<Vec<Item>> {
        let rows = self.rows.read().await;

        let mut items: Vec<Item> = if spec.index {
            // GSI1 projection: match on the index attributes, order by GSI1SK.
            let mut matched: Vec<Item> = rows
                .values()
                .filter(|item| {
                    item.opt_s(schema::GSI1_PK).ok().flatten() == Some(spec.partition.as_str())
                })
                .filter(|item| match &spec.sort_prefix {
                    Some(prefix) => item
                        .opt_s(schema::GSI1_SK)
                        .ok()
                        .flatten()
                        .map(|sk| sk.starts_with(prefix.as_str()))
                        .unwrap_or(false),
                    None => true,
                })
                .cloned()
                .collect();
            matched.sort_by_key(|item| {
                item.opt_s(schema::GSI1_SK)
                    .ok()
                    .flatten()
                    .unwrap_or_default()
                    .to_string()
            });
            matched
        } else {
            rows.range((spec.partition.clone(), String::new())..)
                .take_while(|((pk, _), _)| *pk == spec.partition)
                .filter(|((_, sk), _)| match &spec.sort_prefix {
                    Some(prefix) => sk.starts_with(prefix.as_str()),
                    None => true,
                })
                .map(|(_, item)| item.clone())
                .collect()
        };

        if !spec.scan_forward {
            items.reverse();
        }

        items.retain(|item| passes(&spec.filter, item));
        Ok(items)
    }

    async fn scan(&self, filter: Filter) -> Result<Vec<Item>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect())
    }

    async fn add_to_counter(
        &self,
        key: &ItemKey,
        attribute: &str,
        delta: i64,
        condition: Option<UpdateCondition>,
    ) -> Result<()> {
        let mut rows = self.rows.write().await;
        let entry = rows
            .entry((key.pk.clone(), key.sk.clone()))
            .or_insert_with(|| item::keyed(key));

        if let Some(UpdateCondition::NumberBelow {
            attribute: cond_attr,
            limit,
        }) = condition
        {
            let current = entry.opt_i64(&cond_attr)?;
            if let Some(value) = current {
                if value >= limit {
                    return Err(StorageError::ConditionFailed(format!(
                        "counter {attribute} at {}/{}",
                        key.pk, key.sk
                    )));
                }
            }
        }

        let current = entry.opt_i64(attribute)?.unwrap_or(0);
        entry.insert(
            attribute.to_string(),
            AttributeValue::N((current + delta).to_string()),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::item::keyed;

    fn row(pk: &str, sk: &str) -> Item {
        keyed(&ItemKey::new(pk, sk))
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryTableStore::new();
        let key = ItemKey::new("USER#A", "PROFILE");
        let mut item = keyed(&key);
        item.set_s(schema::NAME, "Alice");

        store.put(item).await.unwrap();
        let fetched = store.get(&key).await.unwrap().unwrap();
        assert_eq!(fetched.req_s(schema::NAME).unwrap(), "Alice");

        store.delete(&key).await.unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
        // deleting again is fine
        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_query_sort_prefix_and_order() {
        let store = MemoryTableStore::new();
        for sk in ["POST#1", "POST#2", "STUDENT#S1", "INFO"] {
            store.put(row("CLASS#C1", sk)).await.unwrap();
        }
        store.put(row("CLASS#C2", "POST#9")).await.unwrap();

        let posts = store
            .query(QuerySpec::partition("CLASS#C1").sort_prefix("POST#"))
            .await
            .unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].req_s(schema::SK).unwrap(), "POST#1");

        let newest = store
            .query(
                QuerySpec::partition("CLASS#C1")
                    .sort_prefix("POST#")
                    .newest_first(),
            )
            .await
            .unwrap();
        assert_eq!(newest[0].req_s(schema::SK).unwrap(), "POST#2");
    }

    #[tokio::test]
    async fn test_gsi1_query() {
        let store = MemoryTableStore::new();
        let mut a = row("SUBJECT#SE100", "INFO");
        a.set_s(schema::GSI1_PK, "TYPE#SUBJECT");
        a.set_s(schema::GSI1_SK, "NAME#algorithms");
        let mut b = row("SUBJECT#SE200", "INFO");
        b.set_s(schema::GSI1_PK, "TYPE#SUBJECT");
        b.set_s(schema::GSI1_SK, "NAME#databases");
        let mut c = row("CLASS#C1", "INFO");
        c.set_s(schema::GSI1_PK, "TYPE#CLASS");
        c.set_s(schema::GSI1_SK, "NAME#databases lab");
        for item in [b, c, a] {
            store.put(item).await.unwrap();
        }

        let subjects = store
            .query(QuerySpec::gsi1("TYPE#SUBJECT"))
            .await
            .unwrap();
        assert_eq!(subjects.len(), 2);
        // ordered by GSI1SK
        assert_eq!(subjects[0].req_s(schema::GSI1_SK).unwrap(), "NAME#algorithms");

        let hits = store
            .query(QuerySpec::gsi1("TYPE#SUBJECT").sort_prefix("NAME#data"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].req_s(schema::PK).unwrap(), "SUBJECT#SE200");
    }

    #[tokio::test]
    async fn test_filter_reduces_results() {
        let store = MemoryTableStore::new();
        let mut active = row("CLASS#C1", "STUDENT#S1");
        active.set_i32(schema::STATUS, 1);
        let mut dropped = row("CLASS#C1", "STUDENT#S2");
        dropped.set_i32(schema::STATUS, 0);
        store.put(active).await.unwrap();
        store.put(dropped).await.unwrap();

        let enrolled = store
            .query(
                QuerySpec::partition("CLASS#C1")
                    .sort_prefix("STUDENT#")
                    .filter(Filter::eq_n(schema::STATUS, 1)),
            )
            .await
            .unwrap();
        assert_eq!(enrolled.len(), 1);
        assert_eq!(enrolled[0].req_s(schema::SK).unwrap(), "STUDENT#S1");
    }

    #[tokio::test]
    async fn test_counter_creates_and_caps() {
        let store = MemoryTableStore::new();
        let key = ItemKey::new("CLASS#C1", "INFO");
        let cap = UpdateCondition::NumberBelow {
            attribute: schema::STUDENT_COUNT.to_string(),
            limit: 2,
        };

        // absent attribute counts as zero
        store
            .add_to_counter(&key, schema::STUDENT_COUNT, 1, Some(cap.clone()))
            .await
            .unwrap();
        store
            .add_to_counter(&key, schema::STUDENT_COUNT, 1, Some(cap.clone()))
            .await
            .unwrap();

        let err = store
            .add_to_counter(&key, schema::STUDENT_COUNT, 1, Some(cap))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ConditionFailed(_)));

        let item = store.get(&key).await.unwrap().unwrap();
        assert_eq!(item.opt_i64(schema::STUDENT_COUNT).unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_counter_can_go_negative() {
        let store = MemoryTableStore::new();
        let key = ItemKey::new("POST#P1", "INFO");
        store
            .add_to_counter(&key, schema::LIKE_COUNT, -1, None)
            .await
            .unwrap();
        let item = store.get(&key).await.unwrap().unwrap();
        assert_eq!(item.opt_i64(schema::LIKE_COUNT).unwrap(), Some(-1));
    }

    #[tokio::test]
    async fn test_scan_with_filter() {
        let store = MemoryTableStore::new();
        let mut user = row("USER#S1", "PROFILE");
        user.set_s(schema::EMAIL, "s1@school.edu");
        store.put(user).await.unwrap();
        store.put(row("USER#S2", "PROFILE")).await.unwrap();

        let hits = store
            .scan(Filter::eq_s(schema::EMAIL, "s1@school.edu"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }
}
