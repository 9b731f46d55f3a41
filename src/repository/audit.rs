//! Audit trail.
//!
//! Log items live under their own partition (`LOG#<id>`/`INFO`) and are
//! listed through the GSI1 `TYPE#LOG` partition in timestamp order.
//! Writing a log entry must never break the workflow that triggered it, so
//! [`AuditLog::record`] swallows storage failures.

use std::sync::Arc;

use tracing::warn;

use crate::domain::LogFilter;
use crate::error::Result;
use crate::keys;
use crate::schema;
use crate::storage::{Filter, Item, ItemExt, QuerySpec, TableStore};

/// One recorded admin/system action.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: String,
    pub actor_id: String,
    pub action_type: String,
    pub details: Option<String>,
    pub target_class_id: Option<String>,
    pub created_at: Option<String>,
}

impl AuditEntry {
    fn from_item(item: &Item) -> Result<Self> {
        Ok(Self {
            id: item.opt_s(schema::ID)?.unwrap_or_default().to_string(),
            actor_id: item.opt_s(schema::ACTOR_ID)?.unwrap_or("UNKNOWN").to_string(),
            action_type: item
                .opt_s(schema::ACTION_TYPE)?
                .unwrap_or_default()
                .to_string(),
            details: item.opt_s(schema::LOG_DETAILS)?.map(str::to_string),
            target_class_id: item.opt_s(schema::TARGET_CLASS_ID)?.map(str::to_string),
            created_at: item.opt_s(schema::CREATED_AT)?.map(str::to_string),
        })
    }
}

pub struct AuditLog {
    store: Arc<dyn TableStore>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    /// Record an action. Actor ids get the `USER#` prefix unless they
    /// already carry it or are the literal `ADMIN`; a missing actor is
    /// recorded as `UNKNOWN`. Failures are logged and swallowed.
    pub async fn record(
        &self,
        actor_id: Option<&str>,
        action_type: &str,
        details: &str,
        target_class_id: Option<&str>,
    ) {
        let log_id = uuid::Uuid::new_v4().to_string();
        let timestamp = super::now();

        let actor = match actor_id {
            None => "UNKNOWN".to_string(),
            Some(a) if a == "ADMIN" => a.to_string(),
            Some(a) => keys::normalize(keys::USER_PREFIX, a),
        };

        let key = keys::audit_log(&log_id);
        let mut item = crate::storage::item::keyed(&key);
        item.set_s(schema::GSI1_PK, keys::TYPE_LOG);
        item.set_s(
            schema::GSI1_SK,
            format!("{}{timestamp}", keys::TIMESTAMP_PREFIX),
        );
        item.set_s(schema::ID, log_id);
        item.set_s(schema::ACTOR_ID, actor);
        item.set_s(schema::ACTION_TYPE, action_type);
        item.set_s(schema::LOG_DETAILS, details);
        if let Some(class_id) = target_class_id {
            item.set_s(
                schema::TARGET_CLASS_ID,
                keys::normalize(keys::CLASS_PREFIX, class_id),
            );
        }
        item.set_s(schema::CREATED_AT, timestamp);

        if let Err(err) = self.store.put(item).await {
            warn!(action = %action_type, error = %err, "Audit write failed, continuing");
        }
    }

    /// List log entries, newest first, with optional post-query filters.
    pub async fn list(&self, filter: &LogFilter) -> Result<Vec<AuditEntry>> {
        let mut post_filter: Option<Filter> = None;
        let mut add = |f: Filter| {
            post_filter = Some(match post_filter.take() {
                Some(existing) => existing.and(f),
                None => f,
            });
        };

        if let Some(actor) = &filter.actor_id {
            add(Filter::eq_s(
                schema::ACTOR_ID,
                keys::normalize(keys::USER_PREFIX, actor),
            ));
        }
        if let Some(class_id) = &filter.class_id {
            add(Filter::eq_s(
                schema::TARGET_CLASS_ID,
                keys::normalize(keys::CLASS_PREFIX, class_id),
            ));
        }
        if let Some(date) = &filter.date {
            add(Filter::contains(schema::GSI1_SK, date.clone()));
        }

        let mut spec = QuerySpec::gsi1(keys::TYPE_LOG).newest_first();
        if let Some(f) = post_filter {
            spec = spec.filter(f);
        }

        let items = self.store.query(spec).await?;
        items.iter().map(AuditEntry::from_item).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryTableStore;

    fn log() -> (Arc<MemoryTableStore>, AuditLog) {
        let store = Arc::new(MemoryTableStore::new());
        let audit = AuditLog::new(store.clone());
        (store, audit)
    }

    #[tokio::test]
    async fn test_record_normalizes_actor() {
        let (_, audit) = log();
        audit.record(Some("SE001"), "ENROLL_STUDENT", "x", None).await;
        audit.record(Some("ADMIN"), "CREATE_SUBJECT", "y", None).await;
        audit.record(None, "MYSTERY", "z", None).await;

        let entries = audit.list(&LogFilter::default()).await.unwrap();
        let actors: Vec<_> = entries.iter().map(|e| e.actor_id.as_str()).collect();
        assert!(actors.contains(&"USER#SE001"));
        assert!(actors.contains(&"ADMIN"));
        assert!(actors.contains(&"UNKNOWN"));
    }

    #[tokio::test]
    async fn test_list_filters_by_actor_and_class() {
        let (_, audit) = log();
        audit
            .record(Some("SE001"), "ENROLL_STUDENT", "a", Some("C1"))
            .await;
        audit
            .record(Some("SE002"), "ENROLL_STUDENT", "b", Some("C2"))
            .await;

        let filter = LogFilter {
            actor_id: Some("SE001".to_string()),
            ..Default::default()
        };
        let entries = audit.list(&filter).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].target_class_id.as_deref(), Some("CLASS#C1"));
    }
}
