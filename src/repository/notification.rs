//! Notifications.
//!
//! Personal notifications live in the recipient's `USER#<id>` partition
//! under `NOTI#<timestamp>` sort keys; broadcasts live under the shared
//! `NOTI#SYSTEM` partition. Reading merges both and orders by `created_at`
//! descending with missing timestamps last.

use std::sync::Arc;

use tracing::warn;

use crate::collab::Mailer;
use crate::error::{DomainError, Result};
use crate::keys;
use crate::schema;
use crate::storage::{Item, ItemExt, QuerySpec, TableStore};

/// A delivered notification. `id` is the item's sort key.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub notif_type: Option<String>,
    pub is_read: bool,
    pub created_at: Option<String>,
    pub class_id: Option<String>,
    pub sent_by: Option<String>,
    pub sent_at: Option<String>,
}

impl Notification {
    fn from_item(item: &Item) -> Result<Self> {
        Ok(Self {
            id: item.req_s(schema::SK)?.to_string(),
            title: item.opt_s(schema::TITLE)?.map(str::to_string),
            content: item.opt_s(schema::CONTENT)?.map(str::to_string),
            notif_type: item.opt_s(schema::TYPE)?.map(str::to_string),
            is_read: item.opt_bool(schema::IS_READ)?.unwrap_or(false),
            created_at: item.opt_s(schema::CREATED_AT)?.map(str::to_string),
            class_id: item.opt_s(schema::CLASS_ID)?.map(str::to_string),
            sent_by: item.opt_s(schema::SENT_BY)?.map(str::to_string),
            sent_at: item.opt_s(schema::SENT_AT)?.map(str::to_string),
        })
    }
}

pub struct NotificationRepository {
    store: Arc<dyn TableStore>,
    mailer: Arc<dyn Mailer>,
}

impl NotificationRepository {
    pub fn new(store: Arc<dyn TableStore>, mailer: Arc<dyn Mailer>) -> Self {
        Self { store, mailer }
    }

    /// Deliver a notification to one user.
    pub async fn notify_user(
        &self,
        user_id: &str,
        title: &str,
        content: &str,
        notif_type: &str,
    ) -> Result<()> {
        let now = super::now();
        let key = keys::user_notification(user_id, &now);
        let mut item = crate::storage::item::keyed(&key);
        item.set_s(schema::TITLE, title);
        item.set_s(schema::CONTENT, content);
        item.set_s(schema::TYPE, notif_type);
        item.set_bool(schema::IS_READ, false);
        item.set_s(schema::CREATED_AT, now);
        self.store.put(item).await?;
        Ok(())
    }

    /// Deliver a manually composed notification, stamped with the sender
    /// and an optional class reference.
    pub async fn send_manual(
        &self,
        sender_id: &str,
        user_id: &str,
        title: &str,
        content: &str,
        notif_type: Option<&str>,
        class_id: Option<&str>,
    ) -> Result<()> {
        let now = super::now();
        let key = keys::user_notification(user_id, &now);
        let mut item = crate::storage::item::keyed(&key);
        item.set_s(schema::TITLE, title);
        item.set_s(schema::CONTENT, content);
        item.set_s(schema::TYPE, notif_type.unwrap_or("SYSTEM_ALERT"));
        item.set_bool(schema::IS_READ, false);
        item.set_s(schema::CREATED_AT, now.clone());
        item.set_s(schema::SENT_BY, sender_id);
        item.set_s(schema::SENT_AT, now);
        if let Some(class_id) = class_id {
            item.set_s(schema::CLASS_ID, class_id);
        }
        self.store.put(item).await?;
        Ok(())
    }

    /// Deliver a broadcast visible to every user.
    pub async fn broadcast(&self, title: &str, content: &str, notif_type: &str) -> Result<()> {
        let now = super::now();
        let key = keys::system_notification(&now);
        let mut item = crate::storage::item::keyed(&key);
        item.set_s(schema::TITLE, title);
        item.set_s(schema::CONTENT, content);
        item.set_s(schema::TYPE, notif_type);
        item.set_bool(schema::IS_READ, false);
        item.set_s(schema::CREATED_AT, now);
        self.store.put(item).await?;
        Ok(())
    }

    /// Notify every student enrolled in a class and send a deduplicated
    /// bulk email. The in-app items are written first; a mail failure is
    /// logged and swallowed.
    pub async fn send_class_notification(
        &self,
        class_id: &str,
        sender: &str,
        title: &str,
        content: &str,
    ) -> Result<()> {
        let raw_class_id = keys::strip(keys::CLASS_PREFIX, class_id);
        let enrollments = self
            .store
            .query(
                QuerySpec::partition(keys::class_pk(class_id))
                    .sort_prefix(keys::STUDENT_PREFIX),
            )
            .await?;

        if enrollments.is_empty() {
            warn!(class_id = %raw_class_id, "Class has no enrollments, nothing to notify");
            return Ok(());
        }

        let now = super::now();
        let notification_id = uuid::Uuid::new_v4().to_string();
        let mut emails: Vec<String> = Vec::new();

        for enrollment in &enrollments {
            let Some(student_id) = Self::student_id_of(enrollment)? else {
                continue;
            };

            let key = keys::user_notification(
                &student_id,
                &format!("{now}#{notification_id}"),
            );
            let mut item = crate::storage::item::keyed(&key);
            item.set_s(schema::ID, notification_id.clone());
            item.set_s(schema::TITLE, title);
            item.set_s(schema::CONTENT, content);
            item.set_s(schema::TYPE, "class");
            item.set_s(schema::CLASS_ID, raw_class_id);
            item.set_bool(schema::IS_READ, false);
            item.set_s(schema::SENT_AT, now.clone());
            item.set_s(schema::SENT_BY, sender);
            self.store.put(item).await?;

            // enrollment rows rarely carry the email; fall back to the profile
            let email = match enrollment.opt_s(schema::EMAIL)? {
                Some(e) => Some(e.to_string()),
                None => {
                    let profile = self.store.get(&keys::user_profile(&student_id)).await?;
                    profile
                        .map(|p| p.opt_s(schema::EMAIL).map(|e| e.map(str::to_string)))
                        .transpose()?
                        .flatten()
                }
            };
            if let Some(email) = email {
                if !emails.contains(&email) {
                    emails.push(email);
                }
            }
        }

        if !emails.is_empty() {
            let subject = format!("[{raw_class_id}] {title}");
            if let Err(err) = self.mailer.send(&emails, &subject, content).await {
                warn!(class_id = %raw_class_id, error = %err, "Bulk mail failed, notifications already stored");
            }
        }

        Ok(())
    }

    fn student_id_of(enrollment: &Item) -> Result<Option<String>> {
        if let Some(explicit) = enrollment.opt_s(schema::STUDENT_ID)? {
            return Ok(Some(explicit.to_string()));
        }
        let sk = enrollment.req_s(schema::SK)?;
        Ok(sk.strip_prefix(keys::STUDENT_PREFIX).map(str::to_string))
    }

    /// List a user's notifications merged with system broadcasts, newest
    /// first by `created_at` with missing timestamps last. Optional type
    /// and class filters compare case-insensitively.
    pub async fn list_for_user(
        &self,
        user_id: &str,
        type_filter: Option<&str>,
        class_filter: Option<&str>,
    ) -> Result<Vec<Notification>> {
        let personal = self
            .store
            .query(
                QuerySpec::partition(keys::user_pk(user_id))
                    .sort_prefix(keys::NOTIFICATION_PREFIX)
                    .newest_first(),
            )
            .await?;
        let system = self
            .store
            .query(
                QuerySpec::partition(keys::SYSTEM_NOTIFICATIONS_PK)
                    .sort_prefix(keys::NOTIFICATION_PREFIX)
                    .newest_first(),
            )
            .await?;

        let mut notifications: Vec<Notification> = personal
            .iter()
            .chain(system.iter())
            .map(Notification::from_item)
            .collect::<Result<_>>()?;

        if let Some(wanted) = type_filter.filter(|t| !t.is_empty()) {
            notifications.retain(|n| {
                n.notif_type
                    .as_deref()
                    .map(|t| t.eq_ignore_ascii_case(wanted))
                    .unwrap_or(false)
            });
        }
        if let Some(wanted) = class_filter.filter(|c| !c.is_empty()) {
            notifications.retain(|n| {
                n.class_id
                    .as_deref()
                    .map(|c| c.eq_ignore_ascii_case(wanted))
                    .unwrap_or(false)
            });
        }

        notifications.sort_by(|a, b| match (&a.created_at, &b.created_at) {
            (Some(x), Some(y)) => y.cmp(x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        Ok(notifications)
    }

    /// Flip one notification to read.
    pub async fn mark_read(&self, user_id: &str, notification_sk: &str) -> Result<()> {
        let key = crate::keys::ItemKey::new(keys::user_pk(user_id), notification_sk);
        let mut item = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| DomainError::not_found("notification", notification_sk))?;
        item.set_bool(schema::IS_READ, true);
        self.store.put(item).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::LoggingMailer;
    use crate::storage::MemoryTableStore;

    fn repo() -> (Arc<MemoryTableStore>, NotificationRepository) {
        let store = Arc::new(MemoryTableStore::new());
        let repo = NotificationRepository::new(store.clone(), Arc::new(LoggingMailer));
        (store, repo)
    }

    async fn put_raw(
        store: &MemoryTableStore,
        pk: &str,
        sk: &str,
        title: &str,
        created_at: Option<&str>,
    ) {
        let mut item = crate::storage::item::keyed(&crate::keys::ItemKey::new(pk, sk));
        item.set_s(schema::TITLE, title);
        item.set_opt_s(schema::CREATED_AT, created_at.map(String::from));
        store.put(item).await.unwrap();
    }

    #[tokio::test]
    async fn test_merge_includes_broadcasts() {
        let (_, repo) = repo();
        repo.notify_user("SE001", "Welcome", "hi", "CLASS_ENROLLMENT")
            .await
            .unwrap();
        repo.broadcast("Maintenance", "tonight", "SYSTEM_ALERT")
            .await
            .unwrap();

        let all = repo.list_for_user("SE001", None, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let alerts = repo
            .list_for_user("SE001", Some("system_alert"), None)
            .await
            .unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title.as_deref(), Some("Maintenance"));
    }

    #[tokio::test]
    async fn test_merge_orders_newest_first_with_missing_timestamps_last() {
        let (store, repo) = repo();
        put_raw(
            &store,
            "USER#SE001",
            "NOTI#2026-01-02T00:00:00.000Z",
            "second",
            Some("2026-01-02T00:00:00.000Z"),
        )
        .await;
        put_raw(
            &store,
            "USER#SE001",
            "NOTI#legacy",
            "undated",
            None,
        )
        .await;
        put_raw(
            &store,
            keys::SYSTEM_NOTIFICATIONS_PK,
            "NOTI#2026-01-03T00:00:00.000Z",
            "third",
            Some("2026-01-03T00:00:00.000Z"),
        )
        .await;
        put_raw(
            &store,
            "USER#SE001",
            "NOTI#2026-01-01T00:00:00.000Z",
            "first",
            Some("2026-01-01T00:00:00.000Z"),
        )
        .await;

        let merged = repo.list_for_user("SE001", None, None).await.unwrap();
        let titles: Vec<_> = merged.iter().map(|n| n.title.as_deref()).collect();
        assert_eq!(
            titles,
            vec![Some("third"), Some("second"), Some("first"), Some("undated")]
        );
    }

    #[tokio::test]
    async fn test_manual_send_stamps_sender_and_class() {
        let (_, repo) = repo();
        repo.send_manual("GV01", "SE001", "See me", "Office hours", None, Some("C1"))
            .await
            .unwrap();

        let inbox = repo.list_for_user("SE001", None, None).await.unwrap();
        assert_eq!(inbox.len(), 1);
        let sent = &inbox[0];
        assert_eq!(sent.sent_by.as_deref(), Some("GV01"));
        assert_eq!(sent.class_id.as_deref(), Some("C1"));
        assert_eq!(sent.notif_type.as_deref(), Some("SYSTEM_ALERT"));
        assert_eq!(sent.sent_at, sent.created_at);
        assert!(sent.sent_at.is_some());
    }

    #[tokio::test]
    async fn test_mark_read() {
        let (_, repo) = repo();
        repo.notify_user("SE001", "T", "c", "class").await.unwrap();
        let first = repo.list_for_user("SE001", None, None).await.unwrap();
        assert!(!first[0].is_read);

        repo.mark_read("SE001", &first[0].id).await.unwrap();
        let again = repo.list_for_user("SE001", None, None).await.unwrap();
        assert!(again[0].is_read);
    }

    #[tokio::test]
    async fn test_mark_read_missing_is_not_found() {
        let (_, repo) = repo();
        let err = repo.mark_read("SE001", "NOTI#nope").await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }
}
