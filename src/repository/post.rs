//! Class feed: posts, comments, reactions.
//!
//! Posts hang off the class partition (`CLASS#<id>`/`POST#<postId>`) and
//! are reachable by bare id through GSI1 (`POST#<postId>`/`INFO`).
//! Comments live under the post partition, replies reference their parent
//! by `parentId` only. Reactions are one item per (entity, user) under
//! `REACTION#<entityId>`.
//!
//! The `likeCount`/`commentCount` attributes are denormalized counters.
//! Comment creation bumps the count atomically; the decrement paths are
//! read-modify-write of the whole item floored at zero, so concurrent
//! writers can clobber each other. Reacting twice also counts twice
//! because the reaction put is an overwrite, not a guarded insert.

use std::sync::Arc;

use tracing::info;

use crate::error::{DomainError, Result};
use crate::keys::{self, ItemKey};
use crate::schema;
use crate::storage::{Item, ItemExt, QuerySpec, TableStore};

#[derive(Debug, Clone)]
pub struct Post {
    pub id: String,
    pub class_id: String,
    pub sender_id: String,
    pub title: Option<String>,
    pub content: String,
    pub is_pinned: bool,
    pub like_count: i32,
    pub comment_count: i32,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Post {
    fn from_item(item: &Item) -> Result<Self> {
        let pk = item.req_s(schema::PK)?;
        let sk = item.req_s(schema::SK)?;
        Ok(Self {
            id: keys::strip(keys::POST_PREFIX, sk).to_string(),
            class_id: keys::strip(keys::CLASS_PREFIX, pk).to_string(),
            sender_id: item.opt_s(schema::SENDER_ID)?.unwrap_or_default().to_string(),
            title: item.opt_s(schema::TITLE)?.map(str::to_string),
            content: item.opt_s(schema::CONTENT)?.unwrap_or_default().to_string(),
            is_pinned: item.opt_bool(schema::IS_PINNED)?.unwrap_or(false),
            like_count: item.opt_i32(schema::LIKE_COUNT)?.unwrap_or(0),
            comment_count: item.opt_i32(schema::COMMENT_COUNT)?.unwrap_or(0),
            created_at: item.opt_s(schema::CREATED_AT)?.map(str::to_string),
            updated_at: item.opt_s(schema::UPDATED_AT)?.map(str::to_string),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub sender_id: String,
    pub content: String,
    /// Comment this one replies to. Dangling after the parent is deleted.
    pub parent_id: Option<String>,
    pub like_count: i32,
    pub created_at: Option<String>,
}

impl Comment {
    fn from_item(item: &Item) -> Result<Self> {
        let pk = item.req_s(schema::PK)?;
        let sk = item.req_s(schema::SK)?;
        Ok(Self {
            id: keys::strip(keys::COMMENT_PREFIX, sk).to_string(),
            post_id: keys::strip(keys::POST_PREFIX, pk).to_string(),
            sender_id: item.opt_s(schema::SENDER_ID)?.unwrap_or_default().to_string(),
            content: item.opt_s(schema::CONTENT)?.unwrap_or_default().to_string(),
            parent_id: item.opt_s(schema::PARENT_ID)?.map(str::to_string),
            like_count: item.opt_i32(schema::LIKE_COUNT)?.unwrap_or(0),
            created_at: item.opt_s(schema::CREATED_AT)?.map(str::to_string),
        })
    }
}

pub struct PostRepository {
    store: Arc<dyn TableStore>,
}

impl PostRepository {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    /// Create a post. The author must be the class teacher or an enrolled
    /// student.
    pub async fn create_post(
        &self,
        class_id: &str,
        author_id: &str,
        title: Option<&str>,
        content: &str,
    ) -> Result<Post> {
        if content.trim().is_empty() {
            return Err(DomainError::Validation("post content is required".into()));
        }
        self.assert_can_post(class_id, author_id).await?;

        let post_id = uuid::Uuid::new_v4().to_string();
        let now = super::now();
        let key = keys::post(class_id, &post_id);

        let mut item = crate::storage::item::keyed(&key);
        item.set_s(schema::GSI1_PK, format!("{}{post_id}", keys::POST_PREFIX));
        item.set_s(schema::GSI1_SK, keys::SK_INFO);
        item.set_s(schema::ID, post_id.clone());
        item.set_s(schema::CLASS_ID, keys::strip(keys::CLASS_PREFIX, class_id));
        item.set_s(schema::SENDER_ID, keys::strip(keys::USER_PREFIX, author_id));
        item.set_opt_s(schema::TITLE, title.map(str::to_string));
        item.set_s(schema::CONTENT, content);
        item.set_bool(schema::IS_PINNED, false);
        item.set_i32(schema::LIKE_COUNT, 0);
        item.set_i32(schema::COMMENT_COUNT, 0);
        item.set_s(schema::CREATED_AT, now.clone());
        item.set_s(schema::UPDATED_AT, now);

        let post = Post::from_item(&item)?;
        self.store.put(item).await?;
        info!(class_id = %post.class_id, post_id = %post.id, "Post created");
        Ok(post)
    }

    /// Posts of a class, newest first by creation time.
    pub async fn list_posts(&self, class_id: &str) -> Result<Vec<Post>> {
        let items = self
            .store
            .query(
                QuerySpec::partition(keys::class_pk(class_id))
                    .sort_prefix(keys::POST_PREFIX),
            )
            .await?;
        let mut posts: Vec<Post> = items.iter().map(Post::from_item).collect::<Result<_>>()?;
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts)
    }

    /// Fetch a post by bare id through the index.
    pub async fn get_post(&self, post_id: &str) -> Result<Post> {
        let item = self.resolve(keys::POST_PREFIX, post_id).await?;
        Post::from_item(&item)
    }

    /// Delete a post and everything in its partition (comments and their
    /// replies). Each delete is an independent request; a failure mid-way
    /// leaves a partial partition. Reactions to the post and its comments
    /// are left behind under their own partitions.
    pub async fn delete_post(&self, post_id: &str, requester_id: &str) -> Result<()> {
        let item = self.resolve(keys::POST_PREFIX, post_id).await?;
        let post = Post::from_item(&item)?;
        self.assert_can_moderate(&post.class_id, &post.sender_id, requester_id)
            .await?;

        self.store
            .delete(&keys::post(&post.class_id, post_id))
            .await?;

        let children = self
            .store
            .query(QuerySpec::partition(format!(
                "{}{post_id}",
                keys::POST_PREFIX
            )))
            .await?;
        for child in &children {
            let key = ItemKey::new(child.req_s(schema::PK)?, child.req_s(schema::SK)?);
            self.store.delete(&key).await?;
        }
        info!(post_id = %post_id, comments = children.len(), "Post deleted with its partition");
        Ok(())
    }

    /// Add a comment (or reply, with `parent_id`). The post's comment
    /// counter is bumped atomically after the comment item is written.
    pub async fn create_comment(
        &self,
        post_id: &str,
        sender_id: &str,
        content: &str,
        parent_id: Option<&str>,
    ) -> Result<Comment> {
        if content.trim().is_empty() {
            return Err(DomainError::Validation("comment content is required".into()));
        }
        let post_item = self.resolve(keys::POST_PREFIX, post_id).await?;
        let post = Post::from_item(&post_item)?;
        self.assert_can_post(&post.class_id, sender_id).await?;
        let post_key = ItemKey::new(post_item.req_s(schema::PK)?, post_item.req_s(schema::SK)?);

        let comment_id = uuid::Uuid::new_v4().to_string();
        let key = keys::comment(post_id, &comment_id);

        let mut item = crate::storage::item::keyed(&key);
        item.set_s(
            schema::GSI1_PK,
            format!("{}{comment_id}", keys::COMMENT_PREFIX),
        );
        item.set_s(schema::GSI1_SK, keys::SK_INFO);
        item.set_s(schema::ID, comment_id);
        item.set_s(schema::POST_ID, post_id);
        item.set_s(schema::SENDER_ID, keys::strip(keys::USER_PREFIX, sender_id));
        item.set_s(schema::CONTENT, content);
        item.set_opt_s(schema::PARENT_ID, parent_id.map(str::to_string));
        item.set_i32(schema::LIKE_COUNT, 0);
        item.set_s(schema::CREATED_AT, super::now());

        let comment = Comment::from_item(&item)?;
        self.store.put(item).await?;
        self.store
            .add_to_counter(&post_key, schema::COMMENT_COUNT, 1, None)
            .await?;
        Ok(comment)
    }

    /// Comments of a post, oldest first.
    pub async fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        let items = self
            .store
            .query(
                QuerySpec::partition(format!("{}{post_id}", keys::POST_PREFIX))
                    .sort_prefix(keys::COMMENT_PREFIX),
            )
            .await?;
        let mut comments: Vec<Comment> =
            items.iter().map(Comment::from_item).collect::<Result<_>>()?;
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    /// Delete a comment. Replies to it stay and keep their dangling
    /// `parentId`. The post counter decrement is a floored
    /// read-modify-write of the post item.
    pub async fn delete_comment(
        &self,
        post_id: &str,
        comment_id: &str,
        requester_id: &str,
    ) -> Result<()> {
        let key = keys::comment(post_id, comment_id);
        let item = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| DomainError::not_found("comment", comment_id))?;
        let comment = Comment::from_item(&item)?;

        let post_item = self.resolve(keys::POST_PREFIX, post_id).await?;
        let post = Post::from_item(&post_item)?;
        let requester = keys::strip(keys::USER_PREFIX, requester_id);
        if !comment.sender_id.eq_ignore_ascii_case(requester) {
            self.assert_can_moderate(&post.class_id, &post.sender_id, requester_id)
                .await?;
        }

        self.store.delete(&key).await?;
        self.adjust_count_floored(
            &keys::post(&post.class_id, post_id),
            schema::COMMENT_COUNT,
            -1,
        )
        .await?;
        Ok(())
    }

    /// React to a post or comment. A repeat reaction from the same user
    /// overwrites the reaction item but still increments the counter.
    pub async fn react(&self, entity_id: &str, user_id: &str) -> Result<()> {
        let target = self.resolve_any(entity_id).await?;
        let target_key = ItemKey::new(target.req_s(schema::PK)?, target.req_s(schema::SK)?);

        let mut item = crate::storage::item::keyed(&keys::reaction(entity_id, user_id));
        item.set_s(schema::CREATED_AT, super::now());
        self.store.put(item).await?;

        self.store
            .add_to_counter(&target_key, schema::LIKE_COUNT, 1, None)
            .await?;
        Ok(())
    }

    /// Withdraw a reaction. Missing reactions are rejected so the counter
    /// only moves when an item is actually removed.
    pub async fn unreact(&self, entity_id: &str, user_id: &str) -> Result<()> {
        let reaction_key = keys::reaction(entity_id, user_id);
        if self.store.get(&reaction_key).await?.is_none() {
            return Err(DomainError::not_found("reaction", entity_id));
        }
        let target = self.resolve_any(entity_id).await?;
        let target_key = ItemKey::new(target.req_s(schema::PK)?, target.req_s(schema::SK)?);

        self.store.delete(&reaction_key).await?;
        self.adjust_count_floored(&target_key, schema::LIKE_COUNT, -1)
            .await
    }

    /// Users who reacted to an entity.
    pub async fn list_reactions(&self, entity_id: &str) -> Result<Vec<String>> {
        let items = self
            .store
            .query(QuerySpec::partition(format!(
                "{}{entity_id}",
                keys::REACTION_PREFIX
            )))
            .await?;
        items
            .iter()
            .map(|item| {
                Ok(keys::strip(keys::USER_PREFIX, item.req_s(schema::SK)?).to_string())
            })
            .collect()
    }

    /// Resolve an entity's main-table item through its GSI1 id partition.
    async fn resolve(&self, prefix: &str, entity_id: &str) -> Result<Item> {
        let hits = self
            .store
            .query(
                QuerySpec::gsi1(format!("{prefix}{entity_id}"))
                    .sort_prefix(keys::SK_INFO),
            )
            .await?;
        let pointer = hits.into_iter().next().ok_or_else(|| {
            DomainError::not_found(
                if prefix == keys::POST_PREFIX { "post" } else { "comment" },
                entity_id,
            )
        })?;
        // re-read through the main table for the authoritative copy
        let key = ItemKey::new(pointer.req_s(schema::PK)?, pointer.req_s(schema::SK)?);
        self.store
            .get(&key)
            .await?
            .ok_or_else(|| DomainError::not_found("post", entity_id))
    }

    async fn resolve_any(&self, entity_id: &str) -> Result<Item> {
        match self.resolve(keys::POST_PREFIX, entity_id).await {
            Ok(item) => Ok(item),
            Err(DomainError::NotFound { .. }) => {
                self.resolve(keys::COMMENT_PREFIX, entity_id).await
            }
            Err(err) => Err(err),
        }
    }

    /// Read-modify-write counter change, floored at zero. Last writer wins
    /// over the whole item.
    async fn adjust_count_floored(&self, key: &ItemKey, attribute: &str, delta: i32) -> Result<()> {
        let Some(mut item) = self.store.get(key).await? else {
            return Ok(());
        };
        let current = item.opt_i32(attribute)?.unwrap_or(0);
        item.set_i32(attribute, (current + delta).max(0));
        self.store.put(item).await?;
        Ok(())
    }

    async fn assert_can_post(&self, class_id: &str, user_id: &str) -> Result<()> {
        if self.is_class_teacher(class_id, user_id).await? {
            return Ok(());
        }
        if self
            .store
            .get(&keys::enrollment(class_id, user_id))
            .await?
            .is_some()
        {
            return Ok(());
        }
        Err(DomainError::Forbidden(
            "only the teacher or enrolled students may post".into(),
        ))
    }

    async fn assert_can_moderate(
        &self,
        class_id: &str,
        author_id: &str,
        requester_id: &str,
    ) -> Result<()> {
        let requester = keys::strip(keys::USER_PREFIX, requester_id);
        if author_id.eq_ignore_ascii_case(requester)
            || self.is_class_teacher(class_id, requester_id).await?
        {
            return Ok(());
        }
        Err(DomainError::Forbidden(
            "only the author or the class teacher may delete this".into(),
        ))
    }

    async fn is_class_teacher(&self, class_id: &str, user_id: &str) -> Result<bool> {
        let Some(class_item) = self.store.get(&keys::class(class_id)).await? else {
            return Ok(false);
        };
        let Some(teacher_id) = class_item.opt_s(schema::TEACHER_ID)? else {
            return Ok(false);
        };
        let clean = keys::strip(keys::USER_PREFIX, teacher_id.trim()).trim();
        Ok(clean.eq_ignore_ascii_case(keys::strip(keys::USER_PREFIX, user_id).trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EnrollmentStatus;
    use crate::storage::MemoryTableStore;

    struct Fixture {
        store: Arc<MemoryTableStore>,
        posts: PostRepository,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryTableStore::new());

        let mut class = crate::storage::item::keyed(&keys::class("C1"));
        class.set_s(schema::NAME, "Databases");
        class.set_s(schema::TEACHER_ID, "USER#GV01");
        store.put(class).await.unwrap();

        let mut enrollment = crate::storage::item::keyed(&keys::enrollment("C1", "SE001"));
        enrollment.set_i32(schema::STATUS, EnrollmentStatus::Enrolled.code());
        store.put(enrollment).await.unwrap();

        Fixture {
            store: store.clone(),
            posts: PostRepository::new(store),
        }
    }

    #[tokio::test]
    async fn test_outsider_cannot_post() {
        let fx = fixture().await;
        let err = fx
            .posts
            .create_post("C1", "SE999", None, "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
        assert!(fx.posts.create_post("C1", "SE001", None, "hi").await.is_ok());
        assert!(fx.posts.create_post("C1", "gv01", None, "hi").await.is_ok());
    }

    #[tokio::test]
    async fn test_comment_bumps_counter_atomically() {
        let fx = fixture().await;
        let post = fx
            .posts
            .create_post("C1", "SE001", Some("Q"), "help")
            .await
            .unwrap();

        fx.posts
            .create_comment(&post.id, "GV01", "answer", None)
            .await
            .unwrap();
        let reply_to = fx.posts.list_comments(&post.id).await.unwrap()[0].id.clone();
        fx.posts
            .create_comment(&post.id, "SE001", "thanks", Some(&reply_to))
            .await
            .unwrap();

        let after = fx.posts.get_post(&post.id).await.unwrap();
        assert_eq!(after.comment_count, 2);
    }

    #[tokio::test]
    async fn test_delete_comment_orphans_replies() {
        let fx = fixture().await;
        let post = fx
            .posts
            .create_post("C1", "SE001", None, "help")
            .await
            .unwrap();
        let parent = fx
            .posts
            .create_comment(&post.id, "GV01", "answer", None)
            .await
            .unwrap();
        let reply = fx
            .posts
            .create_comment(&post.id, "SE001", "thanks", Some(&parent.id))
            .await
            .unwrap();

        fx.posts
            .delete_comment(&post.id, &parent.id, "GV01")
            .await
            .unwrap();

        // the reply survives with a dangling parent reference
        let remaining = fx.posts.list_comments(&post.id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, reply.id);
        assert_eq!(remaining[0].parent_id.as_deref(), Some(parent.id.as_str()));

        let after = fx.posts.get_post(&post.id).await.unwrap();
        assert_eq!(after.comment_count, 1);
    }

    #[tokio::test]
    async fn test_double_reaction_double_counts() {
        let fx = fixture().await;
        let post = fx
            .posts
            .create_post("C1", "SE001", None, "help")
            .await
            .unwrap();

        fx.posts.react(&post.id, "SE001").await.unwrap();
        fx.posts.react(&post.id, "SE001").await.unwrap();

        // one reaction item, two counted likes
        assert_eq!(fx.posts.list_reactions(&post.id).await.unwrap().len(), 1);
        assert_eq!(fx.posts.get_post(&post.id).await.unwrap().like_count, 2);

        // withdrawing once floors nothing yet; the drift stays
        fx.posts.unreact(&post.id, "SE001").await.unwrap();
        assert_eq!(fx.posts.get_post(&post.id).await.unwrap().like_count, 1);
        assert!(fx.posts.unreact(&post.id, "SE001").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_post_removes_partition() {
        let fx = fixture().await;
        let post = fx
            .posts
            .create_post("C1", "SE001", None, "help")
            .await
            .unwrap();
        fx.posts
            .create_comment(&post.id, "GV01", "answer", None)
            .await
            .unwrap();

        // a student who is not the author cannot delete
        let mut enrollment = crate::storage::item::keyed(&keys::enrollment("C1", "SE002"));
        enrollment.set_i32(schema::STATUS, EnrollmentStatus::Enrolled.code());
        fx.store.put(enrollment).await.unwrap();
        assert!(fx.posts.delete_post(&post.id, "SE002").await.is_err());

        fx.posts.delete_post(&post.id, "SE001").await.unwrap();
        assert!(matches!(
            fx.posts.get_post(&post.id).await.unwrap_err(),
            DomainError::NotFound { .. }
        ));
        assert!(fx.posts.list_comments(&post.id).await.unwrap().is_empty());
    }
}
