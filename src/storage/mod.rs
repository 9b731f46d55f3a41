//! Generic item store over the single table.
//!
//! The store is schema-agnostic: it moves raw attribute maps addressed by
//! `(PK, SK)` and knows about exactly one secondary index (`GSI1`). All
//! entity meaning lives in the repositories above it.
//!
//! There are no multi-item transactions. Workflows that touch several items
//! issue independent writes; the only optimistic-concurrency primitive is
//! the conditional counter update.

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;

use crate::keys::ItemKey;

pub mod dynamo;
pub mod item;
pub mod memory;

pub use dynamo::DynamoTableStore;
pub use item::{Item, ItemExt};
pub use memory::MemoryTableStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A conditional write lost its condition check.
    #[error("condition failed: {0}")]
    ConditionFailed(String),

    /// The service rejected or failed the request.
    #[error("request failed: {0}")]
    Request(String),

    /// A stored item is missing an attribute the caller requires.
    #[error("item {key} missing attribute {attribute}")]
    MissingAttribute { key: String, attribute: String },

    /// A stored attribute could not be read as the expected type.
    #[error("attribute {attribute} is not a valid {expected}")]
    BadAttribute {
        attribute: String,
        expected: &'static str,
    },
}

/// A query against the main table or GSI1.
///
/// Addresses one partition, optionally narrowed by a sort-key prefix.
/// The optional [`Filter`] is applied after the key condition, the way the
/// service applies filter expressions: it reduces the result set but not
/// the read work.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub partition: String,
    pub sort_prefix: Option<String>,
    pub index: bool,
    pub filter: Option<Filter>,
    pub scan_forward: bool,
}

impl QuerySpec {
    /// Query a main-table partition.
    pub fn partition(pk: impl Into<String>) -> Self {
        Self {
            partition: pk.into(),
            sort_prefix: None,
            index: false,
            filter: None,
            scan_forward: true,
        }
    }

    /// Query a GSI1 partition.
    pub fn gsi1(pk: impl Into<String>) -> Self {
        Self {
            index: true,
            ..Self::partition(pk)
        }
    }

    pub fn sort_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.sort_prefix = Some(prefix.into());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Descending sort-key order.
    pub fn newest_first(mut self) -> Self {
        self.scan_forward = false;
        self
    }
}

/// Post-key-condition filter. Composable with [`Filter::and`] and
/// [`Filter::or`].
#[derive(Debug, Clone)]
pub enum Filter {
    Eq(String, AttributeValue),
    BeginsWith(String, String),
    Contains(String, String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq_s(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Eq(attr.into(), AttributeValue::S(value.into()))
    }

    pub fn eq_n(attr: impl Into<String>, value: i64) -> Self {
        Filter::Eq(attr.into(), AttributeValue::N(value.to_string()))
    }

    pub fn begins_with(attr: impl Into<String>, prefix: impl Into<String>) -> Self {
        Filter::BeginsWith(attr.into(), prefix.into())
    }

    pub fn contains(attr: impl Into<String>, needle: impl Into<String>) -> Self {
        Filter::Contains(attr.into(), needle.into())
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut parts) => {
                parts.push(other);
                Filter::Or(parts)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    /// Evaluate the filter against an item (in-memory semantics; the
    /// DynamoDB implementation renders it to a filter expression instead).
    pub fn matches(&self, item: &Item) -> bool {
        match self {
            Filter::Eq(attr, value) => item.get(attr) == Some(value),
            Filter::BeginsWith(attr, prefix) => matches!(
                item.get(attr),
                Some(AttributeValue::S(s)) if s.starts_with(prefix)
            ),
            Filter::Contains(attr, needle) => matches!(
                item.get(attr),
                Some(AttributeValue::S(s)) if s.contains(needle)
            ),
            Filter::And(parts) => parts.iter().all(|f| f.matches(item)),
            Filter::Or(parts) => parts.iter().any(|f| f.matches(item)),
        }
    }
}

/// Condition attached to a counter update.
#[derive(Debug, Clone)]
pub enum UpdateCondition {
    /// Succeed only while the attribute is absent or below `limit`.
    NumberBelow { attribute: String, limit: i64 },
}

/// Interface for the single wide-column table.
///
/// Implementations:
/// - [`DynamoTableStore`]: DynamoDB
/// - [`MemoryTableStore`]: in-memory store for tests
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Fetch one item by its full key. `None` when absent.
    async fn get(&self, key: &ItemKey) -> Result<Option<Item>>;

    /// Write an item, replacing any existing item under the same key.
    async fn put(&self, item: Item) -> Result<()>;

    /// Delete by full key. Deleting an absent key is not an error.
    async fn delete(&self, key: &ItemKey) -> Result<()>;

    /// Run a partition query, following pagination to exhaustion.
    async fn query(&self, spec: QuerySpec) -> Result<Vec<Item>>;

    /// Full-table scan with a filter. Expensive; reserved for the lookup
    /// patterns that have no key path.
    async fn scan(&self, filter: Filter) -> Result<Vec<Item>>;

    /// Atomically add `delta` to a numeric attribute, treating an absent
    /// attribute as zero. With [`UpdateCondition::NumberBelow`] the write
    /// fails with [`StorageError::ConditionFailed`] once the limit is hit.
    ///
    /// There is no floor: a negative delta can drive the stored value below
    /// zero, and callers that need a floor must read first.
    async fn add_to_counter(
        &self,
        key: &ItemKey,
        attribute: &str,
        delta: i64,
        condition: Option<UpdateCondition>,
    ) -> Result<()>;
}
