//! DynamoDB TableStore implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use tracing::{debug, info};

use super::{Filter, Item, QuerySpec, Result, StorageError, TableStore, UpdateCondition};
use crate::keys::ItemKey;
use crate::schema;

/// DynamoDB implementation of [`TableStore`].
pub struct DynamoTableStore {
    client: Client,
    table_name: String,
    index_name: String,
}

impl DynamoTableStore {
    /// Create a new DynamoDB table store. An `endpoint_url` override points
    /// the client at a local instance.
    pub async fn new(
        table_name: impl Into<String>,
        index_name: impl Into<String>,
        endpoint_url: Option<&str>,
    ) -> Result<Self> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

        let client = if let Some(endpoint) = endpoint_url {
            let dynamo_config = aws_sdk_dynamodb::config::Builder::from(&config)
                .endpoint_url(endpoint)
                .build();
            Client::from_conf(dynamo_config)
        } else {
            Client::new(&config)
        };

        let table_name = table_name.into();
        let index_name = index_name.into();
        info!(table = %table_name, index = %index_name, "Connected to DynamoDB");

        Ok(Self {
            client,
            table_name,
            index_name,
        })
    }

    fn key_map(key: &ItemKey) -> HashMap<String, AttributeValue> {
        let mut map = HashMap::new();
        map.insert(schema::PK.to_string(), AttributeValue::S(key.pk.clone()));
        map.insert(schema::SK.to_string(), AttributeValue::S(key.sk.clone()));
        map
    }
}

/// Accumulates expression attribute names/values while rendering a
/// [`Filter`] into a filter-expression string.
#[derive(Default)]
struct ExpressionParts {
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
    next: usize,
}

impl ExpressionParts {
    fn bind(&mut self, attr: &str, value: AttributeValue) -> (String, String) {
        let n = self.next;
        self.next += 1;
        let name = format!("#f{n}");
        let placeholder = format!(":f{n}");
        self.names.insert(name.clone(), attr.to_string());
        self.values.insert(placeholder.clone(), value);
        (name, placeholder)
    }

    fn render(&mut self, filter: &Filter) -> String {
        match filter {
            Filter::Eq(attr, value) => {
                let (name, placeholder) = self.bind(attr, value.clone());
                format!("{name} = {placeholder}")
            }
            Filter::BeginsWith(attr, prefix) => {
                let (name, placeholder) = self.bind(attr, AttributeValue::S(prefix.clone()));
                format!("begins_with({name}, {placeholder})")
            }
            Filter::Contains(attr, needle) => {
                let (name, placeholder) = self.bind(attr, AttributeValue::S(needle.clone()));
                format!("contains({name}, {placeholder})")
            }
            Filter::And(parts) => parts
                .iter()
                .map(|f| format!("({})", self.render(f)))
                .collect::<Vec<_>>()
                .join(" AND "),
            Filter::Or(parts) => parts
                .iter()
                .map(|f| format!("({})", self.render(f)))
                .collect::<Vec<_>>()
                .join(" OR "),
        }
    }
}

#[async_trait]
impl TableStore for DynamoTableStore {
    async fn get(&self, key: &ItemKey) -> Result<Option<Item>> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(Self::key_map(key)))
            .send()
            .await
            .map_err(|e| StorageError::Request(format!("GetItem failed: {e}")))?;

        Ok(result.item)
    }

    async fn put(&self, item: Item) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| StorageError::Request(format!("PutItem failed: {e}")))?;

        Ok(())
    }

    async fn delete(&self, key: &ItemKey) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(Self::key_map(key)))
            .send()
            .await
            .map_err(|e| StorageError::Request(format!("DeleteItem failed: {e}")))?;

        Ok(())
    }

    async fn query(&self, spec: QuerySpec) -> Result<Vec<Item>> {
        let (pk_attr, sk_attr) = if spec.index {
            (schema::GSI1_PK, schema::GSI1_SK)
        } else {
            (schema::PK, schema::SK)
        };

        let mut parts = ExpressionParts::default();
        parts
            .names
            .insert("#pk".to_string(), pk_attr.to_string());
        parts
            .values
            .insert(":pk".to_string(), AttributeValue::S(spec.partition.clone()));

        let mut key_condition = "#pk = :pk".to_string();
        if let Some(prefix) = &spec.sort_prefix {
            parts.names.insert("#sk".to_string(), sk_attr.to_string());
            parts
                .values
                .insert(":skp".to_string(), AttributeValue::S(prefix.clone()));
            key_condition.push_str(" AND begins_with(#sk, :skp)");
        }

        let filter_expression = spec.filter.as_ref().map(|f| parts.render(f));

        let mut items = Vec::new();
        let mut exclusive_start = None;

        loop {
            let mut request = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression(&key_condition)
                .set_expression_attribute_names(Some(parts.names.clone()))
                .set_expression_attribute_values(Some(parts.values.clone()))
                .scan_index_forward(spec.scan_forward)
                .set_exclusive_start_key(exclusive_start);

            if spec.index {
                request = request.index_name(&self.index_name);
            }
            if let Some(expr) = &filter_expression {
                request = request.filter_expression(expr);
            }

            let page = request
                .send()
                .await
                .map_err(|e| StorageError::Request(format!("Query failed: {e}")))?;

            items.extend(page.items.unwrap_or_default());

            match page.last_evaluated_key {
                Some(key) if !key.is_empty() => exclusive_start = Some(key),
                _ => break,
            }
        }

        debug!(
            partition = %spec.partition,
            index = spec.index,
            count = items.len(),
            "Query complete"
        );

        Ok(items)
    }

    async fn scan(&self, filter: Filter) -> Result<Vec<Item>> {
        let mut parts = ExpressionParts::default();
        let expression = parts.render(&filter);

        let mut items = Vec::new();
        let mut exclusive_start = None;

        loop {
            let page = self
                .client
                .scan()
                .table_name(&self.table_name)
                .filter_expression(&expression)
                .set_expression_attribute_names(Some(parts.names.clone()))
                .set_expression_attribute_values(Some(parts.values.clone()))
                .set_exclusive_start_key(exclusive_start)
                .send()
                .await
                .map_err(|e| StorageError::Request(format!("Scan failed: {e}")))?;

            items.extend(page.items.unwrap_or_default());

            match page.last_evaluated_key {
                Some(key) if !key.is_empty() => exclusive_start = Some(key),
                _ => break,
            }
        }

        Ok(items)
    }

    async fn add_to_counter(
        &self,
        key: &ItemKey,
        attribute: &str,
        delta: i64,
        condition: Option<UpdateCondition>,
    ) -> Result<()> {
        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(Self::key_map(key)))
            .update_expression("SET #c = if_not_exists(#c, :zero) + :d")
            .expression_attribute_names("#c", attribute)
            .expression_attribute_values(":zero", AttributeValue::N("0".to_string()))
            .expression_attribute_values(":d", AttributeValue::N(delta.to_string()));

        if let Some(UpdateCondition::NumberBelow {
            attribute: cond_attr,
            limit,
        }) = condition
        {
            request = request
                .condition_expression("(attribute_not_exists(#lim) OR #lim < :limit)")
                .expression_attribute_names("#lim", cond_attr)
                .expression_attribute_values(":limit", AttributeValue::N(limit.to_string()));
        }

        request.send().await.map_err(|e| {
            let service_error = e.into_service_error();
            if service_error.is_conditional_check_failed_exception() {
                StorageError::ConditionFailed(format!(
                    "counter {attribute} at {}/{}",
                    key.pk, key.sk
                ))
            } else {
                StorageError::Request(format!("UpdateItem failed: {service_error}"))
            }
        })?;

        debug!(
            pk = %key.pk,
            sk = %key.sk,
            attribute = %attribute,
            delta = delta,
            "Counter updated"
        );

        Ok(())
    }
}
