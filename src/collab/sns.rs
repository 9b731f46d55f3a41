//! SNS event bus.

use async_trait::async_trait;
use aws_sdk_sns::types::MessageAttributeValue;
use aws_sdk_sns::Client;
use tracing::debug;

use super::{CollabError, EventBus, Result};

/// Message attribute carrying the event type (for subscriber filtering).
const EVENT_TYPE_ATTR: &str = "event_type";

/// Publishes domain events to one SNS topic. Delivery is best effort;
/// callers log and swallow publish failures.
pub struct SnsEventBus {
    client: Client,
    topic_arn: String,
}

impl SnsEventBus {
    pub async fn new(topic_arn: impl Into<String>, endpoint_url: Option<&str>) -> Result<Self> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

        let client = if let Some(endpoint) = endpoint_url {
            let sns_config = aws_sdk_sns::config::Builder::from(&config)
                .endpoint_url(endpoint)
                .build();
            Client::from_conf(sns_config)
        } else {
            Client::new(&config)
        };

        Ok(Self {
            client,
            topic_arn: topic_arn.into(),
        })
    }
}

#[async_trait]
impl EventBus for SnsEventBus {
    async fn publish(&self, event_type: &str, payload: serde_json::Value) -> Result<()> {
        let attribute = MessageAttributeValue::builder()
            .data_type("String")
            .string_value(event_type)
            .build()
            .map_err(|e| CollabError::Bus(format!("bad message attribute: {e}")))?;

        self.client
            .publish()
            .topic_arn(&self.topic_arn)
            .message(payload.to_string())
            .message_attributes(EVENT_TYPE_ATTR, attribute)
            .send()
            .await
            .map_err(|e| CollabError::Bus(format!("publish failed: {e}")))?;

        debug!(event_type = %event_type, "Event published");
        Ok(())
    }
}
