//! SQS queue adapter.
//!
//! Wraps the AWS SQS client with the daemon's fixed receive and delete
//! parameters. Both operations fail soft: a failed receive yields an empty
//! cycle, and a failed delete leaves the message to reappear once its
//! visibility timeout expires.

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sqs::config::Credentials;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::{Message, MessageAttributeValue, MessageSystemAttributeName};
use thiserror::Error;
use tracing::warn;

use crate::config::DaemonConfig;

/// Errors from receive and delete calls against the queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The receive call failed at the transport or auth layer.
    #[error("Failed to receive messages: {0}")]
    Receive(String),

    /// The delete call failed, e.g. because the receipt handle expired.
    #[error("Failed to delete message: {0}")]
    Delete(String),
}

/// Value of a single message attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// A `DataType: String` attribute.
    String(String),
    /// A `DataType: Binary` attribute, carried as raw bytes.
    Binary(Vec<u8>),
    /// An attribute whose data type the daemon does not recognize. It still
    /// produces a header downstream, with an empty value.
    Unsupported,
}

impl AttributeValue {
    fn from_sdk(name: &str, value: &MessageAttributeValue) -> Self {
        match value.data_type() {
            "String" => Self::String(value.string_value().unwrap_or_default().to_string()),
            "Binary" => Self::Binary(
                value
                    .binary_value()
                    .map(|blob| blob.as_ref().to_vec())
                    .unwrap_or_default(),
            ),
            other => {
                warn!(
                    attribute = name,
                    data_type = other,
                    "Unrecognized attribute data type, passing through an empty value"
                );
                Self::Unsupported
            }
        }
    }
}

/// A single message delivery as returned by a receive call.
///
/// The receipt handle identifies this delivery, not the message: it is valid
/// only until the visibility window expires or a delete consumes it.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Queue-assigned message id, used for logging.
    pub message_id: String,
    /// Raw message body, expected to be valid JSON.
    pub body: String,
    /// Message attributes, ordered by name so header synthesis is
    /// deterministic.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Opaque token required to delete this delivery.
    pub receipt_handle: String,
}

impl QueueMessage {
    fn from_sdk(message: Message) -> Self {
        let attributes = message
            .message_attributes
            .unwrap_or_default()
            .into_iter()
            .map(|(name, value)| {
                let value = AttributeValue::from_sdk(&name, &value);
                (name, value)
            })
            .collect();

        Self {
            message_id: message.message_id.unwrap_or_default(),
            body: message.body.unwrap_or_default(),
            attributes,
            receipt_handle: message.receipt_handle.unwrap_or_default(),
        }
    }
}

/// Queue operations the scheduler depends on.
///
/// The production implementation is [`SqsQueue`]; tests substitute an
/// in-memory queue to exercise scheduling and acknowledgment behavior.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Fetches the next batch of messages, waiting up to the configured
    /// long-poll time. An empty vector means the queue had nothing to hand
    /// out this cycle.
    async fn receive_batch(&self) -> Result<Vec<QueueMessage>, QueueError>;

    /// Deletes the delivery identified by `receipt_handle`.
    async fn acknowledge(&self, receipt_handle: &str) -> Result<(), QueueError>;
}

/// SQS-backed queue adapter holding the client and fixed call parameters.
pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
    max_messages: i32,
    visibility_timeout: i32,
    wait_time: i32,
}

impl SqsQueue {
    /// Builds the SQS client from the daemon configuration.
    ///
    /// Static credentials from the configuration take precedence; without
    /// them the SDK's default provider chain applies.
    pub async fn connect(config: &DaemonConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(access_key), Some(secret)) = (&config.access_key, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret,
                None,
                None,
                "sqsd-config",
            ));
        }

        let sdk_config = loader.load().await;

        Self {
            client: aws_sdk_sqs::Client::new(&sdk_config),
            queue_url: config.queue_url.clone(),
            max_messages: config.max_messages,
            visibility_timeout: config.visibility_timeout.as_secs() as i32,
            wait_time: config.wait_time.as_secs() as i32,
        }
    }

    /// The queue this adapter polls.
    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

#[async_trait]
impl MessageQueue for SqsQueue {
    async fn receive_batch(&self) -> Result<Vec<QueueMessage>, QueueError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(self.max_messages)
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .message_attribute_names("All")
            .visibility_timeout(self.visibility_timeout)
            .wait_time_seconds(self.wait_time)
            .send()
            .await
            .map_err(|e| QueueError::Receive(DisplayErrorContext(e).to_string()))?;

        Ok(output
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(QueueMessage::from_sdk)
            .collect())
    }

    async fn acknowledge(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Delete(DisplayErrorContext(e).to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_sqs::primitives::Blob;

    fn string_attr(value: &str) -> MessageAttributeValue {
        MessageAttributeValue::builder()
            .data_type("String")
            .string_value(value)
            .build()
            .expect("attribute should build")
    }

    #[test]
    fn test_from_sdk_maps_core_fields() {
        let message = Message::builder()
            .message_id("m-1")
            .body(r#"{"job":"resize"}"#)
            .receipt_handle("rh-1")
            .build();

        let converted = QueueMessage::from_sdk(message);

        assert_eq!(converted.message_id, "m-1");
        assert_eq!(converted.body, r#"{"job":"resize"}"#);
        assert_eq!(converted.receipt_handle, "rh-1");
        assert!(converted.attributes.is_empty());
    }

    #[test]
    fn test_from_sdk_defaults_missing_fields() {
        let converted = QueueMessage::from_sdk(Message::builder().build());

        assert_eq!(converted.message_id, "");
        assert_eq!(converted.body, "");
        assert_eq!(converted.receipt_handle, "");
    }

    #[test]
    fn test_from_sdk_converts_string_attribute() {
        let message = Message::builder()
            .message_attributes("trace", string_attr("abc-123"))
            .build();

        let converted = QueueMessage::from_sdk(message);

        assert_eq!(
            converted.attributes.get("trace"),
            Some(&AttributeValue::String("abc-123".to_string()))
        );
    }

    #[test]
    fn test_from_sdk_converts_binary_attribute() {
        let attr = MessageAttributeValue::builder()
            .data_type("Binary")
            .binary_value(Blob::new(b"raw-bytes".to_vec()))
            .build()
            .expect("attribute should build");
        let message = Message::builder().message_attributes("blob", attr).build();

        let converted = QueueMessage::from_sdk(message);

        assert_eq!(
            converted.attributes.get("blob"),
            Some(&AttributeValue::Binary(b"raw-bytes".to_vec()))
        );
    }

    #[test]
    fn test_from_sdk_passes_unknown_data_type_through_empty() {
        let attr = MessageAttributeValue::builder()
            .data_type("Number")
            .string_value("42")
            .build()
            .expect("attribute should build");
        let message = Message::builder().message_attributes("count", attr).build();

        let converted = QueueMessage::from_sdk(message);

        assert_eq!(
            converted.attributes.get("count"),
            Some(&AttributeValue::Unsupported)
        );
    }

    #[test]
    fn test_from_sdk_orders_attributes_by_name() {
        let message = Message::builder()
            .message_attributes("zulu", string_attr("z"))
            .message_attributes("alpha", string_attr("a"))
            .build();

        let converted = QueueMessage::from_sdk(message);
        let names: Vec<&str> = converted.attributes.keys().map(String::as_str).collect();

        assert_eq!(names, vec!["alpha", "zulu"]);
    }

    #[test]
    fn test_queue_error_display() {
        let err = QueueError::Receive("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));

        let err = QueueError::Delete("handle expired".to_string());
        assert!(err.to_string().contains("handle expired"));
    }
}
