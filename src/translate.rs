//! Message-to-request translation.
//!
//! Turns a received queue message into the HTTP request description the
//! dispatcher sends to the worker endpoint. Translation is pure: it reads
//! nothing but the message and the configured timeout.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::queue::{AttributeValue, QueueMessage};

/// Prefix for headers synthesized from message attributes.
pub const ATTRIBUTE_HEADER_PREFIX: &str = "X-Aws-Sqsd-Attr-";

/// Errors that make a message undeliverable as-is.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// The message body is not valid JSON. The message is neither dispatched
    /// nor deleted, so the queue redelivers it unchanged.
    #[error("Message body is not valid JSON: {0}")]
    MalformedBody(#[from] serde_json::Error),
}

/// An outbound worker request, ready for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Request headers: `Content-Type` plus one synthesized header per
    /// message attribute.
    pub headers: Vec<(String, String)>,
    /// The JSON value parsed from the message body, re-serialized on send.
    pub body: Value,
    /// Hard bound on the whole request.
    pub timeout: Duration,
}

/// Translates a queue message into a worker request.
///
/// Attribute headers are named `X-Aws-Sqsd-Attr-<attribute>`. String
/// attributes carry their value verbatim, binary attributes carry their raw
/// bytes (lossy UTF-8, never base64), and attributes with an unrecognized
/// data type carry an empty value.
pub fn translate(
    message: &QueueMessage,
    timeout: Duration,
) -> Result<DispatchRequest, TranslateError> {
    let body: Value = serde_json::from_str(&message.body)?;

    let mut headers = Vec::with_capacity(message.attributes.len() + 1);
    headers.push(("Content-Type".to_string(), "application/json".to_string()));

    for (name, value) in &message.attributes {
        let header_value = match value {
            AttributeValue::String(s) => s.clone(),
            AttributeValue::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            AttributeValue::Unsupported => String::new(),
        };
        headers.push((format!("{ATTRIBUTE_HEADER_PREFIX}{name}"), header_value));
    }

    Ok(DispatchRequest {
        headers,
        body,
        timeout,
    })
}
