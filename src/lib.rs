//! sqsd: a local SQS worker dispatcher.
//!
//! Polls an SQS queue, forwards each message to an HTTP worker endpoint as a
//! JSON POST, and deletes the message only when the worker responds 200.
//! Everything else is left to the queue's own visibility-timeout redelivery,
//! so processing is at-least-once and duplicates must be tolerated
//! downstream.

pub mod ack;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod queue;
pub mod scheduler;
pub mod translate;

// Re-export commonly used types
pub use config::{ConfigError, DaemonConfig, PollMode};
pub use dispatch::{DispatchOutcome, WorkerDispatcher};
pub use queue::{AttributeValue, MessageQueue, QueueError, QueueMessage, SqsQueue};
pub use scheduler::{DispatchStats, PollScheduler, StatsSnapshot};
pub use translate::{translate, DispatchRequest, TranslateError, ATTRIBUTE_HEADER_PREFIX};
