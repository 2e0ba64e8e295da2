//! Acknowledgment handling.
//!
//! The single place that decides whether a message leaves the queue. A
//! message is deleted when and only when its dispatch outcome is
//! `Delivered`; every other outcome leaves the delivery to reappear after
//! its visibility timeout.

use tracing::{debug, error};

use crate::dispatch::DispatchOutcome;
use crate::queue::MessageQueue;
use crate::scheduler::DispatchStats;

/// Acknowledges `receipt_handle` if the worker accepted the message.
///
/// Delete failures are logged, never retried: the worker already processed
/// the message, so the cost is a possible duplicate delivery, not data loss.
pub async fn settle(
    queue: &dyn MessageQueue,
    outcome: &DispatchOutcome,
    message_id: &str,
    receipt_handle: &str,
    stats: &DispatchStats,
) {
    if !outcome.is_delivered() {
        return;
    }

    match queue.acknowledge(receipt_handle).await {
        Ok(()) => {
            stats.record_acknowledged();
            debug!(message_id, "Message acknowledged");
        }
        Err(e) => {
            stats.record_ack_failure();
            error!(
                message_id,
                error = %e,
                "Error deleting a message that the worker already processed"
            );
        }
    }
}
