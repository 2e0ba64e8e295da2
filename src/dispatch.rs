//! Worker dispatch.
//!
//! Sends one translated request to the worker endpoint and classifies the
//! result. The classification is the whole contract: 200 means the message
//! may be acknowledged, anything else leaves it to queue redelivery.

use reqwest::{Client, StatusCode};

use crate::translate::DispatchRequest;

/// Outcome of a single delivery attempt.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The worker responded 200; the message may be acknowledged.
    Delivered,
    /// The worker responded with any other status; the message stays queued.
    Rejected {
        /// HTTP status code returned by the worker.
        status: u16,
        /// Canonical reason phrase, when one exists.
        reason: String,
    },
    /// The request never produced a response: DNS, connect, or timeout.
    TransportFailed(reqwest::Error),
}

impl DispatchOutcome {
    /// Whether the worker accepted the message.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Sends translated requests to the configured worker endpoint.
pub struct WorkerDispatcher {
    http_client: Client,
    worker_url: String,
}

impl WorkerDispatcher {
    /// Creates a dispatcher posting to the given worker URL.
    pub fn new(worker_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            worker_url: worker_url.into(),
        }
    }

    /// The endpoint this dispatcher posts to.
    pub fn worker_url(&self) -> &str {
        &self.worker_url
    }

    /// Posts one request to the worker and classifies the result.
    ///
    /// The per-request timeout carried by the translation hard-bounds the
    /// call; expiry surfaces as [`DispatchOutcome::TransportFailed`].
    pub async fn dispatch(&self, request: &DispatchRequest) -> DispatchOutcome {
        let mut http_request = self
            .http_client
            .post(&self.worker_url)
            .timeout(request.timeout)
            .json(&request.body);

        for (name, value) in &request.headers {
            http_request = http_request.header(name.as_str(), value.as_str());
        }

        let response = match http_request.send().await {
            Ok(response) => response,
            Err(error) => return DispatchOutcome::TransportFailed(error),
        };

        let status = response.status();
        if status == StatusCode::OK {
            DispatchOutcome::Delivered
        } else {
            DispatchOutcome::Rejected {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
            }
        }
    }
}
