//! Poll scheduling.
//!
//! The control loop of the daemon: fetch a batch, fan each message out
//! through its translate, dispatch, and acknowledge pipeline, and decide
//! when the next fetch happens. Three trigger modes are supported; see
//! [`PollMode`](crate::config::PollMode).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::io::AsyncBufReadExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::ack;
use crate::config::{DaemonConfig, PollMode};
use crate::dispatch::{DispatchOutcome, WorkerDispatcher};
use crate::queue::{MessageQueue, QueueMessage};
use crate::translate;

/// Counters shared by every in-flight pipeline.
#[derive(Debug, Default)]
pub struct DispatchStats {
    cycles: AtomicU64,
    received: AtomicU64,
    delivered: AtomicU64,
    rejected: AtomicU64,
    transport_failures: AtomicU64,
    malformed: AtomicU64,
    acknowledged: AtomicU64,
    ack_failures: AtomicU64,
}

impl DispatchStats {
    /// Creates a fresh set of counters.
    pub fn new() -> Self {
        Self::default()
    }

    fn record_cycle(&self, received: usize) {
        self.cycles.fetch_add(1, Ordering::SeqCst);
        self.received.fetch_add(received as u64, Ordering::SeqCst);
    }

    fn record_outcome(&self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Delivered => {
                self.delivered.fetch_add(1, Ordering::SeqCst);
            }
            DispatchOutcome::Rejected { .. } => {
                self.rejected.fetch_add(1, Ordering::SeqCst);
            }
            DispatchOutcome::TransportFailed(_) => {
                self.transport_failures.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_acknowledged(&self) {
        self.acknowledged.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_ack_failure(&self) {
        self.ack_failures.fetch_add(1, Ordering::SeqCst);
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::SeqCst),
            received: self.received.load(Ordering::SeqCst),
            delivered: self.delivered.load(Ordering::SeqCst),
            rejected: self.rejected.load(Ordering::SeqCst),
            transport_failures: self.transport_failures.load(Ordering::SeqCst),
            malformed: self.malformed.load(Ordering::SeqCst),
            acknowledged: self.acknowledged.load(Ordering::SeqCst),
            ack_failures: self.ack_failures.load(Ordering::SeqCst),
        }
    }
}

/// Snapshot of the scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Fetch cycles started, including ones that found nothing.
    pub cycles: u64,
    /// Messages handed out by the queue.
    pub received: u64,
    /// Deliveries the worker answered with 200.
    pub delivered: u64,
    /// Deliveries the worker answered with any other status.
    pub rejected: u64,
    /// Deliveries that never produced a response.
    pub transport_failures: u64,
    /// Messages skipped because their body was not valid JSON.
    pub malformed: u64,
    /// Successful deletes.
    pub acknowledged: u64,
    /// Failed deletes.
    pub ack_failures: u64,
}

/// Drives the poll, dispatch, acknowledge loop.
pub struct PollScheduler {
    queue: Arc<dyn MessageQueue>,
    dispatcher: Arc<WorkerDispatcher>,
    stats: Arc<DispatchStats>,
    mode: PollMode,
    poll_interval: Duration,
    inactivity_timeout: Duration,
    max_messages: i32,
    shutdown_rx: watch::Receiver<bool>,
    trigger_rx: Option<mpsc::Receiver<()>>,
}

impl PollScheduler {
    /// Creates a scheduler from the daemon configuration.
    ///
    /// `shutdown_rx` flips to `true` exactly once; the scheduler finishes
    /// what it already started and returns. Manual mode additionally needs
    /// a trigger source; see [`PollScheduler::with_trigger`].
    pub fn new(
        config: &DaemonConfig,
        queue: Arc<dyn MessageQueue>,
        dispatcher: Arc<WorkerDispatcher>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            stats: Arc::new(DispatchStats::new()),
            mode: config.mode,
            poll_interval: config.poll_interval,
            inactivity_timeout: config.inactivity_timeout,
            max_messages: config.max_messages,
            shutdown_rx,
            trigger_rx: None,
        }
    }

    /// Attaches the trigger source consumed by manual mode.
    pub fn with_trigger(mut self, trigger_rx: mpsc::Receiver<()>) -> Self {
        self.trigger_rx = Some(trigger_rx);
        self
    }

    /// Counters shared with every pipeline this scheduler spawns.
    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }

    /// Runs the loop until the shutdown signal flips or, in manual mode,
    /// the trigger source closes.
    pub async fn run(mut self) {
        info!(
            mode = %self.mode,
            worker_url = self.dispatcher.worker_url(),
            "Starting to send messages to the worker"
        );

        match self.mode {
            PollMode::Interval => self.run_interval().await,
            PollMode::Continuous => self.run_continuous().await,
            PollMode::Manual => self.run_manual().await,
        }

        let stats = self.stats.snapshot();
        info!(
            cycles = stats.cycles,
            received = stats.received,
            delivered = stats.delivered,
            rejected = stats.rejected,
            transport_failures = stats.transport_failures,
            "Scheduler stopped"
        );
    }

    /// Interval mode: a new cycle starts on every tick, whether or not
    /// earlier cycles have settled. Under a slow worker, cycles pile up in
    /// flight; the queue's visibility timeout is the only bound on duplicate
    /// processing.
    async fn run_interval(&mut self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        // Missed ticks are delayed, not burst-fired.
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut cycles: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let queue = Arc::clone(&self.queue);
                    let dispatcher = Arc::clone(&self.dispatcher);
                    let stats = Arc::clone(&self.stats);
                    let timeout = self.inactivity_timeout;
                    cycles.spawn(async move {
                        run_cycle(queue, dispatcher, stats, timeout).await;
                    });
                }
                _ = self.shutdown_rx.changed() => break,
                Some(result) = cycles.join_next(), if !cycles.is_empty() => {
                    if let Err(e) = result {
                        error!(error = %e, "Poll cycle panicked");
                    }
                }
            }
        }

        // Let cycles that already fetched messages settle before returning.
        while let Some(result) = cycles.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Poll cycle panicked");
            }
        }
    }

    /// Back-to-back mode: the next fetch starts only after every message in
    /// the previous batch has settled, so the queue is never polled faster
    /// than the worker keeps up.
    async fn run_continuous(&mut self) {
        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            let cycle = run_cycle(
                Arc::clone(&self.queue),
                Arc::clone(&self.dispatcher),
                Arc::clone(&self.stats),
                self.inactivity_timeout,
            );

            tokio::select! {
                _ = cycle => {}
                _ = self.shutdown_rx.changed() => {
                    warn!("Shutdown during a cycle; unacknowledged messages will be redelivered");
                    break;
                }
            }
        }
    }

    /// Manual mode: exactly one cycle per trigger event. The trigger source
    /// is typically an operator pressing Enter; see [`stdin_trigger`].
    async fn run_manual(&mut self) {
        let Some(mut trigger_rx) = self.trigger_rx.take() else {
            error!("Manual mode selected but no trigger source attached");
            return;
        };

        loop {
            info!(
                max_messages = self.max_messages,
                worker_url = self.dispatcher.worker_url(),
                "Press Enter to fetch the next batch"
            );

            tokio::select! {
                trigger = trigger_rx.recv() => {
                    if trigger.is_none() {
                        debug!("Trigger source closed, stopping");
                        break;
                    }
                    run_cycle(
                        Arc::clone(&self.queue),
                        Arc::clone(&self.dispatcher),
                        Arc::clone(&self.stats),
                        self.inactivity_timeout,
                    )
                    .await;
                }
                _ = self.shutdown_rx.changed() => break,
            }
        }
    }
}

/// One fetch cycle: receive a batch and run every message through its own
/// pipeline concurrently. Returns once all pipelines have settled.
async fn run_cycle(
    queue: Arc<dyn MessageQueue>,
    dispatcher: Arc<WorkerDispatcher>,
    stats: Arc<DispatchStats>,
    inactivity_timeout: Duration,
) {
    let messages = match queue.receive_batch().await {
        Ok(messages) => messages,
        Err(e) => {
            error!(error = %e, "Error receiving messages from the queue");
            stats.record_cycle(0);
            return;
        }
    };

    stats.record_cycle(messages.len());

    if messages.is_empty() {
        debug!("Queue returned no messages");
        return;
    }

    debug!(count = messages.len(), "Received messages");

    let pipelines = messages.into_iter().map(|message| {
        let queue = Arc::clone(&queue);
        let dispatcher = Arc::clone(&dispatcher);
        let stats = Arc::clone(&stats);
        async move {
            process_message(
                queue.as_ref(),
                &dispatcher,
                &stats,
                message,
                inactivity_timeout,
            )
            .await;
        }
    });

    join_all(pipelines).await;
}

/// The per-message pipeline. Every failure here is terminal for this message
/// only; redelivery after the visibility timeout is the retry path.
async fn process_message(
    queue: &dyn MessageQueue,
    dispatcher: &WorkerDispatcher,
    stats: &DispatchStats,
    message: QueueMessage,
    inactivity_timeout: Duration,
) {
    let request = match translate::translate(&message, inactivity_timeout) {
        Ok(request) => request,
        Err(e) => {
            stats.record_malformed();
            error!(message_id = %message.message_id, error = %e, "Skipping message");
            return;
        }
    };

    let outcome = dispatcher.dispatch(&request).await;
    stats.record_outcome(&outcome);

    match &outcome {
        DispatchOutcome::Delivered => {
            debug!(message_id = %message.message_id, "Message processed by the worker");
        }
        DispatchOutcome::Rejected { status, reason } => {
            warn!(
                message_id = %message.message_id,
                status = *status,
                reason = %reason,
                "The worker rejected the message; it will be redelivered"
            );
        }
        DispatchOutcome::TransportFailed(e) => {
            error!(message_id = %message.message_id, error = %e, "Error sending request to the worker");
        }
    }

    ack::settle(
        queue,
        &outcome,
        &message.message_id,
        &message.receipt_handle,
        stats,
    )
    .await;
}

/// Bridges stdin lines to trigger events for manual mode.
///
/// Each line (typically a bare Enter) becomes one trigger. The channel
/// closes when stdin does.
pub fn stdin_trigger() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let stdin = tokio::io::stdin();
        let mut lines = tokio::io::BufReader::new(stdin).lines();
        while let Ok(Some(_)) = lines.next_line().await {
            if tx.send(()).await.is_err() {
                break;
            }
        }
    });

    rx
}
