//! Bounded event queue and batch processor
//!
//! Whale movements fan out as events on a fixed-capacity FIFO queue; when it
//! fills, the oldest events are dropped so a burst can never grow memory
//! without bound. One processor task drains the queue in batches and hands
//! each event to the consumer concurrently, settling the whole batch even
//! when individual events fail.

use crate::logger::{self, LogTag};
use crate::utils::check_shutdown_or_delay;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Pause between consecutive non-empty batches
const BATCH_DELAY: Duration = Duration::from_millis(100);

/// Poll interval while the queue is empty
const IDLE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    WhaleMovement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedEvent {
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub timestamp_ms: i64,
    /// Marks events large enough to warrant deeper analysis
    pub trigger_analysis: bool,
}

/// Fixed-capacity FIFO; enqueueing past capacity drops the oldest event
pub struct EventQueue {
    buf: Mutex<VecDeque<QueuedEvent>>,
    max_size: usize,
    dropped: Mutex<u64>,
}

impl EventQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            buf: Mutex::new(VecDeque::with_capacity(max_size.min(1024))),
            max_size,
            dropped: Mutex::new(0),
        }
    }

    pub fn push(&self, event: QueuedEvent) {
        let mut buf = self.buf.lock();
        if buf.len() >= self.max_size {
            buf.pop_front();
            *self.dropped.lock() += 1;
            logger::warning(LogTag::Events, "queue full, dropped oldest event");
        }
        buf.push_back(event);
    }

    /// Remove and return up to `batch_size` events, oldest first
    pub fn drain(&self, batch_size: usize) -> Vec<QueuedEvent> {
        let mut buf = self.buf.lock();
        let take = batch_size.min(buf.len());
        buf.drain(..take).collect()
    }

    pub fn len(&self) -> usize {
        self.buf.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.lock().is_empty()
    }

    pub fn dropped_count(&self) -> u64 {
        *self.dropped.lock()
    }
}

/// What to do with each drained event
///
/// `handle` failures are logged and never abort the batch.
#[async_trait]
pub trait EventConsumer: Send + Sync {
    async fn handle(&self, event: &QueuedEvent) -> Result<(), anyhow::Error>;
}

pub struct EventProcessor {
    queue: Arc<EventQueue>,
    consumer: Arc<dyn EventConsumer>,
    batch_size: usize,
    running: AtomicBool,
}

impl EventProcessor {
    pub fn new(queue: Arc<EventQueue>, consumer: Arc<dyn EventConsumer>, batch_size: usize) -> Self {
        Self {
            queue,
            consumer,
            batch_size,
            running: AtomicBool::new(false),
        }
    }

    /// Start the drain loop; repeated calls are no-ops and return `None`
    pub fn start(self: &Arc<Self>, shutdown: Arc<Notify>) -> Option<JoinHandle<()>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            logger::debug(LogTag::Events, "processor already running");
            return None;
        }

        let processor = Arc::clone(self);
        Some(tokio::spawn(async move {
            logger::info(LogTag::Events, "event processor started");
            loop {
                let batch = processor.queue.drain(processor.batch_size);
                let delay = if batch.is_empty() { IDLE_DELAY } else { BATCH_DELAY };

                if !batch.is_empty() {
                    processor.process_batch(&batch).await;
                }
                if check_shutdown_or_delay(&shutdown, delay).await {
                    break;
                }
            }
            processor.running.store(false, Ordering::SeqCst);
            logger::info(LogTag::Events, "event processor stopped");
        }))
    }

    /// Handle every event in the batch concurrently and settle them all;
    /// one failing event never blocks its siblings
    async fn process_batch(&self, batch: &[QueuedEvent]) {
        let results = futures::future::join_all(
            batch.iter().map(|event| self.consumer.handle(event)),
        )
        .await;

        let failures = results.iter().filter(|r| r.is_err()).count();
        for err in results.into_iter().filter_map(Result::err) {
            logger::warning(LogTag::Events, &format!("event handler failed: {}", err));
        }
        logger::debug(
            LogTag::Events,
            &format!("processed batch of {} ({} failed)", batch.len(), failures),
        );
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
