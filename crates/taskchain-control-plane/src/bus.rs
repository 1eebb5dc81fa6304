//! In-process event bus.
//!
//! One `tokio::sync::broadcast` channel carries every message; subscribers
//! filter by [`EventChannel`]. Delivery is best-effort: a subscriber that
//! falls more than the channel capacity behind skips the gap.

use std::sync::Mutex;

use futures_util::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use taskchain_core::{EventChannel, TaskEvent};

use crate::queue::QueueMetrics;

/// A message on the bus.
#[derive(Debug, Clone)]
pub enum BusMessage {
    Task(TaskEvent),
    Metrics(QueueMetrics),
}

impl BusMessage {
    fn belongs_to(&self, channel: &EventChannel) -> bool {
        match self {
            BusMessage::Task(event) => channel.matches(event),
            BusMessage::Metrics(_) => *channel == EventChannel::Metrics,
        }
    }
}

/// Broadcast hub for lifecycle events and metrics snapshots.
pub struct EventBus {
    tx: broadcast::Sender<BusMessage>,
    /// Last assigned sequence number. Held while sending so subscribers see
    /// sequence numbers in increasing order.
    seq: Mutex<u64>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            seq: Mutex::new(0),
        }
    }

    /// Stamp `event` with the next sequence number and broadcast it.
    pub fn publish(&self, mut event: TaskEvent) -> u64 {
        let mut seq = self.seq.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *seq += 1;
        event.seq = *seq;
        debug!(
            seq = *seq,
            task_id = %event.task_id,
            kind = ?event.kind,
            status = %event.status,
            "Publishing task event"
        );
        // No receivers is not an error.
        let _ = self.tx.send(BusMessage::Task(event));
        *seq
    }

    pub fn publish_metrics(&self, metrics: QueueMetrics) {
        let _ = self.tx.send(BusMessage::Metrics(metrics));
    }

    pub fn subscribe(&self, channel: EventChannel) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            channel,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A filtered view of the bus.
pub struct Subscription {
    rx: broadcast::Receiver<BusMessage>,
    channel: EventChannel,
}

impl Subscription {
    pub fn channel(&self) -> &EventChannel {
        &self.channel
    }

    /// Next message on this channel; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.rx.recv().await {
                Ok(msg) if msg.belongs_to(&self.channel) => return Some(msg),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(channel = %self.channel, skipped = n, "Subscriber lagged, skipping events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = BusMessage> + Send {
        let channel = self.channel;
        BroadcastStream::new(self.rx).filter_map(move |item| match item {
            Ok(msg) if msg.belongs_to(&channel) => Some(msg),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                warn!(channel = %channel, skipped = n, "Subscriber lagged, skipping events");
                None
            }
        })
    }
}
