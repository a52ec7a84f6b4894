//! One-way, best-effort event bus.
//!
//! The driver publishes [`ProgressUpdate`]s here; UI or reporting layers
//! subscribe. Publishing never waits on a subscriber and a subscriber that
//! falls behind loses updates instead of slowing the worker down.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tracing::debug;

use carousel_core_types::{CoreError, ProgressUpdate};

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

#[async_trait]
pub trait EventBus<E>: Send + Sync
where
    E: Event,
{
    /// Fails only when nobody is listening; callers treat that as advisory.
    async fn publish(&self, event: E) -> Result<(), CoreError>;
    fn subscribe(&self) -> broadcast::Receiver<E>;
}

pub type ProgressBus = InMemoryBus<ProgressUpdate>;

/// In-memory bus backed by a bounded broadcast channel.
pub struct InMemoryBus<E>
where
    E: Event,
{
    sender: broadcast::Sender<E>,
}

impl<E> InMemoryBus<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish without awaiting, for callers inside synchronous callbacks.
    ///
    /// Returns how many subscribers were handed the event.
    pub fn try_publish(&self, event: E) -> Result<usize, CoreError> {
        self.sender
            .send(event)
            .map_err(|err| CoreError::new(err.to_string()))
    }
}

#[async_trait]
impl<E> EventBus<E> for InMemoryBus<E>
where
    E: Event,
{
    async fn publish(&self, event: E) -> Result<(), CoreError> {
        self.try_publish(event).map(|_| ())
    }

    fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

/// Forward bus events into an mpsc receiver so callers can simply `recv()`.
///
/// Lagging is tolerated: skipped events are logged and forwarding continues.
pub fn to_mpsc<E>(bus: Arc<InMemoryBus<E>>, capacity: usize) -> mpsc::Receiver<E>
where
    E: Event,
{
    let mut rx = bus.subscribe();
    let (tx, out_rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    if tx.send(ev).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "progress subscriber lagged; dropping updates");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
    out_rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use carousel_core_types::{DriverPhase, RunId};

    fn update(item: usize) -> ProgressUpdate {
        ProgressUpdate {
            run_id: RunId("run".into()),
            batch_number: 1,
            total_batches: 1,
            item_index: Some(item),
            total_items: 100,
            state: DriverPhase::Acting,
            queue_depth: None,
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_an_error_not_a_block() {
        let bus: Arc<ProgressBus> = InMemoryBus::new(4);
        assert!(bus.publish(update(0)).await.is_err());
    }

    #[tokio::test]
    async fn forwarded_updates_arrive_in_order() {
        let bus: Arc<ProgressBus> = InMemoryBus::new(16);
        let mut rx = to_mpsc(bus.clone(), 16);
        for i in 0..3 {
            bus.publish(update(i)).await.unwrap();
        }
        for i in 0..3 {
            let got = rx.recv().await.unwrap();
            assert_eq!(got.item_index, Some(i));
        }
    }

    #[tokio::test]
    async fn slow_subscriber_loses_updates_but_keeps_receiving() {
        let bus: Arc<ProgressBus> = InMemoryBus::new(2);
        let mut raw = bus.subscribe();
        for i in 0..5 {
            bus.publish(update(i)).await.unwrap();
        }
        assert!(matches!(raw.recv().await, Err(RecvError::Lagged(_))));
        let next = raw.recv().await.unwrap();
        assert_eq!(next.item_index, Some(3));
    }
}
