use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::trace;

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

/// In-memory bus scoped to whoever owns the `Arc`; there is no global instance.
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

    /// Fire-and-forget delivery to every current subscriber.
    pub fn emit(&self, event: E) {
        // A bus without listeners is not an error.
        if self.sender.send(event).is_err() {
            trace!("event dropped: no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

/// Helper to materialise an mpsc receiver from the bus subscription
/// so callers can await events without handling broadcast semantics directly.
///
/// The subscription is taken before this returns, so no event emitted
/// afterwards is missed.
pub fn to_mpsc<E>(bus: &InMemoryBus<E>, capacity: usize) -> mpsc::Receiver<E>
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
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    trace!(skipped, "mpsc bridge lagged behind bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    out_rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn emit_without_subscribers_is_silent() {
        let bus = InMemoryBus::<u32>::new(4);
        bus.emit(7);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn every_subscriber_receives_each_event() {
        let bus = InMemoryBus::<&'static str>::new(4);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        bus.emit("automation-completed");
        assert_eq!(first.recv().await.unwrap(), "automation-completed");
        assert_eq!(second.recv().await.unwrap(), "automation-completed");
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn mpsc_bridge_forwards_events() {
        let bus = InMemoryBus::<u8>::new(4);
        let mut rx = to_mpsc(&bus, 4);
        bus.emit(3);
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(got, Some(3));
    }

    #[tokio::test]
    async fn mpsc_bridge_ends_when_bus_is_dropped() {
        let bus = InMemoryBus::<u8>::new(4);
        let mut rx = to_mpsc(&bus, 4);
        drop(bus);
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(got, None);
    }
}
