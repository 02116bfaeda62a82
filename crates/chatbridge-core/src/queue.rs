//! FIFO buffer between gateway event callbacks and the dispatch consumer.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::envelope::Envelope;

/// Unbounded, multi-producer inbound queue.
///
/// Producers never block. Consumers either poll with [`try_pop`](Self::try_pop)
/// or await the next item with [`recv`](Self::recv) /
/// [`recv_timeout`](Self::recv_timeout).
#[derive(Debug, Default)]
pub struct InboundQueue {
    items: Mutex<VecDeque<Envelope>>,
    notify: Notify,
}

impl InboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an envelope and wakes one waiting consumer.
    pub fn push(&self, envelope: Envelope) {
        self.items.lock().push_back(envelope);
        self.notify.notify_one();
    }

    /// Removes the oldest envelope, if any.
    pub fn try_pop(&self) -> Option<Envelope> {
        self.items.lock().pop_front()
    }

    /// Waits for the next envelope.
    pub async fn recv(&self) -> Envelope {
        loop {
            let notified = self.notify.notified();
            if let Some(env) = self.try_pop() {
                return env;
            }
            notified.await;
        }
    }

    /// Waits up to `timeout` for the next envelope.
    pub async fn recv_timeout(&self, timeout: Duration) -> Option<Envelope> {
        tokio::time::timeout(timeout, self.recv()).await.ok()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::DeliveryChannel;
    use crate::envelope::RawMessage;
    use crate::testing::RecordingOutbound;
    use std::sync::Arc;

    fn envelope(text: &str) -> Envelope {
        let delivery = DeliveryChannel::new(1, Arc::new(RecordingOutbound::default()));
        Envelope::from_raw(RawMessage::new(2, 1, format!("!{text}")), "!", delivery)
    }

    #[test]
    fn test_fifo_order() {
        let queue = InboundQueue::new();
        for text in ["a", "b", "c"] {
            queue.push(envelope(text));
        }
        assert_eq!(queue.len(), 3);

        let order: Vec<_> = std::iter::from_fn(|| queue.try_pop())
            .map(|e| e.content)
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_timeout_empty() {
        let queue = InboundQueue::new();
        assert!(queue.recv_timeout(Duration::from_millis(500)).await.is_none());
    }

    #[tokio::test]
    async fn test_recv_wakes_on_push() {
        let queue = Arc::new(InboundQueue::new());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.recv().await.content })
        };
        tokio::task::yield_now().await;
        queue.push(envelope("ping"));

        assert_eq!(consumer.await.unwrap(), "ping");
    }
}
