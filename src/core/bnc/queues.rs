use super::data::{EventUpdate, Symbol};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::sync::RwLock;

/// One bounded FIFO per symbol, created lazily on first use. Producers (the upstream demux loop)
/// and consumers (per-symbol processors) are distinct tasks, so the `Sender` and `Receiver`
/// halves are handed out independently; once a queue exists for a symbol, every later call
/// resolves to the same one.
pub struct InQueueSet {
    capacity: usize,
    queues: RwLock<HashMap<Symbol, Sender<EventUpdate>>>,
    receivers: RwLock<HashMap<Symbol, Receiver<EventUpdate>>>,
}

impl InQueueSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queues: RwLock::new(HashMap::new()),
            receivers: RwLock::new(HashMap::new()),
        }
    }

    /// Push an event onto the symbol's queue, creating it first if necessary. Blocks the caller
    /// (backpressure to the upstream read loop) when the queue is full - never drops.
    pub async fn enqueue(&self, event: EventUpdate) {
        let symbol = event.symbol.clone();
        let sender = self.get_or_create(&symbol).await;
        // A full queue blocks here; the send side only errors if every receiver was dropped,
        // which only happens after a `reset_all`, at which point the event is meaningless.
        let _ = sender.send(event).await;
    }

    /// Take ownership of the receive end for a symbol's queue, creating it first if necessary.
    /// Intended to be called exactly once per processor lifetime.
    pub async fn take_reader(&self, symbol: &Symbol) -> Receiver<EventUpdate> {
        self.get_or_create(symbol).await;
        let mut receivers = self.receivers.write().await;
        receivers
            .remove(symbol)
            .expect("queue was just created by get_or_create")
    }

    async fn get_or_create(&self, symbol: &Symbol) -> Sender<EventUpdate> {
        {
            let queues = self.queues.read().await;
            if let Some(sender) = queues.get(symbol) {
                return sender.clone();
            }
        }

        let mut queues = self.queues.write().await;
        // Double-checked: another task may have created the queue between the read-lock drop
        // and acquiring the write lock above.
        if let Some(sender) = queues.get(symbol) {
            return sender.clone();
        }

        let (sender, receiver) = channel(self.capacity);
        queues.insert(symbol.clone(), sender.clone());
        self.receivers.write().await.insert(symbol.clone(), receiver);
        sender
    }

    /// Drop every per-symbol queue. Called on a full reset (disconnect/resync); subsequent
    /// `enqueue`/`take_reader` calls rebuild fresh queues.
    pub async fn reset_all(&self) {
        self.queues.write().await.clear();
        self.receivers.write().await.clear();
    }

    /// Drop a single symbol's queue, without disturbing any other symbol's. A later `enqueue`
    /// or `take_reader` for this symbol rebuilds it fresh.
    pub async fn reset_symbol(&self, symbol: &Symbol) {
        self.queues.write().await.remove(symbol);
        self.receivers.write().await.remove(symbol);
    }
}

/// Single bounded FIFO of fan-out-ready events, published to by every symbol's processor and
/// drained by the subscription manager's push loop.
#[derive(Clone)]
pub struct OutQueue {
    sender: Sender<EventUpdate>,
    receiver: Arc<tokio::sync::Mutex<Option<Receiver<EventUpdate>>>>,
}

impl OutQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = channel(capacity);
        Self {
            sender,
            receiver: Arc::new(tokio::sync::Mutex::new(Some(receiver))),
        }
    }

    /// Publish an event. Blocks the calling processor when the queue is full.
    pub async fn publish(&self, event: EventUpdate) {
        let _ = self.sender.send(event).await;
    }

    /// Take ownership of the receive end. Meant to be called exactly once, by the push loop.
    pub async fn take_receiver(&self) -> Receiver<EventUpdate> {
        self.receiver
            .lock()
            .await
            .take()
            .expect("OutQueue receiver already taken")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(symbol: &str, final_update_id: u64) -> EventUpdate {
        EventUpdate {
            event_type: "depthUpdate".into(),
            symbol: symbol.into(),
            first_update_id: final_update_id,
            final_update_id,
            bids: vec![],
            asks: vec![],
        }
    }

    #[tokio::test]
    async fn it_resolves_repeated_enqueue_and_reader_calls_to_the_same_queue() {
        let set = InQueueSet::new(8);
        set.enqueue(sample_event("BTCUSDT", 1)).await;

        let mut reader = set.take_reader(&"BTCUSDT".to_string()).await;
        let received = reader.recv().await.unwrap();
        assert_eq!(received.final_update_id, 1);
    }

    #[tokio::test]
    async fn it_keeps_per_symbol_queues_independent() {
        let set = InQueueSet::new(8);
        set.enqueue(sample_event("BTCUSDT", 1)).await;
        set.enqueue(sample_event("ETHUSDT", 2)).await;

        let mut btc_reader = set.take_reader(&"BTCUSDT".to_string()).await;
        let mut eth_reader = set.take_reader(&"ETHUSDT".to_string()).await;

        assert_eq!(btc_reader.recv().await.unwrap().symbol, "BTCUSDT");
        assert_eq!(eth_reader.recv().await.unwrap().symbol, "ETHUSDT");
    }

    #[tokio::test]
    async fn it_round_trips_through_the_out_queue() {
        let out = OutQueue::new(8);
        out.publish(sample_event("BTCUSDT", 10)).await;

        let mut receiver = out.take_receiver().await;
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.final_update_id, 10);
    }
}
