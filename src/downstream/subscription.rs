use super::protocol::DepthDeltaPayload;
use crate::core::bnc::data::{EventUpdate, Symbol, UpdateId};
use crate::core::bnc::processor::ProcessorManager;
use crate::core::bnc::queues::OutQueue;
use dashmap::DashMap;
use log::{debug, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, Sender};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;

/// One connected downstream client. `cursor[symbol]` is the last `finalUpdateId` this
/// subscriber has seen for that symbol; `0` means "not yet primed with a snapshot".
pub struct Subscriber {
    id: u64,
    outbound: Sender<Message>,
    cursors: DashMap<Symbol, UpdateId>,
}

impl Subscriber {
    fn new(id: u64, outbound: Sender<Message>) -> Self {
        Self {
            id,
            outbound,
            cursors: DashMap::new(),
        }
    }

    fn cursor(&self, symbol: &Symbol) -> UpdateId {
        self.cursors.get(symbol).map(|v| *v).unwrap_or(0)
    }

    fn set_cursor(&self, symbol: &Symbol, value: UpdateId) {
        self.cursors.insert(symbol.clone(), value);
    }

    /// Drop every symbol's cursor, forcing the next push for each to re-prime with a fresh
    /// snapshot rather than feed deltas against a book the subscriber never saw.
    fn reset_cursor(&self, symbol: &Symbol) {
        self.cursors.remove(symbol);
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Non-blocking send: a full outbound queue means this subscriber's backlog has exceeded
    /// its cap, per §9's "bounded per-subscriber outbound buffer; on overflow, drop the
    /// subscriber". Returns `false` on overflow so the caller can evict - this method never
    /// evicts itself, since it doesn't have access to the subscription index.
    fn send(&self, payload: Vec<u8>) -> bool {
        match self.outbound.try_send(Message::Binary(payload)) {
            Ok(()) => true,
            Err(err) => {
                debug!("Subscriber #{} outbound backlog exceeded: {err}", self.id);
                false
            }
        }
    }

    /// Echo an unrecognized command back verbatim, matching the teacher's downstream handler.
    /// Same overflow contract as `send`: `false` means the backlog cap was exceeded.
    pub fn echo(&self, text: String) -> bool {
        match self.outbound.try_send(Message::Text(text)) {
            Ok(()) => true,
            Err(err) => {
                debug!("Subscriber #{} outbound backlog exceeded: {err}", self.id);
                false
            }
        }
    }
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Owns every symbol's subscriber list and the single push-loop task that drains the out-queue
/// and fans each event out to whoever is subscribed, priming late joiners with a fresh snapshot.
#[derive(Clone)]
pub struct SubscriptionManager {
    subs: Arc<DashMap<Symbol, RwLock<Vec<Arc<Subscriber>>>>>,
    processors: ProcessorManager,
    next_id: Arc<AtomicU64>,
}

impl SubscriptionManager {
    pub fn new(processors: ProcessorManager) -> Self {
        Self {
            subs: Arc::new(DashMap::new()),
            processors,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a new connection. Returns the subscriber handle (used for `add`/`remove` calls
    /// from the connection's reader task) and the receiver half of its outbound queue (used by
    /// the connection's writer task to push frames onto the socket).
    pub fn register(&self, capacity: usize) -> (Arc<Subscriber>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        (Arc::new(Subscriber::new(id, tx)), rx)
    }

    pub async fn add_subscription(&self, symbol: &Symbol, subscriber: Arc<Subscriber>) {
        let list = self
            .subs
            .entry(symbol.clone())
            .or_insert_with(|| RwLock::new(Vec::new()));
        let mut list = list.write().await;
        if !list.iter().any(|existing| existing.id == subscriber.id) {
            list.push(subscriber);
        }
    }

    pub async fn remove_subscription(&self, symbol: &Symbol, subscriber: &Subscriber) {
        if let Some(list) = self.subs.get(symbol) {
            list.write().await.retain(|existing| existing.id != subscriber.id);
        }
    }

    /// Idempotent: drop `subscriber` from every symbol's list, regardless of which it joined.
    pub async fn remove_user(&self, subscriber: &Subscriber) {
        for entry in self.subs.iter() {
            entry.value().write().await.retain(|existing| existing.id != subscriber.id);
        }
    }

    /// Re-arm every current subscriber of `symbol` to "not yet primed". Called after a
    /// single-symbol resync (§4.5 step 4/5 violation) so the next push for `symbol` resends a
    /// fresh snapshot instead of feeding deltas against cursors watermarked to a book that was
    /// just discarded.
    pub async fn invalidate_symbol(&self, symbol: &Symbol) {
        if let Some(list) = self.subs.get(symbol) {
            for subscriber in list.read().await.iter() {
                subscriber.reset_cursor(symbol);
            }
        }
    }

    /// Re-arm every subscriber's cursor, for every symbol. Called on upstream disconnect (§8
    /// property 7 / scenario S5): every book is about to be rebuilt from scratch, so every
    /// subscriber must re-prime from the fresh snapshot rather than keep trusting a pre-disconnect
    /// watermark against a book that no longer exists.
    pub async fn invalidate_all(&self) {
        for entry in self.subs.iter() {
            for subscriber in entry.value().read().await.iter() {
                subscriber.reset_cursor(entry.key());
            }
        }
    }

    /// Drains the out-queue forever. Intended to be spawned exactly once at startup.
    pub async fn run_push_loop(&self, out_queue: OutQueue) {
        let mut receiver = out_queue.take_receiver().await;
        while let Some(event) = receiver.recv().await {
            self.dispatch(&event).await;
        }
        warn!("Push loop exiting: out-queue closed.");
    }

    async fn dispatch(&self, event: &EventUpdate) {
        let Some(list) = self.subs.get(&event.symbol) else {
            return;
        };
        let subscribers = list.read().await.clone();
        drop(list);

        if subscribers.is_empty() {
            return;
        }

        let delta_payload = serde_json::to_vec(&DepthDeltaPayload::from(event)).unwrap_or_default();

        for subscriber in subscribers {
            if subscriber.cursor(&event.symbol) == 0 {
                let (book_bytes, book_last_update_id) =
                    self.processors.get_order_book(&event.symbol).await;
                if !subscriber.send(book_bytes) {
                    warn!("Evicting subscriber #{} after outbound overflow.", subscriber.id());
                    self.remove_user(&subscriber).await;
                    continue;
                }
                subscriber.set_cursor(&event.symbol, book_last_update_id);
            }

            if event.final_update_id > subscriber.cursor(&event.symbol) {
                if !subscriber.send(delta_payload.clone()) {
                    warn!("Evicting subscriber #{} after outbound overflow.", subscriber.id());
                    self.remove_user(&subscriber).await;
                    continue;
                }
                subscriber.set_cursor(&event.symbol, event.final_update_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bnc::book::BookStore;
    use crate::core::bnc::queues::InQueueSet;
    use std::time::Duration;
    use tokio::sync::mpsc as tmpsc;

    fn event(symbol: &str, first: u64, final_: u64) -> EventUpdate {
        EventUpdate {
            event_type: "depthUpdate".into(),
            symbol: symbol.into(),
            first_update_id: first,
            final_update_id: final_,
            bids: vec![],
            asks: vec![],
        }
    }

    fn manager() -> (SubscriptionManager, OutQueue) {
        let book_store = BookStore::new();
        let in_queues = Arc::new(InQueueSet::new(8));
        let out_queue = OutQueue::new(8);
        let (resync_tx, _resync_rx) = tmpsc::channel(8);
        let processors = ProcessorManager::new(book_store, in_queues, out_queue.clone(), resync_tx);
        (SubscriptionManager::new(processors), out_queue)
    }

    #[tokio::test]
    async fn it_primes_a_newly_subscribed_client_with_a_snapshot_then_deltas() {
        let (manager, out_queue) = manager();
        let symbol = "BTCUSDT".to_string();

        let (subscriber, mut outbound) = manager.register(8);
        manager.add_subscription(&symbol, subscriber.clone()).await;

        tokio::spawn({
            let manager = manager.clone();
            async move { manager.run_push_loop(out_queue.clone()).await }
        });

        out_queue.publish(event("BTCUSDT", 1, 10)).await;

        let first_frame = tokio::time::timeout(Duration::from_millis(200), outbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(first_frame, Message::Binary(_)));

        let second_frame = tokio::time::timeout(Duration::from_millis(200), outbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(second_frame, Message::Binary(_)));

        assert_eq!(subscriber.cursor(&symbol), 10);
    }

    #[tokio::test]
    async fn it_skips_events_already_covered_by_the_primed_cursor() {
        let (manager, _out_queue) = manager();
        let symbol = "BTCUSDT".to_string();
        let (subscriber, mut outbound) = manager.register(8);
        subscriber.set_cursor(&symbol, 50);
        manager.add_subscription(&symbol, subscriber.clone()).await;

        manager.dispatch(&event("BTCUSDT", 10, 40)).await;
        assert_eq!(subscriber.cursor(&symbol), 50);
        assert!(outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn it_removes_a_user_from_every_symbol() {
        let (manager, _out_queue) = manager();
        let (subscriber, _outbound) = manager.register(8);
        manager.add_subscription(&"BTCUSDT".to_string(), subscriber.clone()).await;
        manager.add_subscription(&"ETHUSDT".to_string(), subscriber.clone()).await;

        manager.remove_user(&subscriber).await;

        assert!(manager.subs.get(&"BTCUSDT".to_string()).unwrap().read().await.is_empty());
        assert!(manager.subs.get(&"ETHUSDT".to_string()).unwrap().read().await.is_empty());
    }

    #[tokio::test]
    async fn it_evicts_a_subscriber_once_its_outbound_backlog_overflows() {
        let (manager, _out_queue) = manager();
        let symbol = "BTCUSDT".to_string();
        // Capacity 1 and an unread receiver: the snapshot send fills the channel, so the
        // delta send that immediately follows in the same dispatch has nowhere to go.
        let (subscriber, _outbound) = manager.register(1);
        manager.add_subscription(&symbol, subscriber.clone()).await;

        manager.dispatch(&event("BTCUSDT", 1, 10)).await;

        assert!(manager.subs.get(&symbol).unwrap().read().await.is_empty());
    }

    #[tokio::test]
    async fn it_invalidates_a_symbols_cursor_back_to_not_primed() {
        let (manager, _out_queue) = manager();
        let symbol = "BTCUSDT".to_string();
        let (subscriber, _outbound) = manager.register(8);
        manager.add_subscription(&symbol, subscriber.clone()).await;
        subscriber.set_cursor(&symbol, 500);
        assert_eq!(subscriber.cursor(&symbol), 500);

        manager.invalidate_symbol(&symbol).await;

        assert_eq!(subscriber.cursor(&symbol), 0);
    }

    #[tokio::test]
    async fn it_invalidates_every_symbols_cursor_via_invalidate_all() {
        let (manager, _out_queue) = manager();
        let btc = "BTCUSDT".to_string();
        let eth = "ETHUSDT".to_string();
        let (subscriber, _outbound) = manager.register(8);
        manager.add_subscription(&btc, subscriber.clone()).await;
        manager.add_subscription(&eth, subscriber.clone()).await;
        subscriber.set_cursor(&btc, 10);
        subscriber.set_cursor(&eth, 20);

        manager.invalidate_all().await;

        assert_eq!(subscriber.cursor(&btc), 0);
        assert_eq!(subscriber.cursor(&eth), 0);
    }
}
