use super::book::BookStore;
use super::data::{EventUpdate, Symbol, UpdateId};
use super::error::BncError;
use super::queues::{InQueueSet, OutQueue};
use dashmap::DashMap;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Everything the manager needs to stop a processor and release it to be garbage-collected:
/// the task itself and the one-shot readiness latch that unblocks its main loop.
struct ProcessorHandle {
    ready: Arc<Notify>,
    task: JoinHandle<()>,
}

/// Owns per-symbol processors: start, stop, full reset, and single-symbol resync. Also the
/// read/write facade other components use instead of touching `BookStore`/`InQueueSet` directly.
#[derive(Clone)]
pub struct ProcessorManager {
    book_store: BookStore,
    in_queues: Arc<InQueueSet>,
    out_queue: OutQueue,
    handles: Arc<DashMap<Symbol, ProcessorHandle>>,
    resync_tx: Sender<Symbol>,
}

impl ProcessorManager {
    pub fn new(
        book_store: BookStore,
        in_queues: Arc<InQueueSet>,
        out_queue: OutQueue,
        resync_tx: Sender<Symbol>,
    ) -> Self {
        Self {
            book_store,
            in_queues,
            out_queue,
            handles: Arc::new(DashMap::new()),
            resync_tx,
        }
    }

    /// Create and run a processor for `symbol` if one isn't already running. It starts out
    /// `Created`, blocked on its readiness latch, until `set_order_book_ready` fires it once.
    pub fn start_processor(&self, symbol: &Symbol) {
        if self.handles.contains_key(symbol) {
            return;
        }

        let ready = Arc::new(Notify::new());
        let task = tokio::spawn(run_processor(
            symbol.clone(),
            self.book_store.clone(),
            self.in_queues.clone(),
            self.out_queue.clone(),
            ready.clone(),
            self.resync_tx.clone(),
        ));

        self.handles.insert(symbol.clone(), ProcessorHandle { ready, task });
    }

    pub fn is_running(&self, symbol: &Symbol) -> bool {
        self.handles.contains_key(symbol)
    }

    /// Apply the REST-fetched snapshot and release the processor's main loop. Called exactly
    /// once per processor lifetime - a second call on the same handle is a caller bug, but is
    /// harmless here since `Notify::notify_one` on an already-consumed permit is a no-op wait.
    pub async fn set_order_book_ready(&self, symbol: &Symbol, last_update_id: UpdateId) {
        self.book_store.set_ready(symbol, last_update_id).await;
        if let Some(handle) = self.handles.get(symbol) {
            handle.ready.notify_one();
        }
    }

    pub async fn update_bids_asks(
        &self,
        symbol: &Symbol,
        bids: &[super::data::InlineOrder],
        asks: &[super::data::InlineOrder],
    ) {
        self.book_store.apply_snapshot_levels(symbol, bids, asks).await;
    }

    pub async fn get_order_book(&self, symbol: &Symbol) -> (Vec<u8>, UpdateId) {
        self.book_store.snapshot(symbol).await
    }

    /// Stop and discard the processor for one symbol and clear its accumulated state, without
    /// touching any other symbol. Used when the upstream client resyncs after a sequence gap.
    pub async fn resync_symbol(&self, symbol: &Symbol) {
        if let Some((_, handle)) = self.handles.remove(symbol) {
            handle.task.abort();
        }
        self.in_queues.reset_symbol(symbol).await;
        self.book_store.remove(symbol);
    }

    /// Stop every processor, drop every in-queue and every book. Used on upstream disconnect;
    /// the system is left ready for a full resubscription cycle.
    pub async fn reset_processors(&self) {
        for entry in self.handles.iter() {
            entry.value().task.abort();
        }
        self.handles.clear();
        self.in_queues.reset_all().await;
        self.book_store.reset_all();
    }
}

/// Tracks the bootstrap bracket check (§4.5 step 4) and the steady-state chain check (step 5)
/// for one symbol, independent of the book itself - this is sequencing state, not book state.
enum SequenceState {
    AwaitingBootstrap { snapshot_last_update_id: UpdateId },
    Chained { previous_final_update_id: UpdateId },
}

async fn run_processor(
    symbol: Symbol,
    book_store: BookStore,
    in_queues: Arc<InQueueSet>,
    out_queue: OutQueue,
    ready: Arc<Notify>,
    resync_tx: Sender<Symbol>,
) {
    ready.notified().await;

    let snapshot_last_update_id = book_store.last_update_id(&symbol).await;
    let mut sequence = SequenceState::AwaitingBootstrap {
        snapshot_last_update_id,
    };

    let mut reader = in_queues.take_reader(&symbol).await;

    while let Some(event) = reader.recv().await {
        if event.final_update_id <= book_store.last_update_id(&symbol).await {
            debug!(
                "Discarding stale event for {symbol}: final_update_id={} <= last_update_id",
                event.final_update_id
            );
            continue;
        }

        match validate_sequence(&sequence, &event) {
            Ok(next_state) => sequence = next_state,
            Err(err) => {
                warn!("Sequence violation for {symbol}, requesting resync: {err}");
                let _ = resync_tx.send(symbol.clone()).await;
                return;
            }
        }

        let accepted = book_store
            .try_apply_event(&symbol, &event.bids, &event.asks, event.final_update_id)
            .await;
        if accepted {
            out_queue.publish(event).await;
        }
    }

    info!("Processor for {symbol} exiting: in-queue closed");
}

fn validate_sequence(state: &SequenceState, event: &EventUpdate) -> Result<SequenceState, BncError> {
    match state {
        SequenceState::AwaitingBootstrap {
            snapshot_last_update_id,
        } => {
            let expected_next = snapshot_last_update_id + 1;
            if event.first_update_id <= expected_next && expected_next <= event.final_update_id {
                Ok(SequenceState::Chained {
                    previous_final_update_id: event.final_update_id,
                })
            } else {
                Err(BncError::SnapshotMismatch {
                    symbol: event.symbol.clone(),
                    snapshot_id: *snapshot_last_update_id,
                    first_update_id: event.first_update_id,
                    final_update_id: event.final_update_id,
                })
            }
        }
        SequenceState::Chained {
            previous_final_update_id,
        } => {
            let expected_next = previous_final_update_id + 1;
            if event.first_update_id == expected_next {
                Ok(SequenceState::Chained {
                    previous_final_update_id: event.final_update_id,
                })
            } else {
                Err(BncError::SequenceGap {
                    symbol: event.symbol.clone(),
                    expected_next,
                    first_update_id: event.first_update_id,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bnc::data::Amount;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn event(first: u64, final_: u64) -> EventUpdate {
        EventUpdate {
            event_type: "depthUpdate".into(),
            symbol: "BTCUSDT".into(),
            first_update_id: first,
            final_update_id: final_,
            bids: vec![super::super::data::InlineOrder(
                Amount("10".into()),
                Amount("1".into()),
            )],
            asks: vec![],
        }
    }

    #[test]
    fn it_accepts_the_bracketing_bootstrap_event() {
        let state = SequenceState::AwaitingBootstrap {
            snapshot_last_update_id: 100,
        };
        let accepted = validate_sequence(&state, &event(100, 105));
        assert!(accepted.is_ok());
    }

    #[test]
    fn it_rejects_a_bootstrap_event_that_does_not_bracket_the_snapshot() {
        let state = SequenceState::AwaitingBootstrap {
            snapshot_last_update_id: 100,
        };
        let rejected = validate_sequence(&state, &event(150, 160));
        assert!(matches!(rejected, Err(BncError::SnapshotMismatch { .. })));
    }

    #[test]
    fn it_accepts_chained_events_and_rejects_a_gap() {
        let state = SequenceState::Chained {
            previous_final_update_id: 105,
        };
        let ok = validate_sequence(&state, &event(106, 110));
        assert!(ok.is_ok());

        let state = SequenceState::Chained {
            previous_final_update_id: 105,
        };
        let gap = validate_sequence(&state, &event(120, 130));
        assert!(matches!(gap, Err(BncError::SequenceGap { .. })));
    }

    #[tokio::test]
    async fn it_does_not_start_the_loop_until_ready_is_signaled() {
        let book_store = BookStore::new();
        let in_queues = Arc::new(InQueueSet::new(8));
        let out_queue = OutQueue::new(8);
        let (resync_tx, _resync_rx) = mpsc::channel(8);
        let symbol = "BTCUSDT".to_string();

        let manager = ProcessorManager::new(book_store.clone(), in_queues.clone(), out_queue.clone(), resync_tx);
        manager.start_processor(&symbol);

        in_queues.enqueue(event(1, 5)).await;

        // give the task a chance to run if (incorrectly) not blocked on readiness
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(book_store.last_update_id(&symbol).await, 0);

        manager.set_order_book_ready(&symbol, 0).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(book_store.last_update_id(&symbol).await, 5);
    }

    #[tokio::test]
    async fn it_discards_events_at_or_below_the_snapshot_id() {
        let book_store = BookStore::new();
        let in_queues = Arc::new(InQueueSet::new(8));
        let out_queue = OutQueue::new(8);
        let (resync_tx, _resync_rx) = mpsc::channel(8);
        let symbol = "BTCUSDT".to_string();

        let manager = ProcessorManager::new(book_store.clone(), in_queues.clone(), out_queue.clone(), resync_tx);
        manager.start_processor(&symbol);
        manager.set_order_book_ready(&symbol, 100).await;

        in_queues.enqueue(event(95, 99)).await; // stale, discarded
        in_queues.enqueue(event(100, 105)).await; // bootstrap-accepted
        in_queues.enqueue(event(106, 108)).await; // chained

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(book_store.last_update_id(&symbol).await, 108);
    }

    #[tokio::test]
    async fn it_requests_a_resync_on_a_mid_stream_gap() {
        let book_store = BookStore::new();
        let in_queues = Arc::new(InQueueSet::new(8));
        let out_queue = OutQueue::new(8);
        let (resync_tx, mut resync_rx) = mpsc::channel(8);
        let symbol = "BTCUSDT".to_string();

        let manager = ProcessorManager::new(book_store.clone(), in_queues.clone(), out_queue.clone(), resync_tx);
        manager.start_processor(&symbol);
        manager.set_order_book_ready(&symbol, 100).await;

        in_queues.enqueue(event(101, 110)).await;
        in_queues.enqueue(event(200, 210)).await; // gap

        let resynced = tokio::time::timeout(Duration::from_millis(200), resync_rx.recv())
            .await
            .expect("expected a resync request")
            .unwrap();
        assert_eq!(resynced, symbol);
    }
}
