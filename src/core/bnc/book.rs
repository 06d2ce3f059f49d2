use super::data::{InlineOrder, Price, Symbol, UpdateId};
use dashmap::DashMap;
use log::warn;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A single symbol's sorted bid/ask ladders plus the bootstrap/monotonicity bookkeeping
/// described in §3: `ready` flips exactly once, `last_update_id` never regresses.
#[derive(Debug, Default)]
pub struct OrderBook {
    bids: BTreeMap<Price, f64>,
    asks: BTreeMap<Price, f64>,
    last_update_id: UpdateId,
    ready: bool,
}

impl OrderBook {
    pub fn last_update_id(&self) -> UpdateId {
        self.last_update_id
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Merge snapshot levels, without touching `ready`/`last_update_id` - the caller (REST
    /// ingest) does that itself via `set_ready` once both ladders are populated.
    pub fn apply_snapshot_levels(&mut self, bids: &[InlineOrder], asks: &[InlineOrder]) {
        upsert_levels(&mut self.bids, bids, "bid");
        upsert_levels(&mut self.asks, asks, "ask");
    }

    /// Batch-apply one event's deltas and advance `last_update_id` in the same call - the spec
    /// requires these to happen atomically under the book's single writer lock.
    pub fn apply_event(&mut self, bids: &[InlineOrder], asks: &[InlineOrder], final_update_id: UpdateId) {
        upsert_levels(&mut self.bids, bids, "bid");
        upsert_levels(&mut self.asks, asks, "ask");
        self.last_update_id = final_update_id;
    }

    pub fn set_ready(&mut self, last_update_id: UpdateId) {
        self.last_update_id = last_update_id;
        self.ready = true;
    }

    pub fn to_payload(&self) -> BookSnapshotPayload {
        BookSnapshotPayload {
            last_update_id: self.last_update_id,
            // Best bid first (descending), best ask first (ascending).
            bids: self.bids.iter().rev().map(|(p, q)| (p.0, *q)).collect(),
            asks: self.asks.iter().map(|(p, q)| (p.0, *q)).collect(),
        }
    }
}

fn upsert_levels(table: &mut BTreeMap<Price, f64>, levels: &[InlineOrder], side: &str) {
    for level in levels {
        let price = match level.price().to_f64() {
            Ok(price) => price,
            Err(err) => {
                warn!("Skipping malformed {side} price entry: {err}");
                continue;
            }
        };
        let qty = match level.qty().to_f64() {
            Ok(qty) => qty,
            Err(err) => {
                warn!("Skipping malformed {side} qty entry: {err}");
                continue;
            }
        };

        if qty == 0.0 {
            table.remove(&Price(price));
        } else {
            table.insert(Price(price), qty);
        }
    }
}

/// Wire shape for the downstream "full book" frame: `{ "lastUpdateId": N, "bids": [...], "asks": [...] }`.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BookSnapshotPayload {
    pub last_update_id: UpdateId,
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}

/// Per-symbol sharded store. Each symbol gets its own `RwLock`, so a hot symbol's writer never
/// blocks readers or writers of any other symbol - the global lock the original implementation
/// used for bookkeeping is exactly what this is meant to avoid.
#[derive(Clone, Default)]
pub struct BookStore {
    books: Arc<DashMap<Symbol, Arc<RwLock<OrderBook>>>>,
}

impl BookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get-or-create the per-symbol book handle. Safe under concurrent callers: `DashMap::entry`
    /// takes the shard lock for the duration of the check-then-insert.
    pub fn handle(&self, symbol: &Symbol) -> Arc<RwLock<OrderBook>> {
        self.books
            .entry(symbol.clone())
            .or_insert_with(|| Arc::new(RwLock::new(OrderBook::default())))
            .clone()
    }

    pub async fn apply_snapshot_levels(&self, symbol: &Symbol, bids: &[InlineOrder], asks: &[InlineOrder]) {
        let handle = self.handle(symbol);
        let mut book = handle.write().await;
        book.apply_snapshot_levels(bids, asks);
    }

    pub async fn apply_event(
        &self,
        symbol: &Symbol,
        bids: &[InlineOrder],
        asks: &[InlineOrder],
        final_update_id: UpdateId,
    ) {
        let handle = self.handle(symbol);
        let mut book = handle.write().await;
        book.apply_event(bids, asks, final_update_id);
    }

    pub async fn set_ready(&self, symbol: &Symbol, last_update_id: UpdateId) {
        let handle = self.handle(symbol);
        let mut book = handle.write().await;
        book.set_ready(last_update_id);
    }

    /// Check-and-apply under a single write-lock critical section: the discard rule
    /// (`final_update_id <= last_update_id`) and the ladder update must be atomic, or two
    /// concurrent callers could both pass the check against the same stale `last_update_id`.
    pub async fn try_apply_event(
        &self,
        symbol: &Symbol,
        bids: &[InlineOrder],
        asks: &[InlineOrder],
        final_update_id: UpdateId,
    ) -> bool {
        let handle = self.handle(symbol);
        let mut book = handle.write().await;
        if final_update_id <= book.last_update_id() {
            return false;
        }
        book.apply_event(bids, asks, final_update_id);
        true
    }

    pub async fn last_update_id(&self, symbol: &Symbol) -> UpdateId {
        let handle = self.handle(symbol);
        let book = handle.read().await;
        book.last_update_id()
    }

    /// Serialize current ladders for a subscriber's initial frame. A missing symbol yields an
    /// empty, not-ready snapshot rather than an error - the caller primes on whatever is there.
    pub async fn snapshot(&self, symbol: &Symbol) -> (Vec<u8>, UpdateId) {
        let handle = self.handle(symbol);
        let book = handle.read().await;
        let payload = book.to_payload();
        let bytes = serde_json::to_vec(&payload).unwrap_or_default();
        (bytes, payload.last_update_id)
    }

    pub fn remove(&self, symbol: &Symbol) {
        self.books.remove(symbol);
    }

    pub fn reset_all(&self) {
        self.books.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bnc::data::Amount;

    fn order(price: &str, qty: &str) -> InlineOrder {
        InlineOrder(Amount(price.into()), Amount(qty.into()))
    }

    #[test]
    fn it_upserts_and_deletes_zero_qty_levels() {
        let mut book = OrderBook::default();
        book.apply_event(&[order("10", "1")], &[], 1);
        assert_eq!(book.bids.get(&Price(10.0)), Some(&1.0));

        book.apply_event(&[order("10", "0")], &[], 2);
        assert_eq!(book.bids.get(&Price(10.0)), None);

        book.apply_event(&[order("10", "3")], &[], 3);
        assert_eq!(book.bids.get(&Price(10.0)), Some(&3.0));
    }

    #[test]
    fn it_routes_asks_to_the_asks_ladder_not_bids() {
        let mut book = OrderBook::default();
        book.apply_event(&[], &[order("11", "2")], 5);
        assert!(book.bids.is_empty());
        assert_eq!(book.asks.get(&Price(11.0)), Some(&2.0));
    }

    #[test]
    fn it_skips_one_malformed_level_without_stalling_the_rest() {
        let mut book = OrderBook::default();
        book.apply_event(
            &[order("not-a-number", "1"), order("10", "2")],
            &[],
            7,
        );
        assert_eq!(book.bids.len(), 1);
        assert_eq!(book.bids.get(&Price(10.0)), Some(&2.0));
        assert_eq!(book.last_update_id(), 7);
    }

    #[test]
    fn it_orders_bids_descending_and_asks_ascending_in_the_payload() {
        let mut book = OrderBook::default();
        book.apply_event(
            &[order("9", "1"), order("10", "1")],
            &[order("11", "1"), order("12", "1")],
            1,
        );
        let payload = book.to_payload();
        assert_eq!(payload.bids, vec![(10.0, 1.0), (9.0, 1.0)]);
        assert_eq!(payload.asks, vec![(11.0, 1.0), (12.0, 1.0)]);
    }

    #[tokio::test]
    async fn it_gets_or_creates_the_same_handle_for_a_symbol() {
        let store = BookStore::new();
        let a = store.handle(&"BTCUSDT".to_string());
        let b = store.handle(&"BTCUSDT".to_string());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn it_becomes_ready_exactly_once_at_the_snapshot_id() {
        let store = BookStore::new();
        let symbol = "BTCUSDT".to_string();
        store.set_ready(&symbol, 100).await;
        assert_eq!(store.last_update_id(&symbol).await, 100);

        store.apply_event(&symbol, &[order("10", "2")], &[], 105).await;
        assert_eq!(store.last_update_id(&symbol).await, 105);
    }

    #[tokio::test]
    async fn it_returns_an_empty_result_for_a_removed_symbol() {
        let store = BookStore::new();
        let symbol = "BTCUSDT".to_string();
        store.set_ready(&symbol, 42).await;
        store.remove(&symbol);

        let (_, last_update_id) = store.snapshot(&symbol).await;
        assert_eq!(last_update_id, 0);
    }
}
