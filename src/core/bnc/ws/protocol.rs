use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out ids for the control-channel request/response demux, one higher than the last.
/// A plain `AtomicU64` is enough - the generator never needs to hand the same id out twice,
/// and there's no reason to pay for a mutex around a single counter.
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    next: AtomicU64,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// `{"method":"SUBSCRIBE","params":["btcusdt@depth"],"id":1}` and its `UNSUBSCRIBE` counterpart.
#[derive(Serialize, Debug, Clone)]
pub struct SubscriptionRequest {
    pub method: &'static str,
    pub params: Vec<String>,
    pub id: u64,
}

impl SubscriptionRequest {
    pub fn subscribe(symbol: &str, id: u64) -> Self {
        Self {
            method: "SUBSCRIBE",
            params: vec![depth_stream_name(symbol)],
            id,
        }
    }

    pub fn unsubscribe(symbol: &str, id: u64) -> Self {
        Self {
            method: "UNSUBSCRIBE",
            params: vec![depth_stream_name(symbol)],
            id,
        }
    }
}

/// `{"method":"LIST_SUBSCRIPTIONS","id":1}`.
#[derive(Serialize, Debug, Clone)]
pub struct ListSubscriptionsRequest {
    pub method: &'static str,
    pub id: u64,
}

impl ListSubscriptionsRequest {
    pub fn new(id: u64) -> Self {
        Self {
            method: "LIST_SUBSCRIPTIONS",
            id,
        }
    }
}

/// Every control frame the exchange sends back carries the `id` it was requested with and a
/// result, used purely to correlate - the demux loop doesn't otherwise care about the payload.
#[derive(Deserialize, Debug, Clone)]
pub struct ControlResponse {
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<ControlError>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ControlError {
    pub code: i64,
    pub msg: String,
}

fn depth_stream_name(symbol: &str) -> String {
    format!("{}@depth", symbol.to_ascii_lowercase())
}
